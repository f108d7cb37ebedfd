//! Single-command device operations and the info query.

use anyhow::Result;
use bootlink::{CommandKind, DeviceInfo, Exchange, FieldValue, Port};
use console::style;
use log::debug;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::output::ConsoleSink;
use crate::{Cli, CliError, device_err, open_session};

/// Turn a reply into success or a device error.
pub(crate) fn expect_ack(kind: CommandKind, exchange: &Exchange) -> Result<()> {
    match exchange {
        Exchange::Response(response) => {
            if !response.is_ack_flag() {
                debug!("{kind} reply has request byte {:#04X}", response.request);
            }
            Ok(())
        },
        Exchange::Timeout => Err(CliError::Device(format!("No response to {kind}")).into()),
        Exchange::Malformed { error, .. } => {
            Err(CliError::Device(format!("Invalid reply to {kind}: {error}")).into())
        },
    }
}

fn send_command(cli: &Cli, config: &Config, kind: CommandKind, action: &str) -> Result<()> {
    let sink = ConsoleSink::silent().with_frames(!cli.quiet);
    let mut session = open_session(cli, config, sink)?;

    if !cli.quiet {
        eprintln!("{} {action}", style("⏳").yellow());
    }
    let exchange = session.transact(kind, &[]).map_err(device_err)?;
    session.close().map_err(device_err)?;
    expect_ack(kind, &exchange)?;

    if !cli.quiet {
        eprintln!("{} {kind} acknowledged", style("✓").green());
    }
    Ok(())
}

/// Connect command implementation.
pub(crate) fn cmd_connect(cli: &Cli, config: &Config) -> Result<()> {
    send_command(cli, config, CommandKind::Connect, "Connecting to device...")
}

/// Disconnect command implementation.
pub(crate) fn cmd_disconnect(cli: &Cli, config: &Config) -> Result<()> {
    send_command(cli, config, CommandKind::Disconnect, "Disconnecting device...")
}

/// Reboot command implementation.
pub(crate) fn cmd_reboot(cli: &Cli, config: &Config) -> Result<()> {
    send_command(cli, config, CommandKind::Reboot, "Rebooting MCU...")
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &Config) -> Result<()> {
    send_command(cli, config, CommandKind::EraseFirmware, "Erasing firmware...")
}

/// Read command implementation.
pub(crate) fn cmd_read(cli: &Cli, config: &Config) -> Result<()> {
    send_command(cli, config, CommandKind::ReadFirmware, "Reading firmware from device...")
}

/// JSON shape of the info result: unavailable fields are `null`.
pub(crate) fn info_json(port: &str, info: &DeviceInfo) -> Value {
    let fields: Map<String, Value> = info
        .iter()
        .map(|(field, value)| {
            let value = match value {
                FieldValue::Unavailable => Value::Null,
                other => Value::String(other.to_string()),
            };
            (field.key().to_string(), value)
        })
        .collect();
    json!({
        "port": port,
        "available": info.available(),
        "fields": fields,
    })
}

/// Info command implementation.
///
/// Fields are printed as each query finishes. A field the device does not
/// answer shows `N/A`; the command only fails if no field was answered.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let sink = ConsoleSink::silent()
        .with_frames(cli.verbose >= 1)
        .with_fields(!json && !cli.quiet);
    let mut session = open_session(cli, config, sink)?;

    if !json && !cli.quiet {
        eprintln!("\n{}", style("Device Information").bold().underlined());
    }

    let info = session.fetch_info().map_err(device_err)?;
    let port = session.port().name().to_string();
    session.close().map_err(device_err)?;
    if info.available() == 0 {
        return Err(CliError::Device("Device did not answer any info query".into()).into());
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info_json(&port, &info)).unwrap_or_default()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootlink::{Codec, InfoField};

    fn reply(request: u8) -> Exchange {
        let codec = Codec::default();
        let raw = codec.encode_frame(0xA1, request, &[]).unwrap();
        Exchange::Response(codec.decode_response(&raw).unwrap())
    }

    fn code(result: Result<()>) -> Option<u8> {
        result
            .err()
            .and_then(|e| e.downcast_ref::<CliError>().map(CliError::exit_code))
    }

    #[test]
    fn test_expect_ack() {
        assert!(expect_ack(CommandKind::Connect, &reply(0x02)).is_ok());
        assert!(expect_ack(CommandKind::Connect, &reply(0x01)).is_ok());
        assert_eq!(code(expect_ack(CommandKind::Connect, &Exchange::Timeout)), Some(4));

        let codec = Codec::default();
        let mut raw = codec.encode_frame(0xA1, 0x02, &[]).unwrap();
        raw[4] ^= 0xFF;
        let error = codec.decode_response(&raw).unwrap_err();
        let malformed = Exchange::Malformed { raw, error };
        assert_eq!(code(expect_ack(CommandKind::Connect, &malformed)), Some(4));
    }

    #[test]
    fn test_timeout_message_names_command() {
        let err = expect_ack(CommandKind::Reboot, &Exchange::Timeout).unwrap_err();
        assert_eq!(err.to_string(), "No response to reboot");
    }

    #[test]
    fn test_info_json_uses_null_for_missing_fields() {
        let info: DeviceInfo = [
            (InfoField::BootloaderVersion, FieldValue::Text("V1.02".into())),
            (InfoField::ProductId, FieldValue::Unavailable),
            (InfoField::ApplicationVersion, FieldValue::Hex("0102".into())),
        ]
        .into_iter()
        .collect();
        let value = info_json("/dev/ttyUSB0", &info);
        assert_eq!(value["port"], "/dev/ttyUSB0");
        assert_eq!(value["available"], 2);
        assert_eq!(value["fields"]["bootloader_version"], "V1.02");
        assert!(value["fields"]["product_id"].is_null());
        assert_eq!(value["fields"]["application_version"], "0102");
    }
}
