//! Offline frame encoding.

use anyhow::Result;
use bootlink::{Codec, CommandKind, to_hex};

use crate::config::Config;
use crate::{Cli, CliError, device_err};

/// Parse hex bytes, ignoring whitespace and an optional `0x` prefix.
pub(crate) fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err("Odd number of hex digits".to_string());
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|p| u8::from_str_radix(p, 16).ok())
                .ok_or_else(|| format!("Invalid hex byte: {}", String::from_utf8_lossy(pair)))
        })
        .collect()
}

/// Encode the frame for `command` with the configured layout and opcodes.
pub(crate) fn encode_frame(
    cli: &Cli,
    config: &Config,
    command: &str,
    payload: Option<&str>,
) -> Result<Vec<u8>> {
    let kind = CommandKind::from_key(command).ok_or_else(|| {
        let known: Vec<&str> = CommandKind::ALL.iter().map(|k| k.key()).collect();
        CliError::Usage(format!(
            "Unknown command `{command}`; expected one of: {}",
            known.join(", ")
        ))
    })?;
    let payload = payload
        .map(parse_hex_bytes)
        .transpose()
        .map_err(CliError::Usage)?
        .unwrap_or_default();

    let opcode = config.command_table()?.opcode(kind);
    Codec::new(config.frame_layout(cli.legacy_frame))
        .encode_with_payload(opcode, &payload)
        .map_err(device_err)
}

/// Encode command implementation.
pub(crate) fn cmd_encode(
    cli: &Cli,
    config: &Config,
    command: &str,
    payload: Option<&str>,
) -> Result<()> {
    let frame = encode_frame(cli, config, command, payload)?;
    println!("{}", to_hex(&frame));
    Ok(())
}
