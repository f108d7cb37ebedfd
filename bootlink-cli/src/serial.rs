//! Serial port selection.
//!
//! Resolution order: `--port`/`BOOTLINK_PORT`, the configured port, then
//! enumeration. Enumerated adapters listed under `[[port.usb_device]]` are
//! preferred; several candidates are offered in a prompt unless running
//! non-interactively.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    bootlink::{NativePortEnumerator, PortEnumerator, PortInfo},
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info, warn},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI or environment.
    pub port: Option<String>,
    /// Fail instead of prompting.
    pub non_interactive: bool,
}

/// Result of port selection.
#[derive(Debug)]
pub struct SelectedPort {
    /// The selected port info.
    pub port: PortInfo,
    /// Whether the adapter matched a configured USB device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Enumerate ports, treating enumeration failure as "none found".
pub fn discover_ports() -> Vec<PortInfo> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

fn select_non_interactive_port(
    selection_ports: Vec<PortInfo>,
    config: &Config,
) -> Result<SelectedPort> {
    // Exactly one candidate is an auto-selection; anything else needs --port.
    match selection_ports.len().cmp(&1) {
        Ordering::Equal => {
            let Some(port) = selection_ports.into_iter().next() else {
                return Err(usage_err("No serial ports available"));
            };
            Ok(SelectedPort {
                is_known: is_known_device(&port, config),
                port,
            })
        },
        Ordering::Greater => Err(usage_err(
            "Multiple serial ports found; pass --port in non-interactive mode",
        )),
        Ordering::Less => Err(usage_err("No serial ports available")),
    }
}

/// Select a serial port, prompting if several candidates exist.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name, config));
    }

    if let Some(port_name) = &config.port.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name, config));
    }

    let ports = discover_ports();
    if ports.is_empty() {
        return Err(usage_err("No serial ports found; connect the device or pass --port"));
    }

    let known_ports: Vec<PortInfo> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();

    let selection_ports = if known_ports.is_empty() {
        ports
    } else {
        known_ports
    };

    if options.non_interactive {
        return select_non_interactive_port(selection_ports, config);
    }

    match selection_ports.len().cmp(&1) {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(selection_ports, config)
        },
        Ordering::Equal => select_non_interactive_port(selection_ports, config).inspect(|selected| {
            info!("Auto-selected port: {}", selected.port.name);
        }),
        Ordering::Less => Err(usage_err("No serial ports available")),
    }
}

/// Require a terminal on both ends before prompting.
pub fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err("Interactive prompt requires a terminal"))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port prompt failed")
            }
        },
    }
}

fn find_port_by_name(name: &str, config: &Config) -> SelectedPort {
    let ports = discover_ports();

    if let Some(port) = ports
        .iter()
        .find(|p| p.name == name || p.name.eq_ignore_ascii_case(name))
    {
        return SelectedPort {
            is_known: is_known_device(port, config),
            port: port.clone(),
        };
    }

    // Not enumerated (virtual ports, pty pairs); open it as given.
    SelectedPort {
        port: PortInfo {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        },
        is_known: false,
    }
}

/// Whether the adapter is listed under `[[port.usb_device]]`.
pub(crate) fn is_known_device(port: &PortInfo, config: &Config) -> bool {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return false;
    };
    config
        .port
        .usb_device
        .iter()
        .any(|device| device.matches(vid, pid))
}

/// Display label for a port.
pub fn port_label(port: &PortInfo) -> String {
    let vid_pid = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    format!("{}{vid_pid}{product}", port.name)
}

fn select_port_interactive(ports: Vec<PortInfo>, config: &Config) -> Result<SelectedPort> {
    eprintln!("{} Found {} serial ports", style("ℹ").blue(), ports.len());

    let term_width = usize::from(console::Term::stderr().size().1);
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            let is_known = is_known_device(&port, config);
            Ok(SelectedPort { port, is_known })
        },
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}
