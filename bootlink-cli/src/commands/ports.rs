//! Serial port listing.

use bootlink::PortInfo;
use console::style;
use serde_json::{Value, json};

use crate::config::Config;
use crate::serial::{discover_ports, is_known_device, port_label};

/// JSON record for one port.
pub(crate) fn port_json(port: &PortInfo, known: bool) -> Value {
    json!({
        "name": port.name,
        "known": known,
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial_number,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(config: &Config, json: bool) {
    let ports = discover_ports();

    if json {
        let list: Vec<Value> = ports
            .iter()
            .map(|p| port_json(p, is_known_device(p, config)))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&list).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available Serial Ports").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }
    for port in &ports {
        let marker = if is_known_device(port, config) {
            style("★").yellow()
        } else {
            style("•").green()
        };
        eprintln!("  {marker} {}", port_label(port));
    }
}
