//! Offline firmware image inspection.

use anyhow::{Context, Result};
use bootlink::{FirmwareImage, TransferConfig, to_hex};
use console::style;
use std::path::Path;

use crate::config::Config;
use crate::{Cli, device_err};

/// Bytes per line of the hex dump.
pub const DUMP_WIDTH: usize = 16;

/// Upper-case hex lines of `DUMP_WIDTH` bytes.
pub(crate) fn hex_dump(data: &[u8]) -> impl Iterator<Item = String> + '_ {
    data.chunks(DUMP_WIDTH).map(to_hex)
}

/// JSON summary of an image.
pub(crate) fn image_json(
    path: &Path,
    image: &FirmwareImage,
    config: TransferConfig,
) -> Result<serde_json::Value> {
    let completion = image.completion_payload().map_err(device_err)?;
    Ok(serde_json::json!({
        "path": path.display().to_string(),
        "size": image.len(),
        "chunk_size": config.chunk_size,
        "chunks": image.chunk_count(config.chunk_size),
        "checksum": format!("0x{:08X}", image.checksum()),
        "completion_payload": to_hex(&completion),
    }))
}

/// Image command implementation.
pub(crate) fn cmd_image(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    dump: bool,
    json: bool,
) -> Result<()> {
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;
    let transfer = config.transfer_config()?;

    if json {
        let value = image_json(firmware, &image, transfer)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_default()
        );
        return Ok(());
    }

    if !cli.quiet {
        eprintln!("{}", style("Firmware Image").bold().underlined());
        eprintln!("  Path: {}", firmware.display());
        eprintln!("  Size: {} bytes", image.len());
        eprintln!(
            "  Chunks: {} x {} bytes",
            image.chunk_count(transfer.chunk_size),
            transfer.chunk_size
        );
        eprintln!("  Checksum: 0x{:08X}", image.checksum());
    }

    if dump {
        for line in hex_dump(image.as_bytes()) {
            println!("{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_lines() {
        let data: Vec<u8> = (0u8..20).collect();
        let lines: Vec<String> = hex_dump(&data).collect();
        assert_eq!(
            lines,
            vec![
                "000102030405060708090A0B0C0D0E0F".to_string(),
                "10111213".to_string(),
            ]
        );
        assert_eq!(hex_dump(&[]).count(), 0);
    }

    #[test]
    fn test_image_json() {
        let data: Vec<u8> = (0..300u32).map(|i| (i % 256) as u8).collect();
        let image = FirmwareImage::from_bytes(data);
        let value =
            image_json(Path::new("app.bin"), &image, TransferConfig::default()).unwrap();
        assert_eq!(value["size"], 300);
        assert_eq!(value["chunk_size"], 255);
        assert_eq!(value["chunks"], 2);
        assert_eq!(value["checksum"], "0xE732FEFA");
        assert_eq!(value["completion_payload"], "0000012CE732FEFA");
    }
}
