//! Configuration file support for bootlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BOOTLINK_*)
//! 3. Local config file (./bootlink.toml)
//! 4. Global config file (~/.config/bootlink/config.toml)

use {
    crate::CliError,
    bootlink::{CommandKind, CommandTable, FrameLayout, InfoSlice, TransferConfig},
    directories::ProjectDirs,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fs,
        path::{Path, PathBuf},
    },
};

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "bootlink.toml";

/// USB adapter identification for port preference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
    /// Read deadline in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Preferred USB adapters for port selection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Frame and transfer settings for the target bootloader revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Frames carry a payload length byte.
    pub length_byte: Option<bool>,
    /// Response slice holding info field text.
    pub info_slice: Option<InfoSlice>,
    /// Firmware bytes per write frame.
    pub chunk_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Protocol configuration.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Opcode overrides keyed by command name.
    #[serde(default)]
    pub commands: BTreeMap<String, u8>,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bootlink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        let connection = other.port.connection;
        if connection.serial.is_some() {
            self.port.connection.serial = connection.serial;
        }
        if connection.baud.is_some() {
            self.port.connection.baud = connection.baud;
        }
        if connection.timeout_ms.is_some() {
            self.port.connection.timeout_ms = connection.timeout_ms;
        }
        self.port.usb_device.extend(other.port.usb_device);

        let protocol = other.protocol;
        if protocol.length_byte.is_some() {
            self.protocol.length_byte = protocol.length_byte;
        }
        if protocol.info_slice.is_some() {
            self.protocol.info_slice = protocol.info_slice;
        }
        if protocol.chunk_size.is_some() {
            self.protocol.chunk_size = protocol.chunk_size;
        }

        self.commands.extend(other.commands);
    }

    /// Frame layout, with `--legacy-frame` taking precedence.
    pub fn frame_layout(&self, legacy: bool) -> FrameLayout {
        if legacy {
            return FrameLayout::LEGACY;
        }
        let default = FrameLayout::default();
        FrameLayout {
            length_byte: self.protocol.length_byte.unwrap_or(default.length_byte),
            info_slice: self.protocol.info_slice.unwrap_or(default.info_slice),
        }
    }

    /// Default opcode table with the `[commands]` overrides applied.
    pub fn command_table(&self) -> Result<CommandTable, CliError> {
        let mut table = CommandTable::default();
        for (key, &opcode) in &self.commands {
            let kind = CommandKind::from_key(key)
                .ok_or_else(|| CliError::Config(format!("unknown command `{key}` in [commands]")))?;
            table.set(kind, opcode);
        }
        for (a, b) in table.collisions() {
            debug!("Commands {a} and {b} share opcode {:#04X}", table.opcode(a));
        }
        Ok(table)
    }

    /// Transfer tunables.
    pub fn transfer_config(&self) -> Result<TransferConfig, CliError> {
        let Some(chunk_size) = self.protocol.chunk_size else {
            return Ok(TransferConfig::default());
        };
        TransferConfig::new(chunk_size).map_err(|e| CliError::Config(e.to_string()))
    }
}
