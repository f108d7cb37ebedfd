//! Symbolic bootloader commands and their configurable opcode table.
//!
//! Deployed bootloader revisions assign different numeric opcodes to the
//! same command, so protocol logic only ever names a [`CommandKind`] and
//! resolves it through a [`CommandTable`] supplied by configuration.

use std::fmt;

/// Symbolic bootloader command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Open a bootloader session.
    Connect,
    /// Close the bootloader session.
    Disconnect,
    /// Query the bootloader version.
    FetchInfo,
    /// Write one firmware chunk.
    WriteFirmware,
    /// Read back firmware.
    ReadFirmware,
    /// Erase the application area.
    EraseFirmware,
    /// Query the firmware version.
    GetFirmwareVersion,
    /// Query the product identifier.
    GetProductId,
    /// Query the product version.
    GetProductVersion,
    /// Query the application version.
    ReadApplicationVersion,
    /// Reset the MCU.
    Reboot,
    /// Announce the end of a firmware transfer (size + image checksum).
    WriteComplete,
}

impl CommandKind {
    /// Every command, in table order.
    pub const ALL: [Self; 12] = [
        Self::Connect,
        Self::Disconnect,
        Self::FetchInfo,
        Self::WriteFirmware,
        Self::ReadFirmware,
        Self::EraseFirmware,
        Self::GetFirmwareVersion,
        Self::GetProductId,
        Self::GetProductVersion,
        Self::ReadApplicationVersion,
        Self::Reboot,
        Self::WriteComplete,
    ];

    /// Configuration key of this command.
    pub fn key(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::FetchInfo => "fetch_info",
            Self::WriteFirmware => "write_firmware",
            Self::ReadFirmware => "read_firmware",
            Self::EraseFirmware => "erase_firmware",
            Self::GetFirmwareVersion => "get_firmware_version",
            Self::GetProductId => "get_product_id",
            Self::GetProductVersion => "get_product_version",
            Self::ReadApplicationVersion => "read_application_version",
            Self::Reboot => "reboot",
            Self::WriteComplete => "write_complete",
        }
    }

    /// Look a command up by configuration key (`-` and `_` are interchangeable).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == key)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Opcode assignment for every [`CommandKind`].
///
/// Deserializing a partial table keeps the defaults for omitted commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[allow(missing_docs)]
pub struct CommandTable {
    pub connect: u8,
    pub disconnect: u8,
    pub fetch_info: u8,
    pub write_firmware: u8,
    pub read_firmware: u8,
    pub erase_firmware: u8,
    pub get_firmware_version: u8,
    pub get_product_id: u8,
    pub get_product_version: u8,
    pub read_application_version: u8,
    pub reboot: u8,
    pub write_complete: u8,
}

impl Default for CommandTable {
    /// The table used by the reference host tool.
    fn default() -> Self {
        Self {
            connect: 0xA1,
            disconnect: 0xA2,
            fetch_info: 0xA3,
            write_firmware: 0xA0,
            read_firmware: 0xA1,
            erase_firmware: 0xA2,
            get_firmware_version: 0xA3,
            get_product_id: 0xA4,
            get_product_version: 0xA5,
            read_application_version: 0xA6,
            reboot: 0xA7,
            write_complete: 0xA8,
        }
    }
}

impl CommandTable {
    /// Opcode assigned to a command.
    pub fn opcode(&self, kind: CommandKind) -> u8 {
        match kind {
            CommandKind::Connect => self.connect,
            CommandKind::Disconnect => self.disconnect,
            CommandKind::FetchInfo => self.fetch_info,
            CommandKind::WriteFirmware => self.write_firmware,
            CommandKind::ReadFirmware => self.read_firmware,
            CommandKind::EraseFirmware => self.erase_firmware,
            CommandKind::GetFirmwareVersion => self.get_firmware_version,
            CommandKind::GetProductId => self.get_product_id,
            CommandKind::GetProductVersion => self.get_product_version,
            CommandKind::ReadApplicationVersion => self.read_application_version,
            CommandKind::Reboot => self.reboot,
            CommandKind::WriteComplete => self.write_complete,
        }
    }

    /// Reassign the opcode of a command.
    pub fn set(&mut self, kind: CommandKind, opcode: u8) {
        let slot = match kind {
            CommandKind::Connect => &mut self.connect,
            CommandKind::Disconnect => &mut self.disconnect,
            CommandKind::FetchInfo => &mut self.fetch_info,
            CommandKind::WriteFirmware => &mut self.write_firmware,
            CommandKind::ReadFirmware => &mut self.read_firmware,
            CommandKind::EraseFirmware => &mut self.erase_firmware,
            CommandKind::GetFirmwareVersion => &mut self.get_firmware_version,
            CommandKind::GetProductId => &mut self.get_product_id,
            CommandKind::GetProductVersion => &mut self.get_product_version,
            CommandKind::ReadApplicationVersion => &mut self.read_application_version,
            CommandKind::Reboot => &mut self.reboot,
            CommandKind::WriteComplete => &mut self.write_complete,
        };
        *slot = opcode;
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, kind: CommandKind, opcode: u8) -> Self {
        self.set(kind, opcode);
        self
    }

    /// Commands that share an opcode with an earlier command in table order.
    ///
    /// Shared opcodes are legal (the reference table reuses several), but a
    /// device cannot tell such commands apart.
    pub fn collisions(&self) -> Vec<(CommandKind, CommandKind)> {
        let mut found = Vec::new();
        for (i, &a) in CommandKind::ALL.iter().enumerate() {
            for &b in &CommandKind::ALL[i + 1..] {
                if self.opcode(a) == self.opcode(b) {
                    found.push((a, b));
                }
            }
        }
        found
    }
}
