//! Device identity queries.

use {
    crate::{
        error::Result,
        event::EventSink,
        port::Port,
        protocol::{CommandKind, to_hex},
        session::{Exchange, Session},
    },
    std::fmt,
};

/// One identity/version field reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum InfoField {
    /// Bootloader version.
    BootloaderVersion,
    /// Firmware version.
    FirmwareVersion,
    /// Product identifier.
    ProductId,
    /// Product version.
    ProductVersion,
    /// Application version.
    ApplicationVersion,
}

/// Fields in the order they are queried and displayed.
pub const INFO_SEQUENCE: [InfoField; 5] = [
    InfoField::BootloaderVersion,
    InfoField::FirmwareVersion,
    InfoField::ProductId,
    InfoField::ProductVersion,
    InfoField::ApplicationVersion,
];

impl InfoField {
    /// Command that queries this field.
    pub fn command(self) -> CommandKind {
        match self {
            Self::BootloaderVersion => CommandKind::FetchInfo,
            Self::FirmwareVersion => CommandKind::GetFirmwareVersion,
            Self::ProductId => CommandKind::GetProductId,
            Self::ProductVersion => CommandKind::GetProductVersion,
            Self::ApplicationVersion => CommandKind::ReadApplicationVersion,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::BootloaderVersion => "Bootloader version",
            Self::FirmwareVersion => "Firmware version",
            Self::ProductId => "Product ID",
            Self::ProductVersion => "Product version",
            Self::ApplicationVersion => "Application version",
        }
    }

    /// Machine-readable key.
    pub fn key(self) -> &'static str {
        match self {
            Self::BootloaderVersion => "bootloader_version",
            Self::FirmwareVersion => "firmware_version",
            Self::ProductId => "product_id",
            Self::ProductVersion => "product_version",
            Self::ApplicationVersion => "application_version",
        }
    }
}

impl fmt::Display for InfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decoded value of an info field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// ASCII text.
    Text(String),
    /// Upper-case hex of bytes with no ASCII text.
    Hex(String),
    /// No valid reply.
    Unavailable,
}

impl FieldValue {
    /// Whether the device answered the query.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Hex(s) => f.write_str(s),
            Self::Unavailable => f.write_str("N/A"),
        }
    }
}

/// Decode reply bytes as ASCII text, falling back to hex.
///
/// Non-ASCII bytes are skipped and surrounding whitespace is trimmed.
/// Other control bytes are kept as received.
pub fn decode_field_text(bytes: &[u8]) -> FieldValue {
    let text: String = bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect();
    let text = text.trim_matches(char::is_whitespace);
    if text.is_empty() {
        FieldValue::Hex(to_hex(bytes))
    } else {
        FieldValue::Text(text.to_string())
    }
}

/// Result of the info sequence, in query order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    fields: Vec<(InfoField, FieldValue)>,
}

impl DeviceInfo {
    /// Value of one field, if it was queried.
    pub fn get(&self, field: InfoField) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    /// All fields in query order.
    pub fn iter(&self) -> impl Iterator<Item = (InfoField, &FieldValue)> {
        self.fields
            .iter()
            .map(|(f, v)| (*f, v))
    }

    /// Number of fields the device answered.
    pub fn available(&self) -> usize {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_available())
            .count()
    }
}

impl FromIterator<(InfoField, FieldValue)> for DeviceInfo {
    fn from_iter<I: IntoIterator<Item = (InfoField, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<P: Port, S: EventSink> Session<P, S> {
    /// Query a single info field.
    pub fn query_field(&mut self, field: InfoField) -> Result<FieldValue> {
        let slice = self.codec().layout().info_slice;
        let value = match self.send(field.command())? {
            Exchange::Response(response) => decode_field_text(response.field_bytes(slice)),
            Exchange::Timeout | Exchange::Malformed { .. } => FieldValue::Unavailable,
        };
        self.sink_mut()
            .on_field_decoded(field, &value.to_string());
        Ok(value)
    }

    /// Run every query in [`INFO_SEQUENCE`].
    ///
    /// A field that times out is reported as unavailable and the sequence
    /// carries on. Only a transport failure stops it.
    pub fn fetch_info(&mut self) -> Result<DeviceInfo> {
        let mut info = DeviceInfo::default();
        for field in INFO_SEQUENCE {
            let value = self.query_field(field)?;
            info.fields.push((field, value));
        }
        Ok(info)
    }
}
