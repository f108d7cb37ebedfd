//! Error types for bootlink.

use std::io;
use thiserror::Error;

/// Result type for bootlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bootlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport port has been closed.
    #[error("Port is not open")]
    PortClosed,

    /// Payload does not fit in a single frame.
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending payload length.
        len: usize,
        /// Largest payload a frame can carry.
        max: usize,
    },

    /// A transfer was started without firmware data.
    #[error("No firmware image loaded")]
    NoImageLoaded,

    /// Firmware image cannot be described by the 32-bit completion packet.
    #[error("Firmware image too large: {0} bytes")]
    ImageTooLarge(usize),

    /// Operation not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Frame validation failures.
///
/// These never abort a session. The command protocol reports them as a
/// malformed exchange, which callers treat like a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the smallest valid frame.
    #[error("frame too short: {len} bytes (min {min})")]
    FrameTooShort {
        /// Received length.
        len: usize,
        /// Minimum length for the configured layout.
        min: usize,
    },

    /// Missing `AA 55` header.
    #[error("bad frame header")]
    BadHeader,

    /// Missing `BB 66` footer.
    #[error("bad frame footer")]
    BadFooter,

    /// Transmitted checksum does not match the recomputed one.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recomputed over the frame body.
        expected: u32,
        /// Checksum carried by the frame.
        actual: u32,
    },

    /// Length byte disagrees with the bytes actually present.
    #[error("length mismatch: declared {declared}, found {actual}")]
    LengthMismatch {
        /// Value of the length byte.
        declared: usize,
        /// Payload bytes present between length byte and checksum.
        actual: usize,
    },
}
