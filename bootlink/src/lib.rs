//! # bootlink
//!
//! Host side of a framed serial bootloader protocol.
//!
//! This crate talks to a small MCU bootloader over a serial link:
//!
//! - word-widened CRC-32 frame checksum
//! - frame encoding/decoding for both bootloader frame revisions
//! - a configurable opcode table
//! - request/response sessions with timeout handling
//! - the device info query sequence
//! - chunked firmware transfer, automatic or operator-paced, with abort
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootlink::{FirmwareImage, FirmwareTransfer, Session, TransferMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let port = bootlink::NativePort::open_simple("/dev/ttyUSB0", 115200)?;
//!         let mut session = Session::new(port);
//!
//!         if !session.connect()?.is_ack() {
//!             return Err("bootloader did not answer".into());
//!         }
//!
//!         let image = FirmwareImage::from_file("app.bin")?;
//!         let mut transfer = FirmwareTransfer::new(image, TransferMode::Automatic);
//!         let state = transfer.run(&mut session)?;
//!         println!("Finished: {state:?}");
//!
//!         session.reboot()?;
//!         session.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controls;
pub mod error;
pub mod event;
pub mod info;
pub mod port;
pub mod protocol;
pub mod session;
pub mod transfer;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    controls::{Controls, LinkState},
    error::{Error, FrameError, Result},
    event::{EventSink, LogSink, NullSink},
    info::{DeviceInfo, FieldValue, INFO_SEQUENCE, InfoField, decode_field_text},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        Codec, CommandKind, CommandTable, Crc32, CrcParams, FrameLayout, InfoSlice, Response,
        checksum, to_hex,
    },
    session::{Exchange, MAX_RESPONSE_LEN, Session},
    transfer::{
        AbortHandle, AbortReason, FirmwareImage, FirmwareTransfer, TransferConfig, TransferMode,
        TransferState,
    },
};
