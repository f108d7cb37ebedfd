//! Protocol implementations.

pub mod command;
pub mod crc;
pub mod frame;

// Re-export common types
pub use command::{CommandKind, CommandTable};
pub use crc::{Crc32, CrcParams, checksum};
pub use frame::{Codec, FrameLayout, InfoSlice, Response, to_hex};
