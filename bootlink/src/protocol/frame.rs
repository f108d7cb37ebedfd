//! Wire framing for the bootloader protocol.
//!
//! ## Frame Format
//!
//! ```text
//! +-------+-----+------+-------+-----------+----------+-------+
//! | Head  | CMD | REQ  | [LEN] |  Payload  |  CRC32   | Foot  |
//! +-------+-----+------+-------+-----------+----------+-------+
//! | 2     | 1   | 1    | 0/1   |  0..=255  |  4 (BE)  | 2     |
//! +-------+-----+------+-------+-----------+----------+-------+
//! | AA 55 | cmd | 0x01 |  len  |  data     |  crc     | BB 66 |
//! +-------+-----+------+-------+-----------+----------+-------+
//! ```
//!
//! The checksum covers `CMD REQ [LEN] Payload` only, word-widened (see
//! [`crate::protocol::crc`]). Whether the `LEN` byte exists depends on the
//! bootloader revision and is selected by [`FrameLayout`].

use {
    crate::{
        error::{Error, FrameError, Result},
        protocol::crc::Crc32,
    },
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
};

/// Frame start marker.
pub const HEADER: [u8; 2] = [0xAA, 0x55];

/// Frame end marker.
pub const FOOTER: [u8; 2] = [0xBB, 0x66];

/// Request byte carried by every host-to-device frame.
pub const REQUEST: u8 = 0x01;

/// Request byte the device puts in its acknowledgments.
pub const REQUEST_ACK: u8 = 0x02;

/// Largest payload a single frame carries.
pub const MAX_PAYLOAD: usize = 255;

/// Size of the trailing checksum.
pub const CHECKSUM_LEN: usize = 4;

/// Which part of a response carries an info field's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum InfoSlice {
    /// The validated payload only.
    #[default]
    Payload,
    /// Everything between header and checksum, command byte included.
    Body,
}

/// Revision-dependent frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct FrameLayout {
    /// Frames carry an explicit payload length byte after `REQ`.
    pub length_byte: bool,
    /// Response slice decoded for info queries.
    pub info_slice: InfoSlice,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            length_byte: true,
            info_slice: InfoSlice::Payload,
        }
    }
}

impl FrameLayout {
    /// Layout of early bootloader revisions: no length byte, info text read
    /// from the whole body.
    pub const LEGACY: Self = Self {
        length_byte: false,
        info_slice: InfoSlice::Body,
    };

    /// Bytes between header and payload.
    pub fn prefix_len(&self) -> usize {
        2 + usize::from(self.length_byte)
    }

    /// Smallest valid frame for this layout.
    pub fn min_frame_len(&self) -> usize {
        HEADER.len() + self.prefix_len() + CHECKSUM_LEN + FOOTER.len()
    }
}

/// A validated response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Command byte.
    pub command: u8,
    /// Request byte (`REQUEST_ACK` for device acknowledgments).
    pub request: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// The complete frame as received.
    pub raw: Vec<u8>,
}

impl Response {
    /// Bytes between header and checksum.
    pub fn body(&self) -> &[u8] {
        &self.raw[HEADER.len()..self.raw.len() - CHECKSUM_LEN - FOOTER.len()]
    }

    /// Whether the device marked this frame as an acknowledgment.
    pub fn is_ack_flag(&self) -> bool {
        self.request == REQUEST_ACK
    }

    /// Slice holding an info field's text.
    pub fn field_bytes(&self, slice: InfoSlice) -> &[u8] {
        match slice {
            InfoSlice::Payload => &self.payload,
            InfoSlice::Body => self.body(),
        }
    }
}

/// Frame encoder/decoder for one [`FrameLayout`].
#[derive(Debug, Clone)]
pub struct Codec {
    layout: FrameLayout,
    crc: Crc32,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(FrameLayout::default())
    }
}

impl Codec {
    /// Create a codec for the given layout.
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            crc: Crc32::default(),
        }
    }

    /// The layout in use.
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Word-widened checksum, as used for frames and whole images.
    pub fn checksum(&self, data: &[u8]) -> u32 {
        self.crc.checksum_widened(data)
    }

    /// Wrap a body in header, checksum and footer.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    fn assemble(&self, body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER.len() + body.len() + CHECKSUM_LEN + FOOTER.len());
        frame.extend_from_slice(&HEADER);
        frame.extend_from_slice(body);
        frame
            .write_u32::<BigEndian>(self.checksum(body))
            .unwrap();
        frame.extend_from_slice(&FOOTER);
        frame
    }

    /// Build a frame without payload.
    pub fn encode_simple(&self, cmd: u8) -> Vec<u8> {
        let mut body = vec![cmd, REQUEST];
        if self.layout.length_byte {
            body.push(0x00);
        }
        self.assemble(&body)
    }

    /// Build a frame carrying `payload`.
    ///
    /// An empty payload gives the same bytes as [`Codec::encode_simple`].
    /// Nothing is produced for an oversized payload.
    pub fn encode_with_payload(&self, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.encode_frame(cmd, REQUEST, payload)
    }

    /// Build a frame with an explicit request byte, e.g. a device reply
    /// carrying [`REQUEST_ACK`].
    pub fn encode_frame(&self, cmd: u8, request: u8, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut body = Vec::with_capacity(self.layout.prefix_len() + payload.len());
        body.push(cmd);
        body.push(request);
        if self.layout.length_byte {
            #[allow(clippy::cast_possible_truncation)] // Checked against MAX_PAYLOAD
            let len = payload.len() as u8;
            body.push(len);
        }
        body.extend_from_slice(payload);
        Ok(self.assemble(&body))
    }

    /// Validate a received frame and split it into its fields.
    pub fn decode_response(&self, raw: &[u8]) -> std::result::Result<Response, FrameError> {
        let min = self.layout.min_frame_len();
        if raw.len() < min {
            return Err(FrameError::FrameTooShort {
                len: raw.len(),
                min,
            });
        }
        if raw[..HEADER.len()] != HEADER {
            return Err(FrameError::BadHeader);
        }
        if raw[raw.len() - FOOTER.len()..] != FOOTER {
            return Err(FrameError::BadFooter);
        }

        let crc_end = raw.len() - FOOTER.len();
        let crc_start = crc_end - CHECKSUM_LEN;
        let body = &raw[HEADER.len()..crc_start];

        let actual = BigEndian::read_u32(&raw[crc_start..crc_end]);
        let expected = self.checksum(body);
        if actual != expected {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        let prefix = self.layout.prefix_len();
        let payload = &body[prefix..];
        if self.layout.length_byte {
            let declared = usize::from(body[2]);
            if declared != payload.len() {
                return Err(FrameError::LengthMismatch {
                    declared,
                    actual: payload.len(),
                });
            }
        }

        Ok(Response {
            command: body[0],
            request: body[1],
            payload: payload.to_vec(),
            raw: raw.to_vec(),
        })
    }
}

/// Upper-case hex without separators, as shown in frame logs.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}
