//! Table-driven CRC-32 engine and the word-widened frame checksum.
//!
//! The bootloader validates frames with the STM32 hardware CRC unit, which
//! consumes 32-bit words. The device feeds every frame byte into the unit as
//! its own word, so the host must checksum each byte widened to a big-endian
//! `u32` (`0xA1` becomes `00 00 00 A1`). This is not the same value as a
//! CRC over the raw bytes.
//!
//! ```text
//! bytes:  A1        01
//! words:  00000000A1 0000000001   -> CRC-32/MPEG-2 over the 8 word bytes
//! ```

/// Parameters of a 32-bit CRC in the Rocksoft model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcParams {
    /// Generator polynomial (normal form, top bit implicit).
    pub poly: u32,
    /// Initial register value.
    pub init: u32,
    /// Reflect each input byte before processing.
    pub refin: bool,
    /// Reflect the register before the final XOR.
    pub refout: bool,
    /// Value XORed into the final register.
    pub xorout: u32,
}

/// CRC-32/MPEG-2: the configuration of the STM32 CRC peripheral.
pub const CRC_32_MPEG_2: CrcParams = CrcParams {
    poly: 0x04C11DB7,
    init: 0xFFFFFFFF,
    refin: false,
    refout: false,
    xorout: 0x00000000,
};

/// Parameters used by the frame checksum.
pub const FRAME_CRC: CrcParams = CRC_32_MPEG_2;

/// A CRC-32 calculator with a precomputed lookup table.
#[derive(Clone)]
pub struct Crc32 {
    params: CrcParams,
    table: [u32; 256],
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Crc32 {
    /// Build a calculator for the given parameters.
    pub fn new(params: CrcParams) -> Self {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 {
                    (crc << 1) ^ params.poly
                } else {
                    crc << 1
                };
            }
            *slot = crc;
        }
        Self { params, table }
    }

    /// Parameters of this calculator.
    pub fn params(&self) -> CrcParams {
        self.params
    }

    /// Start an incremental computation.
    pub fn digest(&self) -> Digest<'_> {
        Digest {
            crc: self,
            value: self.params.init,
        }
    }

    /// CRC over the raw bytes.
    pub fn checksum(&self, data: &[u8]) -> u32 {
        let mut digest = self.digest();
        digest.update(data);
        digest.finalize()
    }

    /// CRC over the bytes, each widened to a big-endian 32-bit word.
    pub fn checksum_widened(&self, data: &[u8]) -> u32 {
        let mut digest = self.digest();
        digest.update_widened(data);
        digest.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new(FRAME_CRC)
    }
}

/// Incremental CRC state.
#[derive(Debug, Clone)]
pub struct Digest<'a> {
    crc: &'a Crc32,
    value: u32,
}

impl Digest<'_> {
    fn push(&mut self, byte: u8) {
        let byte = if self.crc.params.refin {
            byte.reverse_bits()
        } else {
            byte
        };
        let index = ((self.value >> 24) ^ u32::from(byte)) & 0xFF;
        self.value = (self.value << 8) ^ self.crc.table[index as usize];
    }

    /// Feed raw bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(byte);
        }
    }

    /// Feed bytes widened to big-endian words, without allocating the
    /// widened buffer.
    pub fn update_widened(&mut self, data: &[u8]) {
        for &byte in data {
            self.push(0);
            self.push(0);
            self.push(0);
            self.push(byte);
        }
    }

    /// Finish the computation.
    pub fn finalize(self) -> u32 {
        let value = if self.crc.params.refout {
            self.value.reverse_bits()
        } else {
            self.value
        };
        value ^ self.crc.params.xorout
    }
}

/// Frame checksum: CRC-32/MPEG-2 over the word-widened bytes.
pub fn checksum(data: &[u8]) -> u32 {
    Crc32::default().checksum_widened(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpeg2_check_value() {
        let crc = Crc32::new(CRC_32_MPEG_2);
        assert_eq!(crc.checksum(b"123456789"), 0x0376E6E7);
    }

    #[test]
    fn test_widened_golden_vectors() {
        assert_eq!(checksum(&[0xA1, 0x01]), 0x2A39C670);
        assert_eq!(checksum(&[0xA1, 0x01, 0x00]), 0x40337098);
        assert_eq!(checksum(&[0xA3, 0x01]), 0xB823096A);
        assert_eq!(checksum(&[0xA0, 0x01, 0x03, 0x01, 0x02, 0x03]), 0x18EA2DCB);
    }

    #[test]
    fn test_widened_differs_from_raw() {
        let crc = Crc32::default();
        assert_eq!(crc.checksum(&[0xA1, 0x01]), 0x744056A8);
        assert_ne!(crc.checksum(&[0xA1, 0x01]), checksum(&[0xA1, 0x01]));
    }

    #[test]
    fn test_widened_matches_explicit_expansion() {
        let data = [0x12, 0x00, 0xFF, 0x7E, 0x80];
        let expanded: Vec<u8> = data
            .iter()
            .flat_map(|&b| u32::from(b).to_be_bytes())
            .collect();
        let crc = Crc32::default();
        assert_eq!(crc.checksum_widened(&data), crc.checksum(&expanded));
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(checksum(&[]), 0xFFFFFFFF);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255).collect();
        let crc = Crc32::default();
        let mut digest = crc.digest();
        for chunk in data.chunks(7) {
            digest.update_widened(chunk);
        }
        assert_eq!(digest.finalize(), crc.checksum_widened(&data));
    }

    #[test]
    fn test_reflected_parameters() {
        // CRC-32/ISO-HDLC is the reflected, complemented variant of the same polynomial.
        let iso = Crc32::new(CrcParams {
            poly: 0x04C11DB7,
            init: 0xFFFFFFFF,
            refin: true,
            refout: true,
            xorout: 0xFFFFFFFF,
        });
        assert_eq!(iso.checksum(b"123456789"), 0xCBF43926);
    }
}
