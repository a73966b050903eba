//! ROM content fingerprints.
//!
//! Three identity values are derived from a loaded image: the vendor header
//! checksum (a 16-bit running word sum the console BIOS verifies), and
//! SHA-1/CRC32 digests over the raw bytes used as content identity for
//! compatibility-database lookups by the surrounding system.

use crate::RomAccess;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;

/// First ROM offset covered by the header checksum sum
const CHECKSUM_PAYLOAD_START: u32 = 0x200;

/// Fingerprints of one ROM image, computed once after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomFingerprints {
    stored_checksum: u16,
    computed_checksum: u16,
    sha1: String,
    crc32: String,
}

impl RomFingerprints {
    /// Compute all fingerprints for a loaded image.
    ///
    /// The stored checksum is the big-endian word at `checksum_offset`
    /// (console specific); reads go through the backing store so short
    /// images resolve through the usual ROM wraparound rules.
    pub fn compute(rom: &impl RomAccess, checksum_offset: u32) -> Self {
        let stored_checksum = ((rom.read_rom_byte(checksum_offset) as u16) << 8)
            | rom.read_rom_byte(checksum_offset + 1) as u16;

        let mut hasher = Sha1::new();
        hasher.update(rom.rom_data());
        let sha1 = format!("{:x}", hasher.finalize());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(rom.rom_data());
        let crc32 = format!("{:x}", hasher.finalize());

        Self {
            stored_checksum,
            computed_checksum: compute_checksum(rom),
            sha1,
            crc32,
        }
    }

    pub fn stored_checksum(&self) -> u16 {
        self.stored_checksum
    }

    pub fn computed_checksum(&self) -> u16 {
        self.computed_checksum
    }

    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub fn crc32(&self) -> &str {
        &self.crc32
    }

    pub fn has_correct_checksum(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}

impl fmt::Display for RomFingerprints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ROM header checksum: {:#06x}, computed: {:#06x}, match: {}",
            self.stored_checksum,
            self.computed_checksum,
            self.has_correct_checksum()
        )?;
        write!(f, "ROM sha1: {} - ROM CRC32: {}", self.sha1, self.crc32)
    }
}

/// 16-bit running word sum from offset 0x200 to the end of the image.
///
/// Words are summed big-endian with the sum masked to 16 bits after each
/// addition; an odd-length image contributes its final byte once.
fn compute_checksum(rom: &impl RomAccess) -> u16 {
    let size = rom.rom_size() as u32;
    let mut sum: u32 = 0;
    let mut offset = CHECKSUM_PAYLOAD_START;

    while offset + 1 < size {
        let word = ((rom.read_rom_byte(offset) as u32) << 8) | rom.read_rom_byte(offset + 1) as u32;
        sum = (sum + word) & 0xFFFF;
        offset += 2;
    }
    if size % 2 != 0 {
        sum = (sum + rom.read_rom_byte(offset) as u32) & 0xFFFF;
    }

    sum as u16
}
