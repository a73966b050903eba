//! Mega Drive cartridge header parsing.
//!
//! Header layout (offsets into the ROM image):
//! - 0x180: serial number, 14 ASCII bytes
//! - 0x18E: big-endian 16-bit checksum
//! - 0x1A0 / 0x1A4: ROM start / end (32-bit, two big-endian words each)
//! - 0x1A8 / 0x1AC: RAM start / end
//! - 0x1B0: external-RAM marker ("RA") followed by two flag bytes
//! - 0x1B4 / 0x1B8: SRAM start / end
//!
//! Vendor headers are frequently wrong. Every inconsistency is resolved with
//! a console default and recorded as a diagnostic so that loading always
//! succeeds; nothing in here is a fatal error.

use crate::memory::{MdMemory, CHECKSUM_FIELD_ADDRESS};
use hexdrive_core::logging::{Category, Diagnostics, Severity};
use hexdrive_core::{RomAccess, RomFingerprints, Width};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Console-default battery RAM window, used whenever the header is missing,
/// corrupt, or undersized
pub const DEFAULT_SRAM_START: u32 = 0x0020_0000;
pub const DEFAULT_SRAM_END: u32 = 0x0020_FFFF;
pub const DEFAULT_SRAM_SIZE: usize = (DEFAULT_SRAM_END - DEFAULT_SRAM_START + 1) as usize;

const SERIAL_ADDRESS: u32 = 0x180;
const SERIAL_LENGTH: usize = 14;
const ROM_START_ADDRESS: u32 = 0x1A0;
const ROM_END_ADDRESS: u32 = 0x1A4;
const RAM_START_ADDRESS: u32 = 0x1A8;
const RAM_END_ADDRESS: u32 = 0x1AC;
const SRAM_FLAG_ADDRESS: u32 = 0x1B0;
const SRAM_START_ADDRESS: u32 = 0x1B4;
const SRAM_END_ADDRESS: u32 = 0x1B8;
const EXTERNAL_RAM_MARKER: [u8; 2] = *b"RA";

/// Serial reported when the image is too short to contain the field
pub const SERIAL_UNKNOWN: &str = "unknown";
const DEFAULT_ROM_NAME: &str = "norom.bin";

/// Read-only snapshot of a parsed cartridge header.
///
/// Derived from exactly one backing-store state at load time; the only write
/// back into the store is the optional checksum auto-fix pass.
#[derive(Debug, Clone, Serialize)]
pub struct MdCartridgeInfo {
    rom_name: String,
    rom_start: u32,
    rom_end: u32,
    ram_start: u32,
    ram_end: u32,
    sram_start: u32,
    sram_end: u32,
    sram_enabled: bool,
    serial: String,
    rom_size: usize,
    fingerprints: RomFingerprints,
}

impl MdCartridgeInfo {
    /// Parse the header out of a populated backing store.
    ///
    /// Layout fields are read first (through the store, so short images
    /// resolve via the ROM wraparound rules), then the fingerprint stage.
    /// With `autofix_checksum` set, a mismatching checksum field is patched
    /// in ROM with the computed value; the returned snapshot still reports
    /// the values read before patching.
    pub fn parse(
        memory: &mut MdMemory,
        rom_name: &str,
        autofix_checksum: bool,
        diagnostics: &Rc<Diagnostics>,
    ) -> Self {
        let rom_name = if rom_name.trim().is_empty() {
            DEFAULT_ROM_NAME.to_string()
        } else {
            rom_name.to_string()
        };

        let rom_start = read_long_field(memory, ROM_START_ADDRESS);
        let rom_end = read_long_field(memory, ROM_END_ADDRESS);
        let ram_start = read_long_field(memory, RAM_START_ADDRESS);
        let ram_end = read_long_field(memory, RAM_END_ADDRESS);

        let (sram_start, sram_end, sram_enabled) =
            detect_sram(memory, rom_start, rom_end, &rom_name, diagnostics);
        let serial = detect_serial(memory);

        let fingerprints = RomFingerprints::compute(memory, CHECKSUM_FIELD_ADDRESS);
        if autofix_checksum && !fingerprints.has_correct_checksum() {
            diagnostics.report(
                Category::Cartridge,
                Severity::Info,
                format!(
                    "auto-fix checksum from {:#06x} to {:#06x}",
                    fingerprints.stored_checksum(),
                    fingerprints.computed_checksum()
                ),
            );
            memory.patch_checksum_field(fingerprints.computed_checksum());
        }

        Self {
            rom_name,
            rom_start,
            rom_end,
            ram_start,
            ram_end,
            sram_start,
            sram_end,
            sram_enabled,
            serial,
            rom_size: memory.rom_size(),
            fingerprints,
        }
    }

    pub fn rom_name(&self) -> &str {
        &self.rom_name
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn rom_start(&self) -> u32 {
        self.rom_start
    }

    pub fn rom_end(&self) -> u32 {
        self.rom_end
    }

    pub fn ram_start(&self) -> u32 {
        self.ram_start
    }

    pub fn ram_end(&self) -> u32 {
        self.ram_end
    }

    pub fn sram_start(&self) -> u32 {
        self.sram_start
    }

    pub fn sram_end(&self) -> u32 {
        self.sram_end
    }

    pub fn sram_enabled(&self) -> bool {
        self.sram_enabled
    }

    /// Size of the loaded image in bytes (not the declared window)
    pub fn rom_size(&self) -> usize {
        self.rom_size
    }

    pub fn sram_size_bytes(&self) -> usize {
        (self.sram_end.wrapping_sub(self.sram_start) as usize) + 1
    }

    pub fn fingerprints(&self) -> &RomFingerprints {
        &self.fingerprints
    }

    pub fn has_correct_checksum(&self) -> bool {
        self.fingerprints.has_correct_checksum()
    }

    /// Cartridges with a non-compliant header: the console-default battery
    /// window counts as battery RAM when it lies entirely past the declared
    /// ROM end and the access falls inside it
    pub fn is_sram_used_with_broken_header(&self, address: u32) -> bool {
        let no_overlap_with_rom = DEFAULT_SRAM_START > self.rom_end;
        no_overlap_with_rom && (DEFAULT_SRAM_START..=DEFAULT_SRAM_END).contains(&address)
    }

    /// Runtime correction for under-declared battery windows: an access
    /// between the declared end and the console-default end extends the
    /// window to the default end. Returns whether an adjustment happened.
    pub fn adjust_sram_limits(&mut self, address: u32, diagnostics: &Rc<Diagnostics>) -> bool {
        let adjust = self.sram_end < DEFAULT_SRAM_END
            && address > self.sram_end
            && address < DEFAULT_SRAM_END;
        if adjust {
            diagnostics.report(
                Category::Cartridge,
                Severity::Warn,
                format!(
                    "adjusting SRAM limit from {:x} to {:x}",
                    self.sram_end, DEFAULT_SRAM_END
                ),
            );
            self.sram_end = DEFAULT_SRAM_END;
        }
        adjust
    }

    /// Battery window summary for external tooling: `enabled;start;end;size`
    /// with unprefixed hex addresses and decimal size
    pub fn to_sram_csv(&self) -> String {
        format!(
            "{};{:x};{:x};{}",
            self.sram_enabled,
            self.sram_start,
            self.sram_end,
            self.sram_size_bytes()
        )
    }
}

impl fmt::Display for MdCartridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ROM size: {} bytes, start-end: {:x} - {:x}",
            self.rom_end.wrapping_sub(self.rom_start).wrapping_add(1),
            self.rom_start,
            self.rom_end
        )?;
        writeln!(
            f,
            "RAM size: {} bytes, start-end: {:x} - {:x}",
            self.ram_end.wrapping_sub(self.ram_start).wrapping_add(1),
            self.ram_start,
            self.ram_end
        )?;
        writeln!(f, "SRAM flag: {}", self.sram_enabled)?;
        write!(f, "{}", self.fingerprints)?;
        if self.sram_enabled {
            write!(
                f,
                "\nSRAM size: {} bytes, start-end: {:x} - {:x}",
                self.sram_size_bytes(),
                self.sram_start,
                self.sram_end
            )?;
        }
        Ok(())
    }
}

/// 32-bit header field: two consecutive big-endian words, `high16 << 16 | low16`
fn read_long_field(memory: &MdMemory, address: u32) -> u32 {
    (memory.read_rom(Width::Word, address) << 16) | memory.read_rom(Width::Word, address + 2)
}

fn detect_sram(
    memory: &MdMemory,
    rom_start: u32,
    rom_end: u32,
    rom_name: &str,
    diagnostics: &Rc<Diagnostics>,
) -> (u32, u32, bool) {
    let marker = [
        memory.read_rom_byte(SRAM_FLAG_ADDRESS),
        memory.read_rom_byte(SRAM_FLAG_ADDRESS + 1),
    ];
    if marker != EXTERNAL_RAM_MARKER {
        return (0, 0, false);
    }

    let flags = memory.read_rom_byte(SRAM_FLAG_ADDRESS + 2);
    let kind = memory.read_rom_byte(SRAM_FLAG_ADDRESS + 3);
    let battery_backed = flags & 0x80 != 0;
    let sram_type = kind & 0x20 != 0;

    if !battery_backed {
        if sram_type {
            // SRAM-type chip without the battery flag: volatile configuration
            diagnostics.report(
                Category::Cartridge,
                Severity::Warn,
                format!("volatile SRAM? {rom_name}"),
            );
        }
        return (0, 0, false);
    }

    let mut start = read_long_field(memory, SRAM_START_ADDRESS);
    let mut end = read_long_field(memory, SRAM_END_ADDRESS);
    if end < start {
        diagnostics.report(
            Category::Cartridge,
            Severity::Error,
            format!("corrupt SRAM window {start:x}-{end:x}, using console default"),
        );
        start = DEFAULT_SRAM_START;
        end = DEFAULT_SRAM_END;
    } else if start <= rom_end && end >= rom_start {
        diagnostics.report(
            Category::Cartridge,
            Severity::Error,
            format!(
                "SRAM window {start:x}-{end:x} overlaps ROM {rom_start:x}-{rom_end:x}, using console default"
            ),
        );
        start = DEFAULT_SRAM_START;
        end = DEFAULT_SRAM_END;
    }
    (start, end, true)
}

fn detect_serial(memory: &MdMemory) -> String {
    let end = SERIAL_ADDRESS as usize + SERIAL_LENGTH;
    if memory.rom_size() < end {
        return SERIAL_UNKNOWN.to_string();
    }
    memory.rom_data()[SERIAL_ADDRESS as usize..end]
        .iter()
        .map(|&byte| byte as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_long(image: &mut [u8], offset: usize, value: u32) {
        image[offset] = (value >> 24) as u8;
        image[offset + 1] = (value >> 16) as u8;
        image[offset + 2] = (value >> 8) as u8;
        image[offset + 3] = value as u8;
    }

    /// Image with a well-formed layout header and no SRAM declaration
    fn base_image() -> Vec<u8> {
        let mut image = vec![0u8; 0x400];
        image[0x180..0x18E].copy_from_slice(b"GM 00001234-00");
        set_long(&mut image, 0x1A0, 0x0000_0000);
        set_long(&mut image, 0x1A4, 0x0003_FFFF);
        set_long(&mut image, 0x1A8, 0x00FF_0000);
        set_long(&mut image, 0x1AC, 0x00FF_FFFF);
        image
    }

    fn parse(image: Vec<u8>) -> (MdCartridgeInfo, Rc<Diagnostics>) {
        let diagnostics = Rc::new(Diagnostics::new());
        let mut memory = MdMemory::genesis(Rc::clone(&diagnostics));
        memory.set_rom_data(image);
        let info = MdCartridgeInfo::parse(&mut memory, "test.bin", false, &diagnostics);
        (info, diagnostics)
    }

    #[test]
    fn test_layout_fields_assembled_from_words() {
        let (info, _) = parse(base_image());

        assert_eq!(info.rom_start(), 0x0000_0000);
        assert_eq!(info.rom_end(), 0x0003_FFFF);
        assert_eq!(info.ram_start(), 0x00FF_0000);
        assert_eq!(info.ram_end(), 0x00FF_FFFF);
        assert!(!info.sram_enabled());
    }

    #[test]
    fn test_serial_decoded_from_header() {
        let (info, _) = parse(base_image());
        assert_eq!(info.serial(), "GM 00001234-00");
    }

    #[test]
    fn test_serial_unknown_for_short_image() {
        let diagnostics = Rc::new(Diagnostics::new());
        let mut memory = MdMemory::genesis(Rc::clone(&diagnostics));
        memory.set_rom_data(vec![0; 0x100]);

        let info = MdCartridgeInfo::parse(&mut memory, "short.bin", false, &diagnostics);
        assert_eq!(info.serial(), SERIAL_UNKNOWN);
    }

    #[test]
    fn test_blank_rom_name_falls_back() {
        let diagnostics = Rc::new(Diagnostics::new());
        let mut memory = MdMemory::genesis(Rc::clone(&diagnostics));
        memory.set_rom_data(base_image());

        let info = MdCartridgeInfo::parse(&mut memory, "  ", false, &diagnostics);
        assert_eq!(info.rom_name(), "norom.bin");
    }

    #[test]
    fn test_battery_backed_sram_window_parsed() {
        let mut image = base_image();
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x80; // battery backed
        image[0x1B3] = 0x20;
        set_long(&mut image, 0x1B4, 0x0020_0001);
        set_long(&mut image, 0x1B8, 0x0020_3FFF);

        let (info, diagnostics) = parse(image);

        assert!(info.sram_enabled());
        assert_eq!(info.sram_start(), 0x0020_0001);
        assert_eq!(info.sram_end(), 0x0020_3FFF);
        assert_eq!(diagnostics.count(Category::Cartridge), 0);
    }

    #[test]
    fn test_corrupt_sram_window_replaced_by_default() {
        let mut image = base_image();
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x80;
        image[0x1B3] = 0x20;
        // end < start
        set_long(&mut image, 0x1B4, 0x0020_FFFF);
        set_long(&mut image, 0x1B8, 0x0020_0000);

        let (info, diagnostics) = parse(image);

        assert!(info.sram_enabled());
        assert_eq!(info.sram_start(), DEFAULT_SRAM_START);
        assert_eq!(info.sram_end(), DEFAULT_SRAM_END);
        assert_eq!(diagnostics.count(Category::Cartridge), 1);
    }

    #[test]
    fn test_sram_window_overlapping_rom_replaced_by_default() {
        let mut image = base_image();
        // Declared ROM reaches past the declared SRAM window start
        set_long(&mut image, 0x1A4, 0x002F_FFFF);
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x80;
        image[0x1B3] = 0x20;
        set_long(&mut image, 0x1B4, 0x0020_0000);
        set_long(&mut image, 0x1B8, 0x0020_FFFF);

        let (info, diagnostics) = parse(image);

        assert!(info.sram_enabled());
        assert_eq!(info.sram_start(), DEFAULT_SRAM_START);
        assert_eq!(info.sram_end(), DEFAULT_SRAM_END);
        assert_eq!(diagnostics.count(Category::Cartridge), 1);
    }

    #[test]
    fn test_volatile_sram_flag_reported_but_disabled() {
        let mut image = base_image();
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x00; // no battery
        image[0x1B3] = 0x20; // but SRAM-type chip

        let (info, diagnostics) = parse(image);

        assert!(!info.sram_enabled());
        assert_eq!(diagnostics.count(Category::Cartridge), 1);
    }

    #[test]
    fn test_broken_header_detection() {
        let (info, _) = parse(base_image());

        // Default window is past the declared ROM end (0x3FFFF)
        assert!(info.is_sram_used_with_broken_header(DEFAULT_SRAM_START));
        assert!(info.is_sram_used_with_broken_header(DEFAULT_SRAM_END));
        assert!(!info.is_sram_used_with_broken_header(DEFAULT_SRAM_START - 1));
        assert!(!info.is_sram_used_with_broken_header(DEFAULT_SRAM_END + 1));
    }

    #[test]
    fn test_broken_header_requires_rom_clear_of_window() {
        let mut image = base_image();
        // Declared ROM covers the default window
        set_long(&mut image, 0x1A4, 0x003F_FFFF);

        let (info, _) = parse(image);
        assert!(!info.is_sram_used_with_broken_header(DEFAULT_SRAM_START));
    }

    #[test]
    fn test_adjust_sram_limits_extends_underdeclared_window() {
        let mut image = base_image();
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x80;
        image[0x1B3] = 0x20;
        set_long(&mut image, 0x1B4, 0x0020_0000);
        set_long(&mut image, 0x1B8, 0x0020_00FF);

        let (mut info, diagnostics) = parse(image);
        assert_eq!(info.sram_end(), 0x0020_00FF);

        // Access past the declared end but inside the console-default window
        assert!(info.adjust_sram_limits(0x0020_0100, &diagnostics));
        assert_eq!(info.sram_end(), DEFAULT_SRAM_END);
        assert_eq!(diagnostics.count(Category::Cartridge), 1);

        // Already adjusted: nothing further to do
        assert!(!info.adjust_sram_limits(0x0020_0100, &diagnostics));
        assert_eq!(diagnostics.count(Category::Cartridge), 1);
    }

    #[test]
    fn test_sram_csv_format() {
        let mut image = base_image();
        image[0x1B0] = b'R';
        image[0x1B1] = b'A';
        image[0x1B2] = 0x80;
        image[0x1B3] = 0x20;
        set_long(&mut image, 0x1B4, DEFAULT_SRAM_START);
        set_long(&mut image, 0x1B8, DEFAULT_SRAM_END);

        let (info, _) = parse(image);
        assert_eq!(info.to_sram_csv(), "true;200000;20ffff;65536");

        let (info, _) = parse(base_image());
        assert_eq!(info.to_sram_csv(), "false;0;0;1");
    }

    #[test]
    fn test_checksum_reported_not_corrected_by_default() {
        let mut image = base_image();
        image[0x18E] = 0xDE;
        image[0x18F] = 0xAD;

        let diagnostics = Rc::new(Diagnostics::new());
        let mut memory = MdMemory::genesis(Rc::clone(&diagnostics));
        memory.set_rom_data(image);

        let info = MdCartridgeInfo::parse(&mut memory, "test.bin", false, &diagnostics);

        assert!(!info.has_correct_checksum());
        assert_eq!(memory.rom_data()[0x18E], 0xDE);
        assert_eq!(memory.rom_data()[0x18F], 0xAD);
    }

    #[test]
    fn test_checksum_autofix_patches_rom() {
        let mut image = base_image();
        image[0x18E] = 0xDE;
        image[0x18F] = 0xAD;
        image[0x200] = 0x12;
        image[0x201] = 0x34;

        let diagnostics = Rc::new(Diagnostics::new());
        let mut memory = MdMemory::genesis(Rc::clone(&diagnostics));
        memory.set_rom_data(image);

        let info = MdCartridgeInfo::parse(&mut memory, "test.bin", true, &diagnostics);

        // ROM now carries the computed value...
        assert_eq!(memory.rom_data()[0x18E], 0x12);
        assert_eq!(memory.rom_data()[0x18F], 0x34);
        // ...while the snapshot keeps what the header said at parse time
        assert_eq!(info.fingerprints().stored_checksum(), 0xDEAD);
        assert!(!info.has_correct_checksum());
    }

    #[test]
    fn test_display_summary_mentions_windows() {
        let (info, _) = parse(base_image());
        let text = info.to_string();

        assert!(text.contains("ROM size: 262144 bytes"));
        assert!(text.contains("SRAM flag: false"));
        assert!(text.contains("ROM sha1:"));
    }
}
