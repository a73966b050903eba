//! Backing store for the cartridge image and console work RAM.
//!
//! ROM reads reproduce the hardware address decode: the power-of-two
//! chip-select mask is applied first, then one wraparound pass brings the
//! address back inside the true image size. RAM accesses are bounds checked;
//! an out-of-range access is a recoverable, logged condition rather than a
//! failure.

use hexdrive_core::logging::{Category, Diagnostics, Severity};
use hexdrive_core::{RomAccess, Width};
use std::rc::Rc;

/// 68000 work RAM size (Mega Drive / Genesis)
pub const M68K_RAM_SIZE: usize = 0x10000;
/// Z80 work RAM size (SG-1000)
pub const SG1000_RAM_SIZE: usize = 0x400;
/// Z80 work RAM size (MSX)
pub const MSX_RAM_SIZE: usize = 0x4000;
/// Z80 work RAM size (Master System)
pub const SMS_RAM_SIZE: usize = 0x2000;

/// ROM offset of the big-endian 16-bit header checksum field
pub const CHECKSUM_FIELD_ADDRESS: u32 = 0x18E;

/// Owns the ROM image and the console work RAM.
///
/// Constructed once per console variant; the ROM is replaced wholesale on
/// reload while RAM persists for the emulation session. A freshly built
/// instance carries a single placeholder ROM byte, serving as the explicit
/// "no memory" default until a cartridge is loaded.
pub struct MdMemory {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_mask: u32,
    diagnostics: Rc<Diagnostics>,
}

impl MdMemory {
    /// Mega Drive / Genesis instance (64KB of 68k work RAM)
    pub fn genesis(diagnostics: Rc<Diagnostics>) -> Self {
        Self::with_ram_size(M68K_RAM_SIZE, diagnostics)
    }

    /// Master System instance (8KB of Z80 work RAM)
    pub fn sms(diagnostics: Rc<Diagnostics>) -> Self {
        Self::with_ram_size(SMS_RAM_SIZE, diagnostics)
    }

    /// SG-1000 instance (1KB of Z80 work RAM)
    pub fn sg1000(diagnostics: Rc<Diagnostics>) -> Self {
        Self::with_ram_size(SG1000_RAM_SIZE, diagnostics)
    }

    /// MSX instance (16KB of Z80 work RAM)
    pub fn msx(diagnostics: Rc<Diagnostics>) -> Self {
        Self::with_ram_size(MSX_RAM_SIZE, diagnostics)
    }

    /// Backing store with a console-variant work RAM size and no image loaded
    pub fn with_ram_size(ram_size: usize, diagnostics: Rc<Diagnostics>) -> Self {
        let mut memory = Self {
            rom: Vec::new(),
            ram: vec![0; ram_size],
            rom_mask: 0,
            diagnostics,
        };
        memory.set_rom_data(vec![0]);
        memory
    }

    /// Replace the ROM image and recompute the chip-select mask
    pub fn set_rom_data(&mut self, data: Vec<u8>) {
        self.rom_mask = data.len().next_power_of_two() as u32 - 1;
        self.rom = data;
    }

    /// Drop the loaded image, restoring the placeholder
    pub fn release_rom(&mut self) {
        self.set_rom_data(vec![0]);
    }

    /// Read a work RAM byte; out of range yields 0 with a diagnostic
    pub fn read_ram_byte(&self, address: u32) -> u8 {
        match self.ram.get(address as usize) {
            Some(&value) => value,
            None => {
                self.diagnostics.report(
                    Category::Memory,
                    Severity::Error,
                    format!("invalid RAM read at {address:#x}"),
                );
                0
            }
        }
    }

    /// Write a work RAM byte; out of range is a no-op with a diagnostic
    pub fn write_ram_byte(&mut self, address: u32, value: u8) {
        match self.ram.get_mut(address as usize) {
            Some(slot) => *slot = value,
            None => {
                self.diagnostics.report(
                    Category::Memory,
                    Severity::Error,
                    format!("invalid RAM write at {address:#x}, data {value:#x}"),
                );
            }
        }
    }

    /// Overwrite the header checksum field with a big-endian 16-bit value
    pub fn patch_checksum_field(&mut self, value: u16) {
        let offset = CHECKSUM_FIELD_ADDRESS as usize;
        if offset + 1 < self.rom.len() {
            self.rom[offset] = (value >> 8) as u8;
            self.rom[offset + 1] = value as u8;
        } else {
            self.diagnostics.report(
                Category::Memory,
                Severity::Error,
                format!(
                    "image too short to patch checksum field ({} bytes)",
                    self.rom.len()
                ),
            );
        }
    }

    /// Sized ROM read, composed big-endian from sequential byte reads
    pub fn read_rom(&self, width: Width, address: u32) -> u32 {
        match width {
            Width::Byte => self.read_rom_byte(address) as u32,
            Width::Word => {
                let mut data = (self.read_rom_byte(address) as u32) << 8;
                data |= self.read_rom_byte(address + 1) as u32;
                data
            }
            Width::Long => {
                let mut data = (self.read_rom_byte(address) as u32) << 24;
                data |= (self.read_rom_byte(address + 1) as u32) << 16;
                data |= (self.read_rom_byte(address + 2) as u32) << 8;
                data |= self.read_rom_byte(address + 3) as u32;
                data
            }
        }
    }

    /// Sized work RAM read, composed big-endian
    pub fn read_ram(&self, width: Width, address: u32) -> u32 {
        match width {
            Width::Byte => self.read_ram_byte(address) as u32,
            Width::Word => {
                let mut data = (self.read_ram_byte(address) as u32) << 8;
                data |= self.read_ram_byte(address + 1) as u32;
                data
            }
            Width::Long => {
                let mut data = (self.read_ram_byte(address) as u32) << 24;
                data |= (self.read_ram_byte(address + 1) as u32) << 16;
                data |= (self.read_ram_byte(address + 2) as u32) << 8;
                data |= self.read_ram_byte(address + 3) as u32;
                data
            }
        }
    }

    /// Sized work RAM write, decomposed big-endian
    pub fn write_ram(&mut self, width: Width, address: u32, value: u32) {
        let value = value & width.max_value();
        match width {
            Width::Byte => self.write_ram_byte(address, value as u8),
            Width::Word => {
                self.write_ram_byte(address, (value >> 8) as u8);
                self.write_ram_byte(address + 1, value as u8);
            }
            Width::Long => {
                self.write_ram_byte(address, (value >> 24) as u8);
                self.write_ram_byte(address + 1, (value >> 16) as u8);
                self.write_ram_byte(address + 2, (value >> 8) as u8);
                self.write_ram_byte(address + 3, value as u8);
            }
        }
    }

    /// Current chip-select mask; `rom_mask + 1` is a power of two >= ROM size
    pub fn rom_mask(&self) -> u32 {
        self.rom_mask
    }

    pub fn ram_size(&self) -> usize {
        self.ram.len()
    }

    pub fn ram_data(&self) -> &[u8] {
        &self.ram
    }

    /// Restore work RAM contents (truncated to the RAM size)
    pub fn set_ram_data(&mut self, data: &[u8]) {
        let n = data.len().min(self.ram.len());
        self.ram[..n].copy_from_slice(&data[..n]);
    }
}

impl RomAccess for MdMemory {
    fn read_rom_byte(&self, address: u32) -> u8 {
        if self.rom.is_empty() {
            return 0;
        }
        let size = self.rom.len() as u32;
        let mut address = address;
        if address > size - 1 {
            // Chip-select mask first, then a single wraparound pass
            address &= self.rom_mask;
            if address > size - 1 {
                address -= size;
            }
        }
        self.rom[address as usize]
    }

    fn rom_data(&self) -> &[u8] {
        &self.rom
    }
}
