//! Battery-backed save RAM window.
//!
//! Storage behind the cartridge's persistent-storage window. Accesses use
//! the same big-endian byte composition as ROM and work RAM; out-of-range
//! offsets degrade to 0 reads and dropped writes with a diagnostic. Hosts
//! persist the contents themselves (`data`/`set_data`), the `dirty` flag
//! tells them when there is something new to save.

use hexdrive_core::logging::{Category, Diagnostics, Severity};
use hexdrive_core::Width;
use std::rc::Rc;

pub struct SaveRam {
    data: Vec<u8>,
    dirty: bool,
    diagnostics: Rc<Diagnostics>,
}

impl SaveRam {
    pub fn new(size: usize, diagnostics: Rc<Diagnostics>) -> Self {
        Self {
            data: vec![0; size],
            dirty: false,
            diagnostics,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Restore battery contents saved by the host (truncated to the window size)
    pub fn set_data(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.dirty = false;
    }

    /// True when a write happened since the last `set_data`/`clear_dirty`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn read_byte(&self, offset: u32) -> u8 {
        match self.data.get(offset as usize) {
            Some(&value) => value,
            None => {
                self.diagnostics.report(
                    Category::Memory,
                    Severity::Error,
                    format!("invalid SRAM read at offset {offset:#x}"),
                );
                0
            }
        }
    }

    fn write_byte(&mut self, offset: u32, value: u8) {
        match self.data.get_mut(offset as usize) {
            Some(slot) => {
                *slot = value;
                self.dirty = true;
            }
            None => {
                self.diagnostics.report(
                    Category::Memory,
                    Severity::Error,
                    format!("invalid SRAM write at offset {offset:#x}, data {value:#x}"),
                );
            }
        }
    }

    /// Sized read, composed big-endian from sequential byte reads
    pub fn read(&self, width: Width, offset: u32) -> u32 {
        match width {
            Width::Byte => self.read_byte(offset) as u32,
            Width::Word => {
                let mut data = (self.read_byte(offset) as u32) << 8;
                data |= self.read_byte(offset + 1) as u32;
                data
            }
            Width::Long => {
                let mut data = (self.read_byte(offset) as u32) << 24;
                data |= (self.read_byte(offset + 1) as u32) << 16;
                data |= (self.read_byte(offset + 2) as u32) << 8;
                data |= self.read_byte(offset + 3) as u32;
                data
            }
        }
    }

    /// Sized write, decomposed big-endian
    pub fn write(&mut self, width: Width, offset: u32, value: u32) {
        let value = value & width.max_value();
        match width {
            Width::Byte => self.write_byte(offset, value as u8),
            Width::Word => {
                self.write_byte(offset, (value >> 8) as u8);
                self.write_byte(offset + 1, value as u8);
            }
            Width::Long => {
                self.write_byte(offset, (value >> 24) as u8);
                self.write_byte(offset + 1, (value >> 16) as u8);
                self.write_byte(offset + 2, (value >> 8) as u8);
                self.write_byte(offset + 3, value as u8);
            }
        }
    }
}
