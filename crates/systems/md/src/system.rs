//! System façade: cartridge loading, configuration and state snapshots.

use crate::bus::{Device, MdBus};
use crate::cartridge::MdCartridgeInfo;
use crate::memory::MdMemory;
use crate::MdError;
use hexdrive_core::logging::Diagnostics;
use hexdrive_core::BusProvider;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// One emulation session's memory subsystem: backing store, bus and the
/// diagnostics collector wired together.
///
/// Sessions are independent; building two systems shares no state.
pub struct MdSystem {
    bus: MdBus,
    memory: Rc<RefCell<MdMemory>>,
    diagnostics: Rc<Diagnostics>,
    autofix_checksum: bool,
}

impl Default for MdSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MdSystem {
    pub fn new() -> Self {
        let diagnostics = Rc::new(Diagnostics::new());
        let memory = Rc::new(RefCell::new(MdMemory::genesis(Rc::clone(&diagnostics))));
        let mut bus = MdBus::new(Rc::clone(&diagnostics));
        bus.attach(Device::Memory(Rc::clone(&memory)));

        Self {
            bus,
            memory,
            diagnostics,
            autofix_checksum: false,
        }
    }

    /// Patch the ROM checksum field when it mismatches (off by default)
    pub fn set_autofix_checksum(&mut self, enabled: bool) {
        self.autofix_checksum = enabled;
    }

    /// Load a cartridge image under a display name.
    ///
    /// Fails only for an empty image; every header anomaly is resolved with
    /// a console default and recorded as a diagnostic instead.
    pub fn load_cartridge(&mut self, data: &[u8], name: &str) -> Result<(), MdError> {
        if data.is_empty() {
            return Err(MdError::EmptyImage);
        }

        let header = {
            let mut memory = self.memory.borrow_mut();
            memory.set_rom_data(data.to_vec());
            MdCartridgeInfo::parse(&mut memory, name, self.autofix_checksum, &self.diagnostics)
        };
        self.bus.set_cartridge(header);
        Ok(())
    }

    /// Parsed header of the loaded cartridge, if any
    pub fn header(&self) -> Option<&MdCartridgeInfo> {
        self.bus.header()
    }

    pub fn bus(&mut self) -> &mut MdBus {
        &mut self.bus
    }

    pub fn memory(&self) -> Rc<RefCell<MdMemory>> {
        Rc::clone(&self.memory)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Release the loaded image; work RAM survives for the session
    pub fn close(&mut self) {
        self.bus.close();
    }

    /// JSON state snapshot: work RAM and battery RAM, never the ROM
    pub fn save_state(&self) -> Value {
        json!({
            "system": "md",
            "version": 1,
            "ram": self.memory.borrow().ram_data(),
            "sram": self.bus.save_ram().map(|sram| sram.data().to_vec()),
        })
    }

    /// Restore a state snapshot produced by [`MdSystem::save_state`]
    pub fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        if let Some(ram) = v.get("ram").and_then(|value| value.as_array()) {
            let bytes: Vec<u8> = ram
                .iter()
                .filter_map(|value| value.as_u64())
                .map(|value| value as u8)
                .collect();
            self.memory.borrow_mut().set_ram_data(&bytes);
        }
        if let Some(sram) = v.get("sram").and_then(|value| value.as_array()) {
            let bytes: Vec<u8> = sram
                .iter()
                .filter_map(|value| value.as_u64())
                .map(|value| value as u8)
                .collect();
            if let Some(save_ram) = self.bus.save_ram_mut() {
                save_ram.set_data(&bytes);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexdrive_core::Width;

    fn image_with_layout() -> Vec<u8> {
        let mut image = vec![0u8; 0x400];
        // Declared ROM end below the default battery window
        image[0x1A6] = 0x03;
        image[0x1A7] = 0xFF;
        image
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let mut system = MdSystem::new();
        assert!(matches!(
            system.load_cartridge(&[], "empty.bin"),
            Err(MdError::EmptyImage)
        ));
        assert!(system.header().is_none());
    }

    #[test]
    fn test_load_populates_store_and_header() {
        let mut system = MdSystem::new();
        system.load_cartridge(&image_with_layout(), "game.bin").unwrap();

        let header = system.header().unwrap();
        assert_eq!(header.rom_name(), "game.bin");
        assert_eq!(header.rom_size(), 0x400);
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut first = MdSystem::new();
        let mut second = MdSystem::new();

        first.load_cartridge(&image_with_layout(), "a.bin").unwrap();
        first.bus().write(0xFF0000, 0x12, Width::Byte).unwrap();

        second.load_cartridge(&image_with_layout(), "b.bin").unwrap();
        assert_eq!(second.bus().read(0xFF0000, Width::Byte), Ok(0));
        assert_eq!(first.header().unwrap().rom_name(), "a.bin");
        assert_eq!(second.header().unwrap().rom_name(), "b.bin");
    }

    #[test]
    fn test_close_then_reload() {
        let mut system = MdSystem::new();
        system.load_cartridge(&image_with_layout(), "game.bin").unwrap();

        system.close();
        assert!(system.header().is_none());

        system.load_cartridge(&image_with_layout(), "other.bin").unwrap();
        assert_eq!(system.header().unwrap().rom_name(), "other.bin");
    }

    #[test]
    fn test_save_and_load_state_round_trips_ram() {
        let mut system = MdSystem::new();
        system.load_cartridge(&image_with_layout(), "game.bin").unwrap();
        system.bus().write(0xFF0042, 0xAB, Width::Byte).unwrap();

        let state = system.save_state();
        assert_eq!(state["system"], "md");
        assert_eq!(state["version"], 1);

        let mut restored = MdSystem::new();
        restored.load_cartridge(&image_with_layout(), "game.bin").unwrap();
        restored.load_state(&state).unwrap();

        assert_eq!(restored.bus().read(0xFF0042, Width::Byte), Ok(0xAB));
    }

    #[test]
    fn test_state_snapshot_excludes_rom() {
        let mut system = MdSystem::new();
        system.load_cartridge(&image_with_layout(), "game.bin").unwrap();

        let state = system.save_state();
        assert!(state.get("rom").is_none());
    }
}
