//! Mega Drive system bus.
//!
//! Memory map (24-bit address bus):
//! - 0x000000-0x3FFFFF: cartridge (ROM, with the battery RAM window overlaid)
//! - 0xE00000-0xFFFFFF: 68k work RAM (64KB, mirrored through the region)
//!
//! Reads and writes pick the first address-range binding containing the
//! address; an address with no binding is a mapping-configuration error and
//! is surfaced to the caller as a [`BusError`] instead of being swallowed.
//! I/O ports live in their own small address space, served by an attached
//! peripheral or by an internal latch when none is attached.

use crate::cartridge::{MdCartridgeInfo, DEFAULT_SRAM_SIZE, DEFAULT_SRAM_START};
use crate::memory::MdMemory;
use crate::sram::SaveRam;
use hexdrive_core::logging::{Category, Diagnostics, Severity};
use hexdrive_core::{BusError, BusProvider, Capability, Width};
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

/// Valid address mask for the Mega Drive bus (24-bit)
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

const CARTRIDGE_START: u32 = 0x00_0000;
const CARTRIDGE_END: u32 = 0x3F_FFFF;
const WORK_RAM_START: u32 = 0xE0_0000;
const WORK_RAM_END: u32 = 0xFF_FFFF;
const WORK_RAM_MASK: u32 = 0xFFFF;

/// Interrupt kinds the console raises toward the CPU-facing device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Vertical blanking (68k autovector level 6)
    VerticalBlank,
    /// Horizontal blanking (level 4)
    HorizontalBlank,
    /// External / controller port (level 2)
    External,
}

/// CPU-facing device that accepts interrupt signaling from the bus
pub trait InterruptHandler {
    fn handle_interrupt(&mut self, interrupt: Interrupt);
}

/// Peripheral reachable through the I/O port space
pub trait IoDevice {
    fn read_port(&mut self, port: u8) -> u8 {
        let _ = port;
        0xFF
    }

    fn write_port(&mut self, port: u8, value: u8) {
        let _ = (port, value);
    }
}

/// A device handle as attached to the bus, tagged by capability
#[derive(Clone)]
pub enum Device {
    Memory(Rc<RefCell<MdMemory>>),
    Cpu(Rc<RefCell<dyn InterruptHandler>>),
    Io(Rc<RefCell<dyn IoDevice>>),
}

impl Device {
    /// Capability tag this device binds to
    pub fn capability(&self) -> Capability {
        match self {
            Device::Memory(_) => Capability::Memory,
            Device::Cpu(_) => Capability::Cpu,
            Device::Io(_) => Capability::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Cartridge,
    WorkRam,
}

struct Mapping {
    start: u32,
    end: u32,
    target: Target,
}

pub struct MdBus {
    memory: Option<Rc<RefCell<MdMemory>>>,
    cpu: Option<Rc<RefCell<dyn InterruptHandler>>>,
    io: Option<Rc<RefCell<dyn IoDevice>>>,
    header: Option<MdCartridgeInfo>,
    sram: Option<SaveRam>,
    mappings: Vec<Mapping>,
    ports: [u8; 256],
    diagnostics: Rc<Diagnostics>,
}

impl MdBus {
    pub fn new(diagnostics: Rc<Diagnostics>) -> Self {
        Self {
            memory: None,
            cpu: None,
            io: None,
            header: None,
            sram: None,
            mappings: Vec::new(),
            ports: [0; 256],
            diagnostics,
        }
    }

    /// Attach a device, replacing any prior binding for its capability.
    /// Returns `self` so attachments chain.
    pub fn attach(&mut self, device: Device) -> &mut Self {
        match device {
            Device::Memory(memory) => {
                self.memory = Some(memory);
                self.rebuild_mappings();
            }
            Device::Cpu(cpu) => self.cpu = Some(cpu),
            Device::Io(io) => self.io = Some(io),
        }
        self
    }

    /// Look up the attached device for a capability tag
    pub fn device(&self, capability: Capability) -> Option<Device> {
        match capability {
            Capability::Memory => self.memory.clone().map(Device::Memory),
            Capability::Cpu => self.cpu.clone().map(Device::Cpu),
            Capability::Io => self.io.clone().map(Device::Io),
        }
    }

    /// Install a parsed cartridge header and allocate the battery RAM window.
    ///
    /// The window exists when the header enables it, or when the console
    /// default window lies past the declared ROM end (broken-header carts).
    pub fn set_cartridge(&mut self, header: MdCartridgeInfo) {
        let wants_sram = header.sram_enabled() || DEFAULT_SRAM_START > header.rom_end();
        self.sram = if wants_sram {
            let size = if header.sram_enabled() {
                header.sram_size_bytes().max(DEFAULT_SRAM_SIZE)
            } else {
                DEFAULT_SRAM_SIZE
            };
            Some(SaveRam::new(size, Rc::clone(&self.diagnostics)))
        } else {
            None
        };
        self.header = Some(header);
        self.rebuild_mappings();
    }

    pub fn header(&self) -> Option<&MdCartridgeInfo> {
        self.header.as_ref()
    }

    pub fn save_ram(&self) -> Option<&SaveRam> {
        self.sram.as_ref()
    }

    pub fn save_ram_mut(&mut self) -> Option<&mut SaveRam> {
        self.sram.as_mut()
    }

    /// Forward an interrupt to the CPU-facing device
    pub fn handle_interrupt(&mut self, interrupt: Interrupt) -> Result<(), BusError> {
        match &self.cpu {
            Some(cpu) => {
                cpu.borrow_mut().handle_interrupt(interrupt);
                Ok(())
            }
            None => Err(BusError::MissingDevice(Capability::Cpu)),
        }
    }

    fn rebuild_mappings(&mut self) {
        self.mappings.clear();
        if self.memory.is_some() {
            self.mappings.push(Mapping {
                start: CARTRIDGE_START,
                end: CARTRIDGE_END,
                target: Target::Cartridge,
            });
            self.mappings.push(Mapping {
                start: WORK_RAM_START,
                end: WORK_RAM_END,
                target: Target::WorkRam,
            });
        }
    }

    fn target_for(&self, address: u32) -> Option<Target> {
        self.mappings
            .iter()
            .find(|mapping| address >= mapping.start && address <= mapping.end)
            .map(|mapping| mapping.target)
    }

    /// Battery-window offset for an address, honoring the header's runtime
    /// correction rules; `None` means plain ROM
    fn sram_offset(&mut self, address: u32) -> Option<u32> {
        let header = self.header.as_mut()?;
        if header.sram_enabled() {
            header.adjust_sram_limits(address, &self.diagnostics);
            if address >= header.sram_start() && address <= header.sram_end() {
                return Some(address - header.sram_start());
            }
        }
        if header.is_sram_used_with_broken_header(address) {
            return Some(address - DEFAULT_SRAM_START);
        }
        None
    }

    fn read_cartridge(&mut self, address: u32, width: Width) -> u32 {
        if let Some(offset) = self.sram_offset(address) {
            if let Some(sram) = &self.sram {
                return sram.read(width, offset);
            }
        }
        match &self.memory {
            Some(memory) => memory.borrow().read_rom(width, address),
            None => 0,
        }
    }

    fn write_cartridge(&mut self, address: u32, value: u32, width: Width) {
        if let Some(offset) = self.sram_offset(address) {
            if let Some(sram) = &mut self.sram {
                sram.write(width, offset, value);
                return;
            }
        }
        self.diagnostics.report(
            Category::Bus,
            Severity::Warn,
            format!("write to ROM area ignored at {address:#x}, data {value:#x}"),
        );
    }
}

impl BusProvider for MdBus {
    fn read(&mut self, address: u32, width: Width) -> Result<u32, BusError> {
        let address = address & ADDRESS_MASK;
        let result = match self.target_for(address) {
            Some(Target::Cartridge) => Ok(self.read_cartridge(address, width)),
            Some(Target::WorkRam) => match &self.memory {
                Some(memory) => Ok(memory.borrow().read_ram(width, address & WORK_RAM_MASK)),
                None => Err(BusError::MissingDevice(Capability::Memory)),
            },
            None => {
                self.diagnostics.report(
                    Category::Bus,
                    Severity::Error,
                    format!("read from unmapped address {address:#x}"),
                );
                Err(BusError::Unmapped { address })
            }
        };
        if let Ok(value) = result {
            trace!(target: "bus", "read {address:#x} {width:?} -> {value:#x}");
        }
        result
    }

    fn write(&mut self, address: u32, value: u32, width: Width) -> Result<(), BusError> {
        let address = address & ADDRESS_MASK;
        trace!(target: "bus", "write {address:#x} {width:?} <- {value:#x}");
        match self.target_for(address) {
            Some(Target::Cartridge) => {
                self.write_cartridge(address, value, width);
                Ok(())
            }
            Some(Target::WorkRam) => match &self.memory {
                Some(memory) => {
                    memory
                        .borrow_mut()
                        .write_ram(width, address & WORK_RAM_MASK, value);
                    Ok(())
                }
                None => Err(BusError::MissingDevice(Capability::Memory)),
            },
            None => {
                self.diagnostics.report(
                    Category::Bus,
                    Severity::Error,
                    format!("write to unmapped address {address:#x}, data {value:#x}"),
                );
                Err(BusError::Unmapped { address })
            }
        }
    }

    fn read_port(&mut self, port: u8) -> u8 {
        match &self.io {
            Some(io) => io.borrow_mut().read_port(port),
            None => self.ports[port as usize],
        }
    }

    fn write_port(&mut self, port: u8, value: u8) {
        match &self.io {
            Some(io) => io.borrow_mut().write_port(port, value),
            None => self.ports[port as usize] = value,
        }
    }

    fn close(&mut self) {
        self.header = None;
        self.sram = None;
        if let Some(memory) = &self.memory {
            memory.borrow_mut().release_rom();
        }
    }
}
