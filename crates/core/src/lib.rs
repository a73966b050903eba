//! Core primitives shared by the console-specific memory subsystems.

pub mod fingerprint;
pub mod logging;
pub mod width;

pub use fingerprint::RomFingerprints;
pub use logging::{Category, Diagnostic, Diagnostics, Severity};
pub use width::Width;

use thiserror::Error;

/// Read-only view of a loaded program image.
pub trait RomAccess {
    /// Read a byte from the image, applying the console's wraparound rules
    fn read_rom_byte(&self, address: u32) -> u8;

    /// Raw image bytes as loaded
    fn rom_data(&self) -> &[u8];

    /// Size of the loaded image in bytes
    fn rom_size(&self) -> usize {
        self.rom_data().len()
    }
}

/// Capability tags a bus resolves attached devices by.
///
/// One device per tag; attaching another device with the same tag replaces
/// the previous binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// CPU-facing device (receives interrupt signaling)
    Cpu,
    /// Backing store for ROM and work RAM
    Memory,
    /// I/O port peripheral
    Io,
}

/// Errors a bus surfaces to its caller.
///
/// These describe system-construction bugs (a mapping or attachment that was
/// never configured), not cartridge-data anomalies; the latter are resolved
/// with fallbacks and diagnostics instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("no device mapped at address {address:#x}")]
    Unmapped { address: u32 },
    #[error("no attached device provides the {0:?} capability")]
    MissingDevice(Capability),
}

/// A sized, synchronous system bus as seen by a CPU core.
pub trait BusProvider {
    /// Read `width` bytes starting at `address`, composed big-endian
    fn read(&mut self, address: u32, width: Width) -> Result<u32, BusError>;

    /// Write the low `width` bytes of `value` starting at `address`
    fn write(&mut self, address: u32, value: u32, width: Width) -> Result<(), BusError>;

    /// Read an I/O port
    fn read_port(&mut self, port: u8) -> u8;

    /// Write an I/O port
    fn write_port(&mut self, port: u8, value: u8);

    /// Release the loaded image; work RAM survives for the session
    fn close(&mut self);
}
