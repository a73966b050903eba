//! Sega Mega Drive / Genesis memory subsystem: cartridge backing store,
//! header parsing, battery-backed save RAM and the 68k-facing system bus.

pub mod bus;
pub mod cartridge;
pub mod memory;
pub mod sram;
pub mod system;

pub use bus::{Device, Interrupt, InterruptHandler, IoDevice, MdBus};
pub use cartridge::MdCartridgeInfo;
pub use memory::MdMemory;
pub use sram::SaveRam;
pub use system::MdSystem;

#[derive(thiserror::Error, Debug)]
pub enum MdError {
    #[error("empty cartridge image")]
    EmptyImage,
}
