//! OPL2 chip access
//!
//! Register map, the register bus abstraction, and the memory-mapped port
//! block the bus drives on hardware.

pub mod bus;
pub mod mmio;
pub mod registers;

pub use bus::{
    BusWrite, ChipPorts, NoDelay, PortBus, RecordingBus, RegisterBus, SettleDelay, SpinDelay, WriteDiscipline,
};
pub use mmio::{MmioPorts, OplPortBlock};
pub use registers::{RegisterImage, VOICE_COUNT};
