//! Register Bus
//!
//! The chip takes every command as two byte writes: the register index on the
//! address port, then the value on the data port. It cannot accept commands
//! back-to-back; a bus must either wait out the documented acceptance latency
//! after each port write, or sit behind a hardware write queue that paces the
//! chip on its own. [`WriteDiscipline`] selects one of the two for the lifetime
//! of a [`PortBus`].

use super::registers::RegisterImage;
use serde::{Deserialize, Serialize};

/// Minimum wait after an index write (12 cycles of the 3.58 MHz chip clock)
pub const INDEX_SETTLE_US: u32 = 4;

/// Minimum wait after a data write (84 cycles of the 3.58 MHz chip clock)
pub const DATA_SETTLE_US: u32 = 23;

/// Sink for OPL2 register writes
///
/// Implemented by the real port-level bus and by host-side recorders, so the
/// voice bank and sequencer never care which one they drive.
pub trait RegisterBus {
    /// Write `value` to register `index`
    fn write(&mut self, index: u8, value: u8);
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write(&mut self, index: u8, value: u8) {
        (**self).write(index, value)
    }
}

/// The chip's two write-only ports plus the optional queue control register
pub trait ChipPorts {
    /// Write the index (address) port
    fn write_index(&mut self, index: u8);

    /// Write the data port
    fn write_data(&mut self, value: u8);

    /// Discard anything pending in a hardware write queue
    ///
    /// Ports without a queue ignore this.
    fn flush_queue(&mut self) {}
}

/// Busy-wait source for settle delays
pub trait SettleDelay {
    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32);
}

/// Delay that returns immediately (queued buses, host simulation)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl SettleDelay for NoDelay {
    fn delay_us(&mut self, _us: u32) {}
}

/// Calibrated spin loop
#[derive(Debug, Clone, Copy)]
pub struct SpinDelay {
    /// Spin iterations that take one microsecond on the target CPU
    pub iterations_per_us: u32,
}

impl SettleDelay for SpinDelay {
    fn delay_us(&mut self, us: u32) {
        let spins = us.saturating_mul(self.iterations_per_us);
        for _ in 0..spins {
            std::hint::spin_loop();
        }
    }
}

/// How a bus guarantees the chip is never written faster than it can consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDiscipline {
    /// Fixed waits after each port write
    Settle {
        /// Wait after the index write, in microseconds
        index_us: u32,
        /// Wait after the data write, in microseconds
        data_us: u32,
    },
    /// Hardware write queue; flushed once when the bus is created
    Queued,
}

impl WriteDiscipline {
    /// Settle delays sized to the YM3812 datasheet latencies
    pub const fn datasheet_settle() -> Self {
        WriteDiscipline::Settle {
            index_us: INDEX_SETTLE_US,
            data_us: DATA_SETTLE_US,
        }
    }
}

impl Default for WriteDiscipline {
    fn default() -> Self {
        Self::datasheet_settle()
    }
}

/// Port-level register bus
#[derive(Debug)]
pub struct PortBus<P, D = NoDelay> {
    ports: P,
    delay: D,
    discipline: WriteDiscipline,
}

impl<P: ChipPorts, D: SettleDelay> PortBus<P, D> {
    /// Create a bus over `ports`
    ///
    /// A queued bus flushes the hardware queue here, before any command is
    /// issued, so stale entries from before startup are never replayed.
    pub fn new(mut ports: P, delay: D, discipline: WriteDiscipline) -> Self {
        if discipline == WriteDiscipline::Queued {
            ports.flush_queue();
            log::debug!("register bus: write queue flushed");
        }
        PortBus {
            ports,
            delay,
            discipline,
        }
    }

    /// Active write discipline
    pub fn discipline(&self) -> WriteDiscipline {
        self.discipline
    }

    /// Access the underlying ports
    pub fn ports(&self) -> &P {
        &self.ports
    }

    /// Release the underlying ports and delay
    pub fn into_parts(self) -> (P, D) {
        (self.ports, self.delay)
    }
}

impl<P: ChipPorts, D: SettleDelay> RegisterBus for PortBus<P, D> {
    fn write(&mut self, index: u8, value: u8) {
        match self.discipline {
            WriteDiscipline::Settle { index_us, data_us } => {
                self.ports.write_index(index);
                self.delay.delay_us(index_us);
                self.ports.write_data(value);
                self.delay.delay_us(data_us);
            }
            WriteDiscipline::Queued => {
                self.ports.write_index(index);
                self.ports.write_data(value);
            }
        }
    }
}

/// One register write as seen on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusWrite {
    /// Register index
    pub index: u8,
    /// Value written
    pub value: u8,
}

/// Host-side bus that records every write and keeps a register image
#[derive(Debug, Clone, Default)]
pub struct RecordingBus {
    writes: Vec<BusWrite>,
    image: RegisterImage,
}

impl RecordingBus {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes in issue order
    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    /// Most recent write, if any
    pub fn last_write(&self) -> Option<BusWrite> {
        self.writes.last().copied()
    }

    /// Writes that targeted `index`, in issue order
    pub fn writes_to(&self, index: u8) -> impl Iterator<Item = u8> + '_ {
        self.writes
            .iter()
            .filter(move |w| w.index == index)
            .map(|w| w.value)
    }

    /// What the chip would now hold
    pub fn image(&self) -> &RegisterImage {
        &self.image
    }

    /// Drop the recorded history, keeping the register image
    pub fn clear_history(&mut self) {
        self.writes.clear();
    }

    /// Take the recorded history, keeping the register image
    pub fn take_writes(&mut self) -> Vec<BusWrite> {
        std::mem::take(&mut self.writes)
    }
}

impl RegisterBus for RecordingBus {
    fn write(&mut self, index: u8, value: u8) {
        self.writes.push(BusWrite { index, value });
        self.image.write(index, value);
    }
}
