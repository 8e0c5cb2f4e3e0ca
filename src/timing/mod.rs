//! Pulse Timing Domain
//!
//! Reconciles the song tick rate with the fixed hardware pulse rate and
//! detects skipped pulses.

pub mod pulse;
pub mod reconciler;

pub use pulse::{PulseCounter, PulseMonitor, PulseObservation};
pub use reconciler::TickAccumulator;
