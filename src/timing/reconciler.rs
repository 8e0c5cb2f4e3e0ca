//! Timing Reconciler
//!
//! Converts a song tick rate into whole sequencer steps per hardware pulse with
//! an integer bucket. Each pulse pours `song_rate` in; every full
//! `hardware_rate` drained out is one step. The bucket never reaches
//! `hardware_rate` between pulses, so the step count after `T` pulses is
//! exactly `floor(song_rate * T / hardware_rate)`.

use crate::error::{PlayerError, Result};

/// Integer tick accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickAccumulator {
    bucket: u32,
    song_rate: u32,
    hardware_rate: u32,
    total_steps: u64,
}

impl TickAccumulator {
    /// Create an accumulator for `song_rate` ticks/s against `hardware_rate` pulses/s
    pub fn new(song_rate: u32, hardware_rate: u32) -> Result<Self> {
        if song_rate == 0 {
            return Err(PlayerError::Config("song rate must be positive"));
        }
        if hardware_rate == 0 {
            return Err(PlayerError::Config("hardware pulse rate must be positive"));
        }
        Ok(TickAccumulator {
            bucket: 0,
            song_rate,
            hardware_rate,
            total_steps: 0,
        })
    }

    /// Song tick rate
    pub fn song_rate(&self) -> u32 {
        self.song_rate
    }

    /// Hardware pulse rate
    pub fn hardware_rate(&self) -> u32 {
        self.hardware_rate
    }

    /// Current bucket level, always below the hardware rate between pulses
    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    /// Steps run since creation or the last reset
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Most steps a single pulse can produce
    pub fn max_steps_per_pulse(&self) -> u32 {
        self.song_rate.div_ceil(self.hardware_rate)
    }

    /// Account for one hardware pulse, running `step` once per due sequencer step
    ///
    /// Returns the number of steps run. If `step` fails, the steps still due
    /// for this pulse are dropped and the error is returned; the bucket is left
    /// below the hardware rate either way.
    pub fn on_pulse<E, F>(&mut self, mut step: F) -> std::result::Result<u32, E>
    where
        F: FnMut() -> std::result::Result<(), E>,
    {
        // widened so any pair of u32 rates fits
        let rate = u64::from(self.hardware_rate);
        let mut bucket = u64::from(self.bucket) + u64::from(self.song_rate);
        let mut steps = 0;
        let mut outcome = Ok(());
        while bucket >= rate {
            bucket -= rate;
            steps += 1;
            self.total_steps += 1;
            if let Err(err) = step() {
                bucket %= rate;
                outcome = Err(err);
                break;
            }
        }
        // below the hardware rate, so it fits back in a u32
        self.bucket = bucket as u32;
        outcome.map(|()| steps)
    }

    /// Empty the bucket and the step total
    pub fn reset(&mut self) {
        self.bucket = 0;
        self.total_steps = 0;
    }
}
