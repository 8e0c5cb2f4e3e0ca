//! Pulse Monitor
//!
//! Watches a free-running hardware pulse counter (a VSync counter, a timer
//! tick register). A change means at least one pulse occurred; a jump of more
//! than one means pulses were skipped. Skips are only counted, never made up.

/// Free-running counter that wraps on overflow
pub trait PulseCounter: Copy + Eq {
    /// Pulses between `earlier` and `self`, accounting for wrap-around
    fn pulses_since(self, earlier: Self) -> u32;
}

macro_rules! impl_pulse_counter {
    ($($ty:ty),*) => {
        $(
            impl PulseCounter for $ty {
                fn pulses_since(self, earlier: Self) -> u32 {
                    self.wrapping_sub(earlier) as u32
                }
            }
        )*
    };
}

impl_pulse_counter!(u8, u16, u32);

/// Result of one counter observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseObservation {
    /// Pulses since the previous observation
    pub elapsed: u32,
    /// Of those, how many were skipped (elapsed - 1)
    pub missed: u32,
}

/// Skipped-pulse detector
#[derive(Debug, Clone, Copy)]
pub struct PulseMonitor<C> {
    last: Option<C>,
    observed: u64,
    missed: u64,
}

impl<C: PulseCounter> PulseMonitor<C> {
    /// Monitor with no baseline; the first observation only records it
    pub const fn new() -> Self {
        PulseMonitor {
            last: None,
            observed: 0,
            missed: 0,
        }
    }

    /// Monitor starting from a known counter value
    pub const fn starting_at(counter: C) -> Self {
        PulseMonitor {
            last: Some(counter),
            observed: 0,
            missed: 0,
        }
    }

    /// Compare `counter` with the last value seen
    ///
    /// Returns `None` when no pulse occurred (or when this is the baseline).
    pub fn observe(&mut self, counter: C) -> Option<PulseObservation> {
        let last = self.last.replace(counter)?;
        if counter == last {
            return None;
        }
        let elapsed = counter.pulses_since(last);
        let missed = elapsed - 1;
        self.observed += 1;
        if missed > 0 {
            self.missed += u64::from(missed);
            log::warn!("{missed} hardware pulse(s) skipped");
        }
        Some(PulseObservation { elapsed, missed })
    }

    /// Pulses acted upon
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Skipped pulses seen so far
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Forget the baseline and counters
    pub fn reset(&mut self) {
        self.last = None;
        self.observed = 0;
        self.missed = 0;
    }
}

impl<C: PulseCounter> Default for PulseMonitor<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_baseline() {
        let mut monitor = PulseMonitor::<u8>::new();
        assert_eq!(monitor.observe(17), None);
        assert_eq!(monitor.observe(17), None);
        assert_eq!(
            monitor.observe(18),
            Some(PulseObservation { elapsed: 1, missed: 0 })
        );
    }

    #[test]
    fn test_skips_are_counted() {
        let mut monitor = PulseMonitor::starting_at(10u16);
        let obs = monitor.observe(13).unwrap();
        assert_eq!(obs.elapsed, 3);
        assert_eq!(obs.missed, 2);
        assert_eq!(monitor.missed(), 2);
        assert_eq!(monitor.observed(), 1);
    }

    #[test]
    fn test_counter_wraps() {
        let mut monitor = PulseMonitor::starting_at(255u8);
        assert_eq!(
            monitor.observe(0),
            Some(PulseObservation { elapsed: 1, missed: 0 })
        );
        assert_eq!(monitor.observe(2).unwrap().missed, 1);
    }
}
