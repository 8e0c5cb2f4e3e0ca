//! Pulse-driven player
//!
//! [`Player`] is the single owner of everything the pulse path mutates: the
//! event store cursor, the voice shadows, the tick accumulator. It is driven
//! either by calling [`Player::on_pulse`] from a pulse handler, or by calling
//! [`Player::poll`] with a free-running pulse counter from a polling loop.
//!
//! The foreground never touches the player while it is being driven. It talks
//! to the pulse path through a [`MusicControl`], which is plain atomics and can
//! live in a `static`.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{EndPolicy, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::opl2::bus::RegisterBus;
use crate::patch::PatchTable;
use crate::sequencer::store::EventStore;
use crate::sequencer::{EventSink, Sequencer, SequencerState};
use crate::synth::Synth;
use crate::timing::{PulseCounter, PulseMonitor, TickAccumulator};

/// Foreground-to-pulse-path control flags
///
/// Stopping is two-phase: [`MusicControl::disable`] keeps the sequencer from
/// stepping, [`MusicControl::request_silence`] has the next pulse key every
/// voice off. [`MusicControl::stop`] does both.
#[derive(Debug)]
pub struct MusicControl {
    enabled: AtomicBool,
    silence: AtomicBool,
}

impl MusicControl {
    /// Enabled, no silence pending
    pub const fn new() -> Self {
        MusicControl {
            enabled: AtomicBool::new(true),
            silence: AtomicBool::new(false),
        }
    }

    /// Let the sequencer step on pulses
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Stop stepping from the next pulse on; voices keep sounding
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether pulses step the sequencer
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Ask the pulse path to key every voice off
    pub fn request_silence(&self) {
        self.silence.store(true, Ordering::Release);
    }

    /// Consume a pending silence request
    pub fn take_silence_request(&self) -> bool {
        self.silence.swap(false, Ordering::AcqRel)
    }

    /// Disable and request silence
    pub fn stop(&self) {
        self.disable();
        self.request_silence();
    }
}

impl Default for MusicControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters gathered during playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// Hardware pulses skipped between polls
    pub missed_pulses: u64,
    /// Sequencer steps run
    pub steps: u64,
    /// Records dispatched
    pub records_dispatched: u64,
    /// Records skipped for a reserved type code
    pub unknown_records: u32,
    /// Voice operations dropped for an out-of-range channel
    pub ignored_operations: u32,
    /// Program changes that fell back to the default patch
    pub missing_patches: u32,
    /// Times the song wrapped around
    pub loops: u32,
    /// Most recent error raised on the pulse path
    pub last_error: Option<PlayerError>,
}

/// Sequencer, synth and timing bound to one song
#[derive(Debug)]
pub struct Player<S, B, P, C = u8> {
    store: S,
    sequencer: Sequencer,
    synth: Synth<B, P>,
    clock: TickAccumulator,
    monitor: PulseMonitor<C>,
    last_error: Option<PlayerError>,
}

impl<S, B, P, C> Player<S, B, P, C>
where
    S: EventStore,
    B: RegisterBus,
    P: PatchTable,
    C: PulseCounter,
{
    /// Build a player and reset the chip
    pub fn new(config: &PlayerConfig, store: S, bus: B, patches: P) -> Result<Self> {
        config.validate()?;
        let clock = TickAccumulator::new(config.song_rate, config.hardware_rate)?;
        let mut synth = Synth::new(bus, patches);
        synth.reset();
        log::debug!(
            "player: {} ticks/s against {} pulses/s, {:?} on end",
            config.song_rate,
            config.hardware_rate,
            config.end_policy
        );
        Ok(Player {
            store,
            sequencer: Sequencer::new(config),
            synth,
            clock,
            monitor: PulseMonitor::new(),
            last_error: None,
        })
    }

    /// Start the song from the beginning
    pub fn play(&mut self) {
        self.clock.reset();
        self.sequencer.load();
        self.last_error = None;
    }

    /// Stop the song and key every voice off
    pub fn stop(&mut self) {
        self.sequencer.stop();
        self.synth.silence_all();
    }

    /// Key every voice off without touching the sequencer
    pub fn silence_all(&mut self) {
        self.synth.silence_all();
    }

    /// Reset the chip and drop the song
    pub fn reset(&mut self) {
        self.sequencer.stop();
        self.clock.reset();
        self.synth.reset();
    }

    /// Change the end policy; applies at the next sentinel
    pub fn set_end_policy(&mut self, end_policy: EndPolicy) {
        self.sequencer.set_end_policy(end_policy);
    }

    /// Sequencer state
    pub fn state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// The sequencer
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// The synth driver
    pub fn synth(&self) -> &Synth<B, P> {
        &self.synth
    }

    /// The register bus, for draining a host-side recorder between pulses
    pub fn bus_mut(&mut self) -> &mut B {
        self.synth.bus_mut()
    }

    /// The tick accumulator
    pub fn clock(&self) -> &TickAccumulator {
        &self.clock
    }

    /// The event store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Most recent pulse-path error
    pub fn last_error(&self) -> Option<PlayerError> {
        self.last_error
    }

    /// Counter snapshot
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            missed_pulses: self.monitor.missed(),
            steps: self.clock.total_steps(),
            records_dispatched: self.sequencer.records_dispatched(),
            unknown_records: self.sequencer.unknown_records(),
            ignored_operations: self.synth.voices().ignored_operations(),
            missing_patches: self.synth.missing_patches(),
            loops: self.sequencer.loops(),
            last_error: self.last_error,
        }
    }

    /// Handle one hardware pulse
    ///
    /// Honors the control flags, then runs however many sequencer steps the
    /// accumulator says are due. Returns the number of steps run.
    pub fn on_pulse(&mut self, control: &MusicControl) -> u32 {
        if control.take_silence_request() {
            self.synth.silence_all();
        }
        if !control.is_enabled() || !self.sequencer.is_active() {
            return 0;
        }

        let Player {
            store,
            sequencer,
            synth,
            clock,
            ..
        } = self;
        let result = clock.on_pulse(|| sequencer.step(&mut *store, &mut *synth).map(drop));

        if let Some(diagnostic) = self.synth.take_diagnostic() {
            self.last_error = Some(diagnostic);
        }
        match result {
            Ok(steps) => steps,
            Err(err) => {
                self.last_error = Some(err);
                0
            }
        }
    }

    /// Check the pulse counter and handle a pulse if one occurred
    ///
    /// Skipped pulses are counted but not made up; however far the counter
    /// moved, at most one pulse worth of steps runs. The first call only
    /// records the counter baseline.
    pub fn poll(&mut self, counter: C, control: &MusicControl) -> u32 {
        match self.monitor.observe(counter) {
            Some(_) => self.on_pulse(control),
            None => 0,
        }
    }

    /// Release the store, bus and patch table
    pub fn into_parts(self) -> (S, B, P) {
        let (bus, patches) = self.synth.into_parts();
        (self.store, bus, patches)
    }
}
