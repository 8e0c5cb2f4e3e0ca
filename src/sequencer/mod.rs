//! Event Sequencer
//!
//! Walks a record stream one step at a time. A step either burns one tick of
//! a pending wait, or dispatches records until one carries a non-zero delay,
//! so everything sharing a timestamp goes out within the same step, in stream
//! order.

pub mod record;
pub mod store;

use crate::config::{EndPolicy, NoteEncoding, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::voice::FrequencyWord;
use record::{Command, StreamFormat, MAX_RECORD_SIZE};
use store::EventStore;

pub use record::{EventType, RegisterRecord, SongEvent};
pub use store::{ReaderStore, SliceStore};

/// Receiver of decoded records
///
/// The synth driver implements this; tests substitute recorders.
pub trait EventSink {
    /// Key a channel off
    fn note_off(&mut self, channel: u8);

    /// Set the channel volume from a velocity and key a MIDI note on
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    /// Key a channel on from a precomputed frequency pair
    fn note_on_frequency(&mut self, channel: u8, freq: FrequencyWord);

    /// Apply a program or drum index to a channel
    fn set_patch(&mut self, channel: u8, program: u8);

    /// Write one chip register directly
    fn write_register(&mut self, index: u8, value: u8);

    /// Key every voice off
    fn silence_all(&mut self);
}

/// Coarse lifecycle stored by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// No song loaded
    #[default]
    Idle,
    /// Cursor valid, stepping
    Playing,
    /// Sentinel reached (stop policy) or playback halted
    Finished,
}

/// Observable sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No song loaded
    Idle,
    /// The next step dispatches
    Playing,
    /// This many pure-wait steps remain before the next dispatch
    Waiting(u16),
    /// Sentinel reached or playback halted
    Finished,
}

/// What one step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing loaded or already finished
    Inactive,
    /// Burned one tick of a wait
    Waited,
    /// Dispatched this many records and is now waiting
    Dispatched(u32),
    /// Dispatched this many records, then hit the sentinel
    Ended {
        /// Records dispatched before the sentinel
        dispatched: u32,
        /// Whether playback restarts from offset 0
        looped: bool,
    },
}

/// Cursor, wait counter and lifecycle for one song
#[derive(Debug, Clone)]
pub struct Sequencer {
    cursor: usize,
    wait_ticks: u16,
    lifecycle: Lifecycle,
    format: StreamFormat,
    encoding: NoteEncoding,
    end_policy: EndPolicy,
    stream_bound: usize,
    dispatched: u64,
    unknown: u32,
    loops: u32,
}

impl Sequencer {
    /// Create an idle sequencer
    pub fn new(config: &PlayerConfig) -> Self {
        Sequencer {
            cursor: 0,
            wait_ticks: 0,
            lifecycle: Lifecycle::Idle,
            format: config.stream_format,
            encoding: config.note_encoding,
            end_policy: config.end_policy,
            stream_bound: config.stream_bound,
            dispatched: 0,
            unknown: 0,
            loops: 0,
        }
    }

    /// Start a song from offset 0
    pub fn load(&mut self) {
        self.rewind();
        self.lifecycle = Lifecycle::Playing;
        log::debug!("sequencer: song loaded ({:?})", self.format);
    }

    /// Drop the song and return to idle
    pub fn stop(&mut self) {
        self.rewind();
        self.lifecycle = Lifecycle::Idle;
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.wait_ticks = 0;
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        match self.lifecycle {
            Lifecycle::Idle => SequencerState::Idle,
            Lifecycle::Finished => SequencerState::Finished,
            Lifecycle::Playing if self.wait_ticks > 0 => SequencerState::Waiting(self.wait_ticks),
            Lifecycle::Playing => SequencerState::Playing,
        }
    }

    /// Stored lifecycle
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether steps do anything
    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Playing
    }

    /// Byte offset of the next record
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Pure-wait steps remaining
    pub fn wait_ticks(&self) -> u16 {
        self.wait_ticks
    }

    /// End policy in force
    pub fn end_policy(&self) -> EndPolicy {
        self.end_policy
    }

    /// Change the end policy; applies at the next sentinel
    pub fn set_end_policy(&mut self, end_policy: EndPolicy) {
        self.end_policy = end_policy;
    }

    /// Records dispatched so far (sentinels excluded)
    pub fn records_dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Records skipped for a reserved type code
    pub fn unknown_records(&self) -> u32 {
        self.unknown
    }

    /// Times the stream wrapped back to offset 0
    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Run one sequencer step
    ///
    /// A record that would cross the readable bound, or a store read failure,
    /// halts playback: every voice is silenced, the cursor is reset and the
    /// sequencer finishes with the error.
    pub fn step<S, K>(&mut self, store: &mut S, sink: &mut K) -> Result<StepOutcome>
    where
        S: EventStore + ?Sized,
        K: EventSink + ?Sized,
    {
        if self.lifecycle != Lifecycle::Playing {
            return Ok(StepOutcome::Inactive);
        }
        if self.wait_ticks > 0 {
            self.wait_ticks -= 1;
            return Ok(StepOutcome::Waited);
        }

        let size = self.format.record_size();
        let bound = self.stream_bound.min(store.bound());
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let mut dispatched = 0;

        loop {
            let cursor = self.cursor;
            if cursor + size > bound {
                return Err(self.halt(sink, PlayerError::Bounds { cursor, bound }));
            }
            if let Err(err) = store.read_at(cursor, &mut buf[..size]) {
                let kind = err.kind();
                return Err(self.halt(sink, PlayerError::Store { cursor, kind }));
            }

            let record = self.format.decode(&buf, self.encoding);
            if record.command == Command::EndOfStream {
                return Ok(self.end_of_stream(sink, dispatched));
            }

            self.dispatch(sink, record.command);
            dispatched += 1;
            self.dispatched += 1;
            self.cursor += size;

            if record.delay_after > 0 {
                // the dispatching step is the first tick of the delay
                self.wait_ticks = record.delay_after - 1;
                return Ok(StepOutcome::Dispatched(dispatched));
            }
        }
    }

    fn dispatch<K: EventSink + ?Sized>(&mut self, sink: &mut K, command: Command) {
        log::trace!("sequencer @{:#06x}: {:?}", self.cursor, command);
        match command {
            Command::NoteOff { channel } => sink.note_off(channel),
            Command::NoteOn {
                channel,
                note,
                velocity,
            } => sink.note_on(channel, note, velocity),
            Command::NoteOnFrequency { channel, freq } => sink.note_on_frequency(channel, freq),
            Command::PatchChange { channel, program } => sink.set_patch(channel, program),
            Command::RegisterWrite { index, value } => sink.write_register(index, value),
            Command::Wait => {}
            Command::Unknown { code } => {
                self.unknown = self.unknown.saturating_add(1);
                log::debug!("sequencer: skipping record type {code:#04x} at {:#06x}", self.cursor);
            }
            Command::EndOfStream => {}
        }
    }

    fn end_of_stream<K: EventSink + ?Sized>(&mut self, sink: &mut K, dispatched: u32) -> StepOutcome {
        self.rewind();
        sink.silence_all();
        let looped = self.end_policy == EndPolicy::Loop;
        if looped {
            self.loops = self.loops.saturating_add(1);
            log::info!("sequencer: end of stream, looping");
        } else {
            self.lifecycle = Lifecycle::Finished;
            log::info!("sequencer: end of stream");
        }
        StepOutcome::Ended { dispatched, looped }
    }

    fn halt<K: EventSink + ?Sized>(&mut self, sink: &mut K, err: PlayerError) -> PlayerError {
        log::warn!("sequencer halted: {err}");
        self.rewind();
        sink.silence_all();
        self.lifecycle = Lifecycle::Finished;
        err
    }
}
