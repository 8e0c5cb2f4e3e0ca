//! OPL2 Event Sequencer
//!
//! Plays prerecorded songs on a 9-voice OPL2 (YM3812) FM chip, stepping a
//! fixed-size binary event stream in lockstep with a hardware timing pulse.
//!
//! # Features
//! - Integer tick accumulator reconciling any song rate with the pulse rate
//! - 6-byte song events or 4-byte raw register dumps, sentinel terminated
//! - Shadow registers for the write-only chip (key-off keeps pitch, volume
//!   keeps key scaling)
//! - Percussion voices on reserved program indices 128-131
//! - Settle-delay or hardware-queued register buses, memory-mapped or recorded
//! - No allocation, locking or blocking on the pulse path
//!
//! # Crate feature flags
//! - `cli` (default): the `opl2-play` host simulator
//!
//! # Quick start
//! ```no_run
//! use opl2_sequencer::{BuiltinPatches, MusicControl, Player, PlayerConfig, RecordingBus, SliceStore};
//!
//! static CONTROL: MusicControl = MusicControl::new();
//!
//! let song = std::fs::read("song.bin").unwrap();
//! let mut player: Player<_, _, _> = Player::new(
//!     &PlayerConfig::default(),
//!     SliceStore::new(&song),
//!     RecordingBus::new(),
//!     BuiltinPatches,
//! )
//! .unwrap();
//! player.play();
//!
//! // once per hardware pulse
//! player.on_pulse(&CONTROL);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod opl2; // Chip registers and buses
pub mod patch;
pub mod player;
pub mod sequencer;
pub mod synth;
pub mod timing;
pub mod voice;

// Public API
pub use config::{EndPolicy, NoteEncoding, PlayerConfig, DEFAULT_STREAM_BOUND};
pub use error::{PlayerError, Result};
pub use opl2::{ChipPorts, MmioPorts, PortBus, RecordingBus, RegisterBus, WriteDiscipline};
pub use patch::{BuiltinPatches, Patch, PatchBank, PatchTable, StaticPatches};
pub use player::{Diagnostics, MusicControl, Player};
pub use sequencer::record::StreamFormat;
pub use sequencer::store::EventStore;
pub use sequencer::{EventSink, ReaderStore, Sequencer, SequencerState, SliceStore, SongEvent, StepOutcome};
pub use synth::Synth;
pub use timing::{PulseCounter, PulseMonitor, TickAccumulator};
pub use voice::{DrumKind, FrequencyWord, VoiceBank, VoiceState};
