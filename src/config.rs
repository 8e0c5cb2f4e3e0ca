//! Player configuration

use crate::error::{PlayerError, Result};
use crate::opl2::bus::WriteDiscipline;
use crate::sequencer::record::StreamFormat;
use serde::{Deserialize, Serialize};

/// Largest song the MIDI and VGM converters emit (50 KiB)
pub const DEFAULT_STREAM_BOUND: usize = 50 * 1024;

/// What happens when the sequencer reaches the end-of-stream sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndPolicy {
    /// Silence and finish
    #[default]
    Stop,
    /// Silence and restart from offset 0 on the next step
    Loop,
}

/// How the two parameters of a NoteOn record are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteEncoding {
    /// `param_a` = MIDI note, `param_b` = velocity
    #[default]
    MidiNote,
    /// `param_a` = F-number low byte, `param_b` = key/block/F-number high byte
    PrecomputedFrequency,
}

/// Player configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Song ticks per second
    pub song_rate: u32,
    /// Hardware pulses per second
    pub hardware_rate: u32,
    /// Behaviour at the end-of-stream sentinel
    pub end_policy: EndPolicy,
    /// NoteOn parameter layout
    pub note_encoding: NoteEncoding,
    /// Record layout of the stream
    pub stream_format: StreamFormat,
    /// Bytes of the store the cursor may ever address
    pub stream_bound: usize,
    /// Bus pacing design
    pub write_discipline: WriteDiscipline,
}

impl PlayerConfig {
    /// Picocomputer-style target: 60 Hz VSync, queued register writes
    pub fn rp6502() -> Self {
        PlayerConfig {
            song_rate: 60,
            hardware_rate: 60,
            end_policy: EndPolicy::Stop,
            note_encoding: NoteEncoding::MidiNote,
            stream_format: StreamFormat::Events,
            stream_bound: DEFAULT_STREAM_BOUND,
            write_discipline: WriteDiscipline::Queued,
        }
    }

    /// Register-dump playback of a converted VGM capture
    pub fn register_dump(song_rate: u32, hardware_rate: u32) -> Self {
        PlayerConfig {
            song_rate,
            hardware_rate,
            stream_format: StreamFormat::RegisterDump,
            ..Self::rp6502()
        }
    }

    /// Same configuration with a different song rate
    pub fn with_song_rate(self, song_rate: u32) -> Self {
        PlayerConfig { song_rate, ..self }
    }

    /// Same configuration with a different end policy
    pub fn with_end_policy(self, end_policy: EndPolicy) -> Self {
        PlayerConfig { end_policy, ..self }
    }

    /// Check the values the player relies on
    pub fn validate(&self) -> Result<()> {
        if self.song_rate == 0 {
            return Err(PlayerError::Config("song rate must be positive"));
        }
        if self.hardware_rate == 0 {
            return Err(PlayerError::Config("hardware pulse rate must be positive"));
        }
        if self.stream_bound < self.stream_format.record_size() {
            return Err(PlayerError::Config("stream bound smaller than one record"));
        }
        Ok(())
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::rp6502()
    }
}
