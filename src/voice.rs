//! Voice Bank
//!
//! Nine voice slots with software shadows of the registers the driver needs to
//! rewrite later. The chip cannot be read back, so the only way to key a note
//! off without changing its pitch is to remember the block/F-number byte that
//! keyed it on.

use crate::error::{PlayerError, Result};
use crate::opl2::bus::RegisterBus;
use crate::opl2::registers::{
    carrier_slot, modulator_slot, ChannelRegister, KeyBlock, OperatorRegister, KSL_MASK, TOTAL_LEVEL_MASK,
    VOICE_COUNT,
};
use crate::patch::{Patch, PatchTable, DRUM_HIHAT, DRUM_KICK, DRUM_PERCUSSION, DRUM_SNARE};

/// F-numbers for C..B of the reference octave at the 3.58 MHz chip clock
pub const FNUM_TABLE: [u16; 12] = [308, 325, 345, 365, 387, 410, 434, 460, 487, 516, 547, 579];

/// Pitch every drum voice plays at, whatever the stream asks for
pub const DRUM_REFERENCE_NOTE: u8 = 60;

/// Highest octave block the chip encodes
pub const MAX_BLOCK: u8 = 7;

/// Highest MIDI velocity
pub const MAX_VELOCITY: u8 = 127;

/// Percussion timbre assigned to a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumKind {
    /// Bass drum
    Kick,
    /// Snare drum
    Snare,
    /// Closed hi-hat
    HiHat,
    /// Any other percussion hit
    Percussion,
}

impl DrumKind {
    /// Drum selected by a reserved program index, if it is one
    pub fn from_program(index: u8) -> Option<Self> {
        match index {
            DRUM_KICK => Some(DrumKind::Kick),
            DRUM_SNARE => Some(DrumKind::Snare),
            DRUM_HIHAT => Some(DrumKind::HiHat),
            DRUM_PERCUSSION => Some(DrumKind::Percussion),
            _ => None,
        }
    }

    /// Channel whose operators carry this drum when requested on `channel`
    ///
    /// The chip multiplexes its extra percussion onto the operators of
    /// channels 6-8: the snare lives on channel 7, the hi-hat on channel 6.
    pub fn operator_channel(self, channel: u8) -> u8 {
        match self {
            DrumKind::Kick | DrumKind::Percussion => channel,
            DrumKind::Snare => 7,
            DrumKind::HiHat => 6,
        }
    }
}

/// Frequency register pair for one note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyWord {
    /// 0xA0 value: F-number bits 7-0
    pub low: u8,
    /// 0xB0 value: key-on, block, F-number bits 9-8
    pub high: u8,
}

impl FrequencyWord {
    /// Pack as `high << 8 | low`
    pub fn to_u16(self) -> u16 {
        u16::from(self.high) << 8 | u16::from(self.low)
    }
}

/// Block/F-number for a MIDI note, with the key-on bit set
///
/// The pitch class is always kept; only the octave block is clamped to 0..=7,
/// so notes below 12 play in block 0 and notes above 107 in block 7.
pub fn note_to_frequency(note: u8) -> FrequencyWord {
    let block = (note / 12).saturating_sub(1).min(MAX_BLOCK);
    let fnum = FNUM_TABLE[(note % 12) as usize];

    let high = KeyBlock::KEY_ON.bits() | (block << 2) | ((fnum >> 8) as u8 & KeyBlock::FNUM_HIGH.bits());
    FrequencyWord {
        low: (fnum & 0xFF) as u8,
        high,
    }
}

/// Carrier total level for a velocity; smaller is louder
pub fn velocity_to_level(velocity: u8) -> u8 {
    TOTAL_LEVEL_MASK - (velocity.min(MAX_VELOCITY) >> 1)
}

/// Shadow state of one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceState {
    /// Last 0xB0 value written, key-on always cleared
    pub freq_high: u8,
    /// Key scale level bits of the modulator
    pub ksl_modulator: u8,
    /// Key scale level bits of the carrier
    pub ksl_carrier: u8,
    /// Percussion timbre, `None` for melodic voices
    pub drum: Option<DrumKind>,
    /// Channel whose operators this voice's patch and volume go to
    pub operator_channel: u8,
    /// Last program applied
    pub patch: Option<u8>,
}

impl VoiceState {
    /// Cleared state for `channel`
    pub const fn new(channel: u8) -> Self {
        VoiceState {
            freq_high: 0,
            ksl_modulator: 0,
            ksl_carrier: 0,
            drum: None,
            operator_channel: channel,
            patch: None,
        }
    }

    /// Whether the voice is classified as percussion
    pub fn is_drum(&self) -> bool {
        self.drum.is_some()
    }
}

/// The nine voices and their shadows
#[derive(Debug, Clone)]
pub struct VoiceBank {
    voices: [VoiceState; VOICE_COUNT],
    ignored: u32,
}

impl VoiceBank {
    /// All voices cleared
    pub fn new() -> Self {
        VoiceBank {
            voices: core::array::from_fn(|ch| VoiceState::new(ch as u8)),
            ignored: 0,
        }
    }

    /// Clear every shadow (the chip registers are the caller's concern)
    pub fn reset(&mut self) {
        for (ch, voice) in self.voices.iter_mut().enumerate() {
            *voice = VoiceState::new(ch as u8);
        }
    }

    /// Shadow state of `channel`
    pub fn voice(&self, channel: u8) -> Option<&VoiceState> {
        self.voices.get(channel as usize)
    }

    /// All shadows
    pub fn voices(&self) -> &[VoiceState; VOICE_COUNT] {
        &self.voices
    }

    /// Operations dropped for targeting a channel above 8
    pub fn ignored_operations(&self) -> u32 {
        self.ignored
    }

    fn slot(&mut self, channel: u8) -> Option<&mut VoiceState> {
        let slot = self.voices.get_mut(channel as usize);
        if slot.is_none() {
            self.ignored = self.ignored.saturating_add(1);
        }
        slot
    }

    /// Key a note on
    ///
    /// Drum voices ignore `note` and sound [`DRUM_REFERENCE_NOTE`].
    pub fn note_on<B: RegisterBus + ?Sized>(&mut self, bus: &mut B, channel: u8, note: u8) {
        let Some(voice) = self.slot(channel) else {
            return;
        };
        let note = if voice.is_drum() { DRUM_REFERENCE_NOTE } else { note };
        let freq = note_to_frequency(note);
        Self::key_on(voice, bus, channel, freq);
    }

    /// Key a note on from a precomputed frequency pair
    ///
    /// The key-on bit is forced on. Drum voices still sound the reference note.
    pub fn note_on_frequency<B: RegisterBus + ?Sized>(&mut self, bus: &mut B, channel: u8, freq: FrequencyWord) {
        let Some(voice) = self.slot(channel) else {
            return;
        };
        let freq = if voice.is_drum() {
            note_to_frequency(DRUM_REFERENCE_NOTE)
        } else {
            FrequencyWord {
                low: freq.low,
                high: freq.high | KeyBlock::KEY_ON.bits(),
            }
        };
        Self::key_on(voice, bus, channel, freq);
    }

    fn key_on<B: RegisterBus + ?Sized>(voice: &mut VoiceState, bus: &mut B, channel: u8, freq: FrequencyWord) {
        bus.write(ChannelRegister::FrequencyLow.addr(channel), freq.low);
        bus.write(ChannelRegister::KeyBlock.addr(channel), freq.high);
        voice.freq_high = freq.high & !KeyBlock::KEY_ON.bits();
    }

    /// Key a note off, keeping its block/F-number
    pub fn note_off<B: RegisterBus + ?Sized>(&mut self, bus: &mut B, channel: u8) {
        let Some(voice) = self.slot(channel) else {
            return;
        };
        bus.write(ChannelRegister::KeyBlock.addr(channel), voice.freq_high);
    }

    /// Key every voice off
    pub fn silence_all<B: RegisterBus + ?Sized>(&mut self, bus: &mut B) {
        for (ch, voice) in self.voices.iter().enumerate() {
            bus.write(ChannelRegister::KeyBlock.addr(ch as u8), voice.freq_high);
        }
    }

    /// Set the carrier level from a 0-127 velocity, preserving key scaling
    pub fn set_volume<B: RegisterBus + ?Sized>(&mut self, bus: &mut B, channel: u8, velocity: u8) {
        let Some(voice) = self.slot(channel) else {
            return;
        };
        let level = velocity_to_level(velocity);
        bus.write(
            OperatorRegister::Level.addr(carrier_slot(voice.operator_channel)),
            voice.ksl_carrier | level,
        );
    }

    /// Apply a program to a voice
    ///
    /// Reserved drum programs classify the voice as percussion and move its
    /// operators to the channel the chip multiplexes that drum onto. A program
    /// the table does not have is replaced by the table's fallback patch; the
    /// returned error reports that substitution, the voice is still usable.
    pub fn set_patch<B, P>(&mut self, bus: &mut B, patches: &P, channel: u8, index: u8) -> Result<()>
    where
        B: RegisterBus + ?Sized,
        P: PatchTable + ?Sized,
    {
        let Some(voice) = self.slot(channel) else {
            return Ok(());
        };

        let drum = DrumKind::from_program(index);
        voice.drum = drum;
        voice.operator_channel = drum.map_or(channel, |kind| kind.operator_channel(channel));
        voice.patch = Some(index);

        let (patch, outcome) = match patches.lookup(index) {
            Some(patch) => (patch, Ok(())),
            None => {
                log::warn!("patch {index} missing, channel {channel} falls back to default");
                (patches.fallback(), Err(PlayerError::Configuration { index, channel }))
            }
        };
        Self::write_patch(voice, bus, patch);
        outcome
    }

    fn write_patch<B: RegisterBus + ?Sized>(voice: &mut VoiceState, bus: &mut B, patch: &Patch) {
        let op_channel = voice.operator_channel;
        for (slot, op) in [
            (modulator_slot(op_channel), &patch.modulator),
            (carrier_slot(op_channel), &patch.carrier),
        ] {
            bus.write(OperatorRegister::Characteristic.addr(slot), op.characteristic);
            bus.write(OperatorRegister::Level.addr(slot), op.level);
            bus.write(OperatorRegister::AttackDecay.addr(slot), op.attack_decay);
            bus.write(OperatorRegister::SustainRelease.addr(slot), op.sustain_release);
            bus.write(OperatorRegister::Waveform.addr(slot), op.waveform);
        }
        bus.write(
            ChannelRegister::FeedbackConnection.addr(op_channel),
            patch.feedback_connection,
        );

        voice.ksl_modulator = patch.modulator.level & KSL_MASK;
        voice.ksl_carrier = patch.carrier.level & KSL_MASK;
    }
}

impl Default for VoiceBank {
    fn default() -> Self {
        Self::new()
    }
}
