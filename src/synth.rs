//! Synth driver
//!
//! Owns the register bus, the patch table and the voice bank, and turns
//! decoded records into register writes. Also carries chip reset.

use crate::error::PlayerError;
use crate::opl2::bus::RegisterBus;
use crate::opl2::registers::{
    ChannelRegister, RhythmFlags, TestFlags, REGISTER_SPACE, REG_CSM_KEYSPLIT, REG_RHYTHM, REG_TEST, VOICE_COUNT,
};
use crate::patch::PatchTable;
use crate::sequencer::EventSink;
use crate::voice::{FrequencyWord, VoiceBank};

/// Voice bank bound to a bus and a patch table
#[derive(Debug)]
pub struct Synth<B, P> {
    bus: B,
    patches: P,
    voices: VoiceBank,
    missing_patches: u32,
    last_diagnostic: Option<PlayerError>,
}

impl<B: RegisterBus, P: PatchTable> Synth<B, P> {
    /// Bind a bus and patch table; the chip is untouched until [`Self::reset`]
    pub fn new(bus: B, patches: P) -> Self {
        Synth {
            bus,
            patches,
            voices: VoiceBank::new(),
            missing_patches: 0,
            last_diagnostic: None,
        }
    }

    /// Put the chip into a known silent state
    ///
    /// Keys every voice off first so envelopes release instead of being cut,
    /// then clears the whole register file, clears the shadows, and enables
    /// waveform select with CSM, keyboard split and rhythm mode off.
    pub fn reset(&mut self) {
        for ch in 0..VOICE_COUNT as u8 {
            self.bus.write(ChannelRegister::KeyBlock.addr(ch), 0);
        }
        for index in 0..REGISTER_SPACE {
            self.bus.write(index as u8, 0);
        }
        self.voices.reset();

        self.bus.write(REG_TEST, TestFlags::WAVEFORM_SELECT.bits());
        self.bus.write(REG_CSM_KEYSPLIT, 0);
        self.bus.write(REG_RHYTHM, RhythmFlags::empty().bits());
        log::debug!("synth: chip reset");
    }

    /// Voice shadows
    pub fn voices(&self) -> &VoiceBank {
        &self.voices
    }

    /// The bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The bus, mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// The patch table
    pub fn patches(&self) -> &P {
        &self.patches
    }

    /// Program changes that fell back to the default patch
    pub fn missing_patches(&self) -> u32 {
        self.missing_patches
    }

    /// Most recent non-fatal error, cleared on read
    pub fn take_diagnostic(&mut self) -> Option<PlayerError> {
        self.last_diagnostic.take()
    }

    /// Release the bus and patch table
    pub fn into_parts(self) -> (B, P) {
        (self.bus, self.patches)
    }
}

impl<B: RegisterBus, P: PatchTable> EventSink for Synth<B, P> {
    fn note_off(&mut self, channel: u8) {
        self.voices.note_off(&mut self.bus, channel);
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.voices.set_volume(&mut self.bus, channel, velocity);
        self.voices.note_on(&mut self.bus, channel, note);
    }

    fn note_on_frequency(&mut self, channel: u8, freq: FrequencyWord) {
        self.voices.note_on_frequency(&mut self.bus, channel, freq);
    }

    fn set_patch(&mut self, channel: u8, program: u8) {
        if let Err(err) = self.voices.set_patch(&mut self.bus, &self.patches, channel, program) {
            self.missing_patches = self.missing_patches.saturating_add(1);
            self.last_diagnostic = Some(err);
        }
    }

    fn write_register(&mut self, index: u8, value: u8) {
        self.bus.write(index, value);
    }

    fn silence_all(&mut self) {
        self.voices.silence_all(&mut self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opl2::bus::{BusWrite, RecordingBus};
    use crate::patch::{BuiltinPatches, StaticPatches};

    #[test]
    fn test_reset_leaves_known_state() {
        let mut synth = Synth::new(RecordingBus::new(), BuiltinPatches);
        synth.set_patch(2, 40);
        synth.note_on(2, 72, 100);
        synth.bus_mut().clear_history();

        synth.reset();
        let writes = synth.bus().writes();
        // key-offs first
        for ch in 0..9u8 {
            assert_eq!(writes[ch as usize], BusWrite { index: 0xB0 + ch, value: 0 });
        }
        let image = synth.bus().image();
        for index in 0..=255u8 {
            let expected = match index {
                0x01 => 0x20,
                _ => 0x00,
            };
            assert_eq!(image.read(index), expected, "register {index:#04x}");
        }
        assert_eq!(synth.bus().writes_to(0x08).last(), Some(0));
        assert_eq!(synth.bus().writes_to(0xBD).last(), Some(0));
        assert!(synth.voices().voices().iter().all(|v| v.freq_high == 0 && !v.is_drum()));
    }

    #[test]
    fn test_note_on_sets_volume_first() {
        let mut synth = Synth::new(RecordingBus::new(), BuiltinPatches);
        synth.note_on(0, 60, 127);
        let indices: Vec<u8> = synth.bus().writes().iter().map(|w| w.index).collect();
        assert_eq!(indices, vec![0x43, 0xA0, 0xB0]);
    }

    #[test]
    fn test_missing_patch_is_recorded() {
        let mut synth = Synth::new(RecordingBus::new(), StaticPatches::new(&[]));
        synth.set_patch(1, 9);
        assert_eq!(synth.missing_patches(), 1);
        assert_eq!(
            synth.take_diagnostic(),
            Some(PlayerError::Configuration { index: 9, channel: 1 })
        );
        assert_eq!(synth.take_diagnostic(), None);
        // the voice still plays
        synth.note_on(1, 60, 100);
        assert!(synth.bus().image().is_keyed_on(1));
    }
}
