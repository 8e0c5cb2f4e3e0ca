//! Instrument patches
//!
//! A patch is the full operator register bundle for one voice. The sequencer
//! only needs [`PatchTable::lookup`]; where the table comes from (compiled in,
//! loaded from JSON on a host) is up to the caller.

use serde::{Deserialize, Serialize};

/// Highest melodic program number
pub const MAX_PROGRAM: u8 = 127;

/// Reserved program index for the kick drum
pub const DRUM_KICK: u8 = 128;
/// Reserved program index for the snare drum
pub const DRUM_SNARE: u8 = 129;
/// Reserved program index for the hi-hat
pub const DRUM_HIHAT: u8 = 130;
/// Reserved program index for other percussion
pub const DRUM_PERCUSSION: u8 = 131;

/// Register values for one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperatorPatch {
    /// Tremolo / vibrato / sustain / KSR / multiplier (0x20 group)
    pub characteristic: u8,
    /// Key scale level / total level (0x40 group)
    pub level: u8,
    /// Attack / decay (0x60 group)
    pub attack_decay: u8,
    /// Sustain level / release (0x80 group)
    pub sustain_release: u8,
    /// Waveform select (0xE0 group)
    pub waveform: u8,
}

impl OperatorPatch {
    /// Build from `[characteristic, level, attack_decay, sustain_release, waveform]`
    pub const fn from_regs(regs: [u8; 5]) -> Self {
        OperatorPatch {
            characteristic: regs[0],
            level: regs[1],
            attack_decay: regs[2],
            sustain_release: regs[3],
            waveform: regs[4],
        }
    }
}

/// Two-operator instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Patch {
    /// Modulator operator
    pub modulator: OperatorPatch,
    /// Carrier operator (drives the audible level)
    pub carrier: OperatorPatch,
    /// Feedback / connection (0xC0 group)
    pub feedback_connection: u8,
}

impl Patch {
    /// Build a patch from raw operator register arrays
    pub const fn new(modulator: [u8; 5], carrier: [u8; 5], feedback_connection: u8) -> Self {
        Patch {
            modulator: OperatorPatch::from_regs(modulator),
            carrier: OperatorPatch::from_regs(carrier),
            feedback_connection,
        }
    }
}

/// Read-only program lookup
pub trait PatchTable {
    /// Patch for `index`, or `None` when the table has no entry
    fn lookup(&self, index: u8) -> Option<&Patch>;

    /// Patch applied in place of a missing one
    fn fallback(&self) -> &Patch {
        &DEFAULT_PATCH
    }
}

impl<T: PatchTable + ?Sized> PatchTable for &T {
    fn lookup(&self, index: u8) -> Option<&Patch> {
        (**self).lookup(index)
    }

    fn fallback(&self) -> &Patch {
        (**self).fallback()
    }
}

/// Acoustic-piano-like patch used when a program is missing
pub const DEFAULT_PATCH: Patch = Patch::new([0x01, 0x4F, 0xF1, 0x53, 0x00], [0x01, 0x00, 0xF2, 0x74, 0x00], 0x06);

/// One patch per General MIDI family of eight programs
const FAMILY_PATCHES: [Patch; 16] = [
    // Piano
    DEFAULT_PATCH,
    // Chromatic percussion
    Patch::new([0x07, 0x1B, 0xF6, 0x87, 0x00], [0x01, 0x00, 0xF5, 0x95, 0x00], 0x08),
    // Organ
    Patch::new([0xE2, 0x1D, 0xFF, 0x0F, 0x00], [0xE1, 0x00, 0xFF, 0x0F, 0x00], 0x01),
    // Guitar
    Patch::new([0x03, 0x9E, 0xF3, 0x73, 0x01], [0x01, 0x00, 0xF3, 0x74, 0x00], 0x0A),
    // Bass
    Patch::new([0x00, 0x12, 0xF5, 0x37, 0x00], [0x01, 0x00, 0xF3, 0x77, 0x00], 0x0C),
    // Strings
    Patch::new([0x71, 0x1C, 0x53, 0x15, 0x00], [0xA1, 0x00, 0x62, 0x16, 0x00], 0x0E),
    // Ensemble
    Patch::new([0x31, 0x1E, 0x73, 0x14, 0x00], [0x61, 0x00, 0x72, 0x16, 0x00], 0x0C),
    // Brass
    Patch::new([0x21, 0x19, 0x75, 0x1A, 0x00], [0x21, 0x00, 0x86, 0x18, 0x00], 0x0E),
    // Reed
    Patch::new([0x32, 0x26, 0x86, 0x15, 0x00], [0x21, 0x00, 0x65, 0x16, 0x00], 0x0E),
    // Pipe
    Patch::new([0xE1, 0x27, 0x6F, 0x08, 0x00], [0xE1, 0x00, 0x6F, 0x07, 0x00], 0x03),
    // Synth lead
    Patch::new([0x22, 0x16, 0xF1, 0x0A, 0x02], [0x21, 0x00, 0xF1, 0x0A, 0x00], 0x0C),
    // Synth pad
    Patch::new([0x61, 0x1A, 0x32, 0x13, 0x00], [0xA1, 0x00, 0x43, 0x14, 0x00], 0x0E),
    // Synth effects
    Patch::new([0x62, 0x22, 0x44, 0x24, 0x01], [0x61, 0x00, 0x54, 0x25, 0x00], 0x0A),
    // Ethnic
    Patch::new([0x05, 0x17, 0xF5, 0x56, 0x00], [0x01, 0x00, 0xF6, 0x66, 0x00], 0x08),
    // Percussive
    Patch::new([0x11, 0x0E, 0xF8, 0x96, 0x00], [0x01, 0x00, 0xF7, 0x96, 0x00], 0x06),
    // Sound effects
    Patch::new([0x0F, 0x00, 0xF0, 0x0F, 0x03], [0x01, 0x00, 0xF4, 0x36, 0x00], 0x0E),
];

const DRUM_PATCHES: [Patch; 4] = [
    // Kick
    Patch::new([0x00, 0x0B, 0xA8, 0x4C, 0x00], [0x00, 0x00, 0xD6, 0x4F, 0x00], 0x00),
    // Snare
    Patch::new([0x0C, 0x00, 0xF8, 0xB5, 0x00], [0x00, 0x00, 0xF6, 0x76, 0x00], 0x0E),
    // Hi-hat
    Patch::new([0x01, 0x00, 0xF8, 0xB5, 0x00], [0x0F, 0x00, 0xFA, 0xB5, 0x03], 0x0E),
    // Other percussion
    Patch::new([0x04, 0x00, 0xF8, 0x48, 0x00], [0x02, 0x00, 0xF7, 0x58, 0x00], 0x04),
];

/// Compiled-in bank covering programs 0-127 and drum indices 128-131
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPatches;

impl PatchTable for BuiltinPatches {
    fn lookup(&self, index: u8) -> Option<&Patch> {
        match index {
            0..=MAX_PROGRAM => Some(&FAMILY_PATCHES[(index / 8) as usize]),
            DRUM_KICK..=DRUM_PERCUSSION => Some(&DRUM_PATCHES[(index - DRUM_KICK) as usize]),
            _ => None,
        }
    }
}

/// Borrowed table over a flat patch array (ROM data)
#[derive(Debug, Clone, Copy)]
pub struct StaticPatches<'a> {
    patches: &'a [Patch],
}

impl<'a> StaticPatches<'a> {
    /// Wrap a patch slice indexed by program number
    pub const fn new(patches: &'a [Patch]) -> Self {
        StaticPatches { patches }
    }
}

impl PatchTable for StaticPatches<'_> {
    fn lookup(&self, index: u8) -> Option<&Patch> {
        self.patches.get(index as usize)
    }
}

/// Host-side bank loaded from JSON
///
/// The JSON document is an array of patches indexed by program number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchBank {
    patches: Vec<Patch>,
}

impl PatchBank {
    /// Parse a bank from a JSON array of patches
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize the bank as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Copy the built-in bank into an editable one
    pub fn builtin() -> Self {
        let patches = (0..=DRUM_PERCUSSION)
            .filter_map(|index| BuiltinPatches.lookup(index).copied())
            .collect();
        PatchBank { patches }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether the bank is empty
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl PatchTable for PatchBank {
    fn lookup(&self, index: u8) -> Option<&Patch> {
        self.patches.get(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_programs_and_drums() {
        for index in 0..=DRUM_PERCUSSION {
            assert!(BuiltinPatches.lookup(index).is_some(), "program {index}");
        }
        assert!(BuiltinPatches.lookup(DRUM_PERCUSSION + 1).is_none());
        assert!(BuiltinPatches.lookup(255).is_none());
    }

    #[test]
    fn test_static_patches_bounds() {
        static ROM: [Patch; 2] = [DEFAULT_PATCH, DEFAULT_PATCH];
        let table = StaticPatches::new(&ROM);
        assert!(table.lookup(1).is_some());
        assert!(table.lookup(2).is_none());
    }

    #[test]
    fn test_patch_bank_json() {
        let json = r#"[{
            "modulator": {"characteristic": 1, "level": 143, "attack_decay": 242, "sustain_release": 83, "waveform": 0},
            "carrier": {"characteristic": 1, "level": 0, "attack_decay": 242, "sustain_release": 116, "waveform": 1},
            "feedback_connection": 6
        }]"#;
        let bank = PatchBank::from_json(json).unwrap();
        assert_eq!(bank.len(), 1);
        let patch = bank.lookup(0).unwrap();
        assert_eq!(patch.modulator.level, 143);
        assert_eq!(patch.carrier.waveform, 1);
        assert!(bank.lookup(1).is_none());
    }

    #[test]
    fn test_builtin_bank_roundtrips_through_json() {
        let bank = PatchBank::builtin();
        assert_eq!(bank.len(), DRUM_PERCUSSION as usize + 1);
        let restored = PatchBank::from_json(&bank.to_json().unwrap()).unwrap();
        assert_eq!(restored.lookup(DRUM_SNARE), BuiltinPatches.lookup(DRUM_SNARE));
    }
}
