//! OPL2 Register Definitions
//!
//! The YM3812 exposes a flat 256-entry write-only register file. Operator
//! registers are addressed by group base plus an operator slot offset, channel
//! registers by group base plus channel number.

use bitflags::bitflags;
use std::fmt;

/// Number of melodic voices on the chip
pub const VOICE_COUNT: usize = 9;

/// Size of the register address space
pub const REGISTER_SPACE: usize = 256;

/// Modulator operator slot offset per channel; the carrier sits 3 slots higher.
pub const MODULATOR_SLOT: [u8; VOICE_COUNT] = [0x00, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x10, 0x11, 0x12];

/// Distance between a channel's modulator and carrier slots
pub const CARRIER_DISTANCE: u8 = 3;

/// Test / waveform-select enable register
pub const REG_TEST: u8 = 0x01;
/// CSM mode / keyboard split register
pub const REG_CSM_KEYSPLIT: u8 = 0x08;
/// Tremolo depth / vibrato depth / rhythm mode register
pub const REG_RHYTHM: u8 = 0xBD;

/// Per-operator register groups (base address, add the operator slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorRegister {
    /// Tremolo / vibrato / sustain / KSR / frequency multiplier - 0x20
    Characteristic = 0x20,
    /// Key scale level (bits 7-6) / total level (bits 5-0) - 0x40
    Level = 0x40,
    /// Attack rate / decay rate - 0x60
    AttackDecay = 0x60,
    /// Sustain level / release rate - 0x80
    SustainRelease = 0x80,
    /// Waveform select - 0xE0
    Waveform = 0xE0,
}

impl OperatorRegister {
    /// Register address for the given operator slot
    pub fn addr(self, slot: u8) -> u8 {
        self as u8 + slot
    }
}

/// Per-channel register groups (base address, add the channel number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRegister {
    /// F-number low byte - 0xA0
    FrequencyLow = 0xA0,
    /// Key-on / block / F-number high bits - 0xB0
    KeyBlock = 0xB0,
    /// Feedback / connection - 0xC0
    FeedbackConnection = 0xC0,
}

impl ChannelRegister {
    /// Register address for the given channel
    pub fn addr(self, channel: u8) -> u8 {
        self as u8 + channel
    }
}

impl fmt::Display for ChannelRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRegister::FrequencyLow => write!(f, "A0 (F-Number Low)"),
            ChannelRegister::KeyBlock => write!(f, "B0 (Key-On / Block / F-Number High)"),
            ChannelRegister::FeedbackConnection => write!(f, "C0 (Feedback / Connection)"),
        }
    }
}

bitflags! {
    /// Bits of the 0xB0 key-on / block register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyBlock: u8 {
        /// Gates the voice envelope
        const KEY_ON = 0x20;
        /// Octave block (3 bits)
        const BLOCK = 0x1C;
        /// F-number bits 9-8
        const FNUM_HIGH = 0x03;
    }
}

bitflags! {
    /// Bits of the 0x01 test register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TestFlags: u8 {
        /// Allows operators to select waveforms other than sine
        const WAVEFORM_SELECT = 0x20;
    }
}

bitflags! {
    /// Bits of the 0xBD rhythm register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RhythmFlags: u8 {
        /// Tremolo depth
        const AM_DEPTH = 0x80;
        /// Vibrato depth
        const VIB_DEPTH = 0x40;
        /// Percussion mode (channels 6-8 become five drums)
        const RHYTHM = 0x20;
        /// Bass drum key-on
        const BD = 0x10;
        /// Snare drum key-on
        const SD = 0x08;
        /// Tom-tom key-on
        const TT = 0x04;
        /// Cymbal key-on
        const CY = 0x02;
        /// Hi-hat key-on
        const HH = 0x01;
    }
}

/// Key scale level bits of an operator level register
pub const KSL_MASK: u8 = 0xC0;

/// Total level bits of an operator level register
pub const TOTAL_LEVEL_MASK: u8 = 0x3F;

/// Modulator operator slot for a channel (0-8)
pub fn modulator_slot(channel: u8) -> u8 {
    MODULATOR_SLOT[channel as usize % VOICE_COUNT]
}

/// Carrier operator slot for a channel (0-8)
pub fn carrier_slot(channel: u8) -> u8 {
    modulator_slot(channel) + CARRIER_DISTANCE
}

/// Software image of the full 256-byte register file
///
/// The chip is write-only; this is what a host-side bus or test harness keeps
/// to observe what the hardware would now contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterImage {
    /// Register values 0x00-0xFF
    pub registers: [u8; REGISTER_SPACE],
}

impl RegisterImage {
    /// Create an image with every register cleared
    pub fn new() -> Self {
        RegisterImage {
            registers: [0; REGISTER_SPACE],
        }
    }

    /// Read a register value
    pub fn read(&self, addr: u8) -> u8 {
        self.registers[addr as usize]
    }

    /// Write a register value
    pub fn write(&mut self, addr: u8, value: u8) {
        self.registers[addr as usize] = value;
    }

    /// Key-on state of a channel
    pub fn is_keyed_on(&self, channel: u8) -> bool {
        KeyBlock::from_bits_truncate(self.read(ChannelRegister::KeyBlock.addr(channel)))
            .contains(KeyBlock::KEY_ON)
    }
}

impl Default for RegisterImage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_slots() {
        assert_eq!(modulator_slot(0), 0x00);
        assert_eq!(carrier_slot(0), 0x03);
        assert_eq!(modulator_slot(8), 0x12);
        assert_eq!(carrier_slot(8), 0x15);
        assert_eq!(OperatorRegister::Level.addr(carrier_slot(4)), 0x4C);
    }

    #[test]
    fn test_channel_addresses() {
        assert_eq!(ChannelRegister::FrequencyLow.addr(0), 0xA0);
        assert_eq!(ChannelRegister::KeyBlock.addr(8), 0xB8);
        assert_eq!(ChannelRegister::FeedbackConnection.addr(3), 0xC3);
    }

    #[test]
    fn test_register_image_key_on() {
        let mut image = RegisterImage::new();
        assert!(!image.is_keyed_on(2));
        image.write(0xB2, 0x31);
        assert!(image.is_keyed_on(2));
        image.write(0xB2, 0x11);
        assert!(!image.is_keyed_on(2));
    }
}
