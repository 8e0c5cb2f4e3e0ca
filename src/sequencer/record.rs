//! Stream record formats
//!
//! Two fixed-size little-endian layouts are understood:
//!
//! - Song events, 6 bytes: `type, channel, param_a, param_b, delay_after:u16`
//! - Register dumps, 4 bytes: `register, value, delay_after:u16`
//!
//! Neither has a header. Both end with a sentinel record.

use crate::config::NoteEncoding;
use crate::voice::FrequencyWord;
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Size of a song event record
pub const SONG_EVENT_SIZE: usize = 6;

/// Size of a register dump record
pub const REGISTER_RECORD_SIZE: usize = 4;

/// Largest record of any format
pub const MAX_RECORD_SIZE: usize = SONG_EVENT_SIZE;

/// Register code of a register-dump record that only waits
pub const REGISTER_WAIT: u8 = 0x00;

/// Register/value pair marking the end of a register dump
pub const REGISTER_SENTINEL: u8 = 0xFF;

/// Song event type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum EventType {
    /// Key a channel off
    NoteOff = 0x00,
    /// Key a channel on
    NoteOn = 0x01,
    /// Apply a program to a channel
    PatchChange = 0x03,
    /// Sentinel
    EndOfStream = 0xFF,
}

/// One raw 6-byte song event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongEvent {
    /// Type code as stored (see [`EventType`])
    pub code: u8,
    /// Target channel (0-8)
    pub channel: u8,
    /// First parameter (note, F-number low, or program)
    pub param_a: u8,
    /// Second parameter (velocity or key/block byte)
    pub param_b: u8,
    /// Ticks to wait after this record
    pub delay_after: u16,
}

impl SongEvent {
    /// Decoded type, `None` for reserved codes
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_u8(self.code)
    }

    /// Decode from a record-sized buffer
    pub fn from_bytes(bytes: &[u8; SONG_EVENT_SIZE]) -> Self {
        SongEvent {
            code: bytes[0],
            channel: bytes[1],
            param_a: bytes[2],
            param_b: bytes[3],
            delay_after: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    /// Encode into the 6-byte stream layout
    pub fn to_bytes(&self) -> [u8; SONG_EVENT_SIZE] {
        let [lo, hi] = self.delay_after.to_le_bytes();
        [self.code, self.channel, self.param_a, self.param_b, lo, hi]
    }

    /// Sentinel record
    pub const fn end_of_stream() -> Self {
        SongEvent {
            code: EventType::EndOfStream as u8,
            channel: 0,
            param_a: 0,
            param_b: 0,
            delay_after: 0,
        }
    }

    /// Decoded command for this event
    pub fn command(&self, encoding: NoteEncoding) -> Command {
        let channel = self.channel;
        match self.event_type() {
            Some(EventType::NoteOff) => Command::NoteOff { channel },
            Some(EventType::NoteOn) => match encoding {
                NoteEncoding::MidiNote => Command::NoteOn {
                    channel,
                    note: self.param_a,
                    velocity: self.param_b,
                },
                NoteEncoding::PrecomputedFrequency => Command::NoteOnFrequency {
                    channel,
                    freq: FrequencyWord {
                        low: self.param_a,
                        high: self.param_b,
                    },
                },
            },
            Some(EventType::PatchChange) => Command::PatchChange {
                channel,
                program: self.param_a,
            },
            Some(EventType::EndOfStream) => Command::EndOfStream,
            None => Command::Unknown { code: self.code },
        }
    }
}

/// nom parser for one song event
pub fn song_event(input: &[u8]) -> IResult<&[u8], SongEvent> {
    let (input, code) = le_u8(input)?;
    let (input, channel) = le_u8(input)?;
    let (input, param_a) = le_u8(input)?;
    let (input, param_b) = le_u8(input)?;
    let (input, delay_after) = le_u16(input)?;
    Ok((
        input,
        SongEvent {
            code,
            channel,
            param_a,
            param_b,
            delay_after,
        },
    ))
}

/// Parse every event up to and including the sentinel
///
/// Host-side helper for listing and validating songs. Trailing bytes after
/// the sentinel (converter padding) are returned unparsed.
pub fn parse_song(mut input: &[u8]) -> IResult<&[u8], Vec<SongEvent>> {
    let mut events = Vec::with_capacity(input.len() / SONG_EVENT_SIZE);
    loop {
        let (rest, event) = song_event(input)?;
        input = rest;
        events.push(event);
        if event.event_type() == Some(EventType::EndOfStream) {
            return Ok((input, events));
        }
    }
}

/// One raw 4-byte register dump record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRecord {
    /// Register index
    pub register: u8,
    /// Value to write
    pub value: u8,
    /// Ticks to wait after this record
    pub delay_after: u16,
}

impl RegisterRecord {
    /// Decode from a record-sized buffer
    pub fn from_bytes(bytes: &[u8; REGISTER_RECORD_SIZE]) -> Self {
        RegisterRecord {
            register: bytes[0],
            value: bytes[1],
            delay_after: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Encode into the 4-byte stream layout
    pub fn to_bytes(&self) -> [u8; REGISTER_RECORD_SIZE] {
        let [lo, hi] = self.delay_after.to_le_bytes();
        [self.register, self.value, lo, hi]
    }

    /// Sentinel record
    pub const fn end_of_stream() -> Self {
        RegisterRecord {
            register: REGISTER_SENTINEL,
            value: REGISTER_SENTINEL,
            delay_after: 0,
        }
    }

    /// Decoded command for this record
    pub fn command(&self) -> Command {
        match (self.register, self.value) {
            (REGISTER_SENTINEL, REGISTER_SENTINEL) => Command::EndOfStream,
            (REGISTER_WAIT, _) => Command::Wait,
            (index, value) => Command::RegisterWrite { index, value },
        }
    }
}

/// Layout of the records in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    /// 6-byte song events driving the voice bank
    #[default]
    Events,
    /// 4-byte raw register writes
    RegisterDump,
}

impl StreamFormat {
    /// Bytes per record
    pub const fn record_size(self) -> usize {
        match self {
            StreamFormat::Events => SONG_EVENT_SIZE,
            StreamFormat::RegisterDump => REGISTER_RECORD_SIZE,
        }
    }

    /// Decode one record; `bytes` must hold at least [`Self::record_size`] bytes
    pub fn decode(self, bytes: &[u8; MAX_RECORD_SIZE], encoding: NoteEncoding) -> Record {
        match self {
            StreamFormat::Events => {
                let event = SongEvent::from_bytes(bytes);
                Record {
                    command: event.command(encoding),
                    delay_after: event.delay_after,
                }
            }
            StreamFormat::RegisterDump => {
                let record = RegisterRecord::from_bytes(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
                Record {
                    command: record.command(),
                    delay_after: record.delay_after,
                }
            }
        }
    }
}

/// What a record asks the driver to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Key a channel off
    NoteOff {
        /// Target channel
        channel: u8,
    },
    /// Set volume from velocity, then key a MIDI note on
    NoteOn {
        /// Target channel
        channel: u8,
        /// MIDI note number
        note: u8,
        /// MIDI velocity
        velocity: u8,
    },
    /// Key on from a precomputed frequency pair
    NoteOnFrequency {
        /// Target channel
        channel: u8,
        /// Frequency registers
        freq: FrequencyWord,
    },
    /// Apply a program
    PatchChange {
        /// Target channel
        channel: u8,
        /// Program or reserved drum index
        program: u8,
    },
    /// Write one register directly
    RegisterWrite {
        /// Register index
        index: u8,
        /// Value
        value: u8,
    },
    /// Only wait
    Wait,
    /// Reserved type code, skipped
    Unknown {
        /// The unrecognized code
        code: u8,
    },
    /// Sentinel
    EndOfStream,
}

/// A decoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Action
    pub command: Command,
    /// Ticks to wait afterwards
    pub delay_after: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_event_layout() {
        let bytes = [0x01, 0x02, 60, 100, 0x2C, 0x01];
        let event = SongEvent::from_bytes(&bytes);
        assert_eq!(event.event_type(), Some(EventType::NoteOn));
        assert_eq!(event.channel, 2);
        assert_eq!(event.delay_after, 300);
        assert_eq!(event.to_bytes(), bytes);
    }

    #[test]
    fn test_reserved_codes_are_unknown() {
        for code in [0x02, 0x04, 0x7F, 0xFE] {
            let event = SongEvent {
                code,
                channel: 0,
                param_a: 0,
                param_b: 0,
                delay_after: 0,
            };
            assert_eq!(event.command(NoteEncoding::MidiNote), Command::Unknown { code });
        }
    }

    #[test]
    fn test_note_encodings() {
        let event = SongEvent::from_bytes(&[0x01, 4, 0x34, 0x31, 0, 0]);
        assert_eq!(
            event.command(NoteEncoding::MidiNote),
            Command::NoteOn { channel: 4, note: 0x34, velocity: 0x31 }
        );
        assert_eq!(
            event.command(NoteEncoding::PrecomputedFrequency),
            Command::NoteOnFrequency {
                channel: 4,
                freq: FrequencyWord { low: 0x34, high: 0x31 }
            }
        );
    }

    #[test]
    fn test_parse_song_stops_at_sentinel() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x03, 0, 5, 0, 0, 0]);
        data.extend_from_slice(&[0x01, 0, 60, 90, 12, 0]);
        data.extend_from_slice(&SongEvent::end_of_stream().to_bytes());
        data.extend_from_slice(&[0u8; 16]);

        let (rest, events) = parse_song(&data).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].delay_after, 12);
        assert_eq!(rest.len(), 16);
    }

    #[test]
    fn test_parse_song_without_sentinel_fails() {
        let data = [0x01, 0, 60, 90, 0, 0, 0x00, 0];
        assert!(parse_song(&data).is_err());
    }

    #[test]
    fn test_register_record_commands() {
        assert_eq!(
            RegisterRecord::from_bytes(&[0xB0, 0x31, 3, 0]).command(),
            Command::RegisterWrite { index: 0xB0, value: 0x31 }
        );
        assert_eq!(RegisterRecord::from_bytes(&[0x00, 0x00, 7, 0]).command(), Command::Wait);
        assert_eq!(
            RegisterRecord::end_of_stream().command(),
            Command::EndOfStream
        );
        // 0xFF register with another value is an ordinary write
        assert_eq!(
            RegisterRecord::from_bytes(&[0xFF, 0x00, 0, 0]).command(),
            Command::RegisterWrite { index: 0xFF, value: 0x00 }
        );
    }

    #[test]
    fn test_format_decode() {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        buf[..4].copy_from_slice(&[0xA3, 0x44, 0x02, 0x00]);
        let record = StreamFormat::RegisterDump.decode(&buf, NoteEncoding::MidiNote);
        assert_eq!(record.delay_after, 2);
        assert_eq!(record.command, Command::RegisterWrite { index: 0xA3, value: 0x44 });
    }
}
