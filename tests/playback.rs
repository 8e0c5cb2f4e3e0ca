//! End-to-end playback through the player
//!
//! These tests drive a [`Player`] pulse by pulse over a recording bus and
//! check the register traffic the chip would see.

use std::io::Write;

use opl2_sequencer::opl2::bus::BusWrite;
use opl2_sequencer::sequencer::RegisterRecord;
use opl2_sequencer::voice::{note_to_frequency, DRUM_REFERENCE_NOTE};
use opl2_sequencer::{
    BuiltinPatches, EndPolicy, EventSink, MusicControl, Player, PlayerConfig, PlayerError, ReaderStore, RecordingBus,
    SequencerState, SliceStore, SongEvent, StaticPatches, Synth,
};

const NOTE_OFF: u8 = 0x00;
const NOTE_ON: u8 = 0x01;
const PATCH_CHANGE: u8 = 0x03;

fn ev(code: u8, channel: u8, param_a: u8, param_b: u8, delay_after: u16) -> SongEvent {
    SongEvent {
        code,
        channel,
        param_a,
        param_b,
        delay_after,
    }
}

fn encode(events: &[SongEvent]) -> Vec<u8> {
    events.iter().flat_map(|e| e.to_bytes()).collect()
}

fn scenario() -> Vec<u8> {
    encode(&[
        ev(NOTE_ON, 0, 60, 100, 30),
        ev(NOTE_OFF, 0, 0, 0, 0),
        SongEvent::end_of_stream(),
    ])
}

fn player<'a>(config: &PlayerConfig, data: &'a [u8]) -> Player<SliceStore<'a>, RecordingBus, BuiltinPatches> {
    let mut player = Player::new(config, SliceStore::new(data), RecordingBus::new(), BuiltinPatches).unwrap();
    player.bus_mut().clear_history();
    player.play();
    player
}

fn run_scenario(policy: EndPolicy) -> Player<SliceStore<'static>, RecordingBus, BuiltinPatches> {
    let data: &'static [u8] = Box::leak(scenario().into_boxed_slice());
    let control = MusicControl::new();
    let config = PlayerConfig::default().with_end_policy(policy);
    let mut player = player(&config, data);

    // step 1: NoteOn
    player.on_pulse(&control);
    let on = note_to_frequency(60);
    assert!(player.synth().bus().image().is_keyed_on(0));
    assert_eq!(player.synth().bus().image().read(0xB0), on.high);
    player.bus_mut().clear_history();

    // steps 2-30: pure waits
    for step in 2..=30 {
        player.on_pulse(&control);
        assert!(player.synth().bus().writes().is_empty(), "step {step} wrote registers");
        if step < 30 {
            assert!(matches!(player.state(), SequencerState::Waiting(_)), "step {step}");
        } else {
            // wait used up, the next step dispatches
            assert_eq!(player.state(), SequencerState::Playing);
        }
    }

    // step 31: NoteOff, then the sentinel
    player.on_pulse(&control);
    let writes = player.synth().bus().writes();
    assert_eq!(writes[0], BusWrite { index: 0xB0, value: on.high & 0x1F });
    assert!(!player.synth().bus().image().is_keyed_on(0));
    player
}

#[test]
fn test_scenario_stop_policy() {
    let mut player = run_scenario(EndPolicy::Stop);
    assert_eq!(player.state(), SequencerState::Finished);
    assert_eq!(player.sequencer().cursor(), 0);

    player.bus_mut().clear_history();
    assert_eq!(player.on_pulse(&MusicControl::new()), 0);
    assert!(player.synth().bus().writes().is_empty());
}

#[test]
fn test_scenario_loop_policy() {
    let mut player = run_scenario(EndPolicy::Loop);
    assert_eq!(player.state(), SequencerState::Playing);

    player.on_pulse(&MusicControl::new());
    assert!(player.synth().bus().image().is_keyed_on(0));
    assert_eq!(player.diagnostics().loops, 1);
}

#[test]
fn test_zero_delay_run_then_four_waits() {
    let data = encode(&[
        ev(PATCH_CHANGE, 1, 24, 0, 0),
        ev(NOTE_ON, 1, 64, 90, 0),
        ev(NOTE_ON, 2, 67, 90, 5),
        ev(NOTE_OFF, 1, 0, 0, 0),
        SongEvent::end_of_stream(),
    ]);
    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::default(), &data);

    player.on_pulse(&control);
    assert_eq!(player.diagnostics().records_dispatched, 3);
    assert!(player.synth().bus().image().is_keyed_on(1));
    assert!(player.synth().bus().image().is_keyed_on(2));

    for _ in 0..4 {
        player.bus_mut().clear_history();
        player.on_pulse(&control);
        assert!(player.synth().bus().writes().is_empty());
    }

    player.on_pulse(&control);
    assert!(player.diagnostics().records_dispatched >= 4);
    assert!(!player.synth().bus().image().is_keyed_on(1));
}

#[test]
fn test_note_off_keeps_pitch_for_every_note() {
    let mut synth = Synth::new(RecordingBus::new(), BuiltinPatches);
    for note in 0..=127u8 {
        let channel = note % 9;
        synth.note_on(channel, note, 100);
        let on = synth.bus().image().read(0xB0 + channel);
        synth.note_off(channel);
        let off = synth.bus().last_write().unwrap();
        assert_eq!(off.index, 0xB0 + channel);
        assert_eq!(off.value, on & !0x20, "note {note}");
    }
}

#[test]
fn test_drum_channels_sound_reference_pitch() {
    let data = encode(&[
        ev(PATCH_CHANGE, 3, 128, 0, 0),
        ev(NOTE_ON, 3, 35, 127, 1),
        ev(NOTE_ON, 3, 81, 127, 1),
        ev(PATCH_CHANGE, 4, 131, 0, 0),
        ev(NOTE_ON, 4, 99, 127, 1),
        SongEvent::end_of_stream(),
    ]);
    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::default(), &data);
    let reference = note_to_frequency(DRUM_REFERENCE_NOTE);

    for _ in 0..3 {
        player.on_pulse(&control);
        let bus = player.synth().bus();
        for channel in [3u8, 4] {
            for freq in bus.writes_to(0xA0 + channel) {
                assert_eq!(freq, reference.low);
            }
            for high in bus.writes_to(0xB0 + channel).filter(|v| v & 0x20 != 0) {
                assert_eq!(high, reference.high);
            }
        }
    }
    assert!(player.synth().voices().voice(3).unwrap().is_drum());
}

#[test]
fn test_reset_restores_known_state_after_playback() {
    let data = scenario();
    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::default(), &data);
    player.on_pulse(&control);

    player.reset();
    let image = player.synth().bus().image();
    assert_eq!(image.read(0x01), 0x20);
    assert_eq!(image.read(0x08), 0x00);
    assert_eq!(image.read(0xBD), 0x00);
    for channel in 0..9 {
        assert!(!image.is_keyed_on(channel));
        let voice = player.synth().voices().voice(channel).unwrap();
        assert_eq!(voice.freq_high, 0);
        assert_eq!(voice.ksl_modulator, 0);
        assert_eq!(voice.ksl_carrier, 0);
        assert!(!voice.is_drum());
    }
    assert_eq!(player.state(), SequencerState::Idle);
}

#[test]
fn test_register_dump_playback() {
    let records = [
        RegisterRecord { register: 0x20, value: 0x01, delay_after: 0 },
        RegisterRecord { register: 0xA0, value: 0x98, delay_after: 0 },
        RegisterRecord { register: 0xB0, value: 0x31, delay_after: 3 },
        RegisterRecord { register: 0x00, value: 0x00, delay_after: 2 },
        RegisterRecord { register: 0xB0, value: 0x11, delay_after: 0 },
        RegisterRecord::end_of_stream(),
    ];
    let mut data: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
    // converter padding after the sentinel
    data.extend_from_slice(&[0u8; 16]);

    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::register_dump(60, 60), &data);

    player.on_pulse(&control);
    assert_eq!(
        player.synth().bus().writes(),
        &[
            BusWrite { index: 0x20, value: 0x01 },
            BusWrite { index: 0xA0, value: 0x98 },
            BusWrite { index: 0xB0, value: 0x31 },
        ]
    );
    for _ in 0..4 {
        player.on_pulse(&control);
    }
    assert!(player.synth().bus().image().is_keyed_on(0));
    player.on_pulse(&control);
    assert!(!player.synth().bus().image().is_keyed_on(0));
    assert_eq!(player.state(), SequencerState::Finished);
}

#[test]
fn test_stream_overrun_halts_with_bounds_error() {
    let data = encode(&[ev(NOTE_ON, 0, 60, 100, 0), ev(NOTE_ON, 1, 64, 100, 0)]);
    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::default(), &data);

    player.on_pulse(&control);
    assert_eq!(
        player.last_error(),
        Some(PlayerError::Bounds { cursor: 12, bound: 12 })
    );
    assert_eq!(player.state(), SequencerState::Finished);
    for channel in 0..9 {
        assert!(!player.synth().bus().image().is_keyed_on(channel));
    }
}

#[test]
fn test_missing_patch_falls_back_and_continues() {
    let data = encode(&[
        ev(PATCH_CHANGE, 2, 77, 0, 0),
        ev(NOTE_ON, 2, 60, 100, 4),
        SongEvent::end_of_stream(),
    ]);
    let control = MusicControl::new();
    let mut player: Player<_, _, _> = Player::new(
        &PlayerConfig::default(),
        SliceStore::new(&data),
        RecordingBus::new(),
        StaticPatches::new(&[]),
    )
    .unwrap();
    player.play();

    player.on_pulse(&control);
    assert_eq!(
        player.last_error(),
        Some(PlayerError::Configuration { index: 77, channel: 2 })
    );
    assert_eq!(player.diagnostics().missing_patches, 1);
    assert!(player.synth().bus().image().is_keyed_on(2));
    assert!(matches!(player.state(), SequencerState::Waiting(3)));
}

#[test]
fn test_unknown_records_and_bad_channels_are_counted() {
    let data = encode(&[
        ev(0x02, 0, 0, 0, 0),
        ev(NOTE_ON, 9, 60, 100, 0),
        ev(0x42, 0, 0, 0, 0),
        ev(NOTE_ON, 0, 60, 100, 1),
        SongEvent::end_of_stream(),
    ]);
    let control = MusicControl::new();
    let mut player = player(&PlayerConfig::default(), &data);
    player.on_pulse(&control);

    let stats = player.diagnostics();
    assert_eq!(stats.unknown_records, 2);
    // SetVolume and NoteOn on channel 9
    assert_eq!(stats.ignored_operations, 2);
    assert!(player.synth().bus().image().is_keyed_on(0));
    assert_eq!(stats.last_error, None);
}

#[test]
fn test_file_backed_store() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&scenario()).unwrap();
    file.flush().unwrap();

    let store = ReaderStore::new(file.reopen().unwrap()).unwrap();
    let control = MusicControl::new();
    let config = PlayerConfig::default().with_end_policy(EndPolicy::Loop);
    let mut player: Player<_, _, _> = Player::new(&config, store, RecordingBus::new(), BuiltinPatches).unwrap();
    player.play();

    for _ in 0..62 {
        player.on_pulse(&control);
    }
    assert_eq!(player.diagnostics().loops, 2);
    assert_eq!(player.last_error(), None);
}

#[test]
fn test_foreground_stop_silences_on_next_pulse() {
    static CONTROL: MusicControl = MusicControl::new();
    let data = scenario();
    let mut player = player(&PlayerConfig::default(), &data);

    player.on_pulse(&CONTROL);
    assert!(player.synth().bus().image().is_keyed_on(0));

    CONTROL.stop();
    assert!(player.synth().bus().image().is_keyed_on(0));
    player.on_pulse(&CONTROL);
    assert!(!player.synth().bus().image().is_keyed_on(0));

    let cursor = player.sequencer().cursor();
    for _ in 0..40 {
        assert_eq!(player.on_pulse(&CONTROL), 0);
    }
    assert_eq!(player.sequencer().cursor(), cursor);

    CONTROL.enable();
    player.stop();
    assert_eq!(player.state(), SequencerState::Idle);
}
