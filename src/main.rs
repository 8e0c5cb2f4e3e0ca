//! `opl2-play`: host-side simulator for OPL2 song streams
//!
//! Loads a song file, drives a [`Player`] over a recording bus for a number of
//! simulated pulses (or in real time on a pulse thread), and writes the
//! resulting register traffic as CSV.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use parking_lot::Mutex;
use serde::Serialize;

use opl2_sequencer::sequencer::record::parse_song;
use opl2_sequencer::{
    EndPolicy, MusicControl, PatchBank, Player, PlayerConfig, ReaderStore, RecordingBus, SequencerState,
    StreamFormat,
};

/// Foreground stop flag shared with the pulse thread
static CONTROL: MusicControl = MusicControl::new();

/// Pulse cap when no count is given (ten minutes at 60 Hz)
const DEFAULT_PULSE_LIMIT: u64 = 60 * 60 * 10;

type SongPlayer = Player<ReaderStore<BufReader<File>>, RecordingBus, PatchBank>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// 6-byte song events
    Events,
    /// 4-byte register dump records
    RegisterDump,
}

#[derive(Parser)]
#[command(name = "opl2-play")]
#[command(about = "Simulate OPL2 song playback and dump the register trace")]
struct Args {
    /// Song file
    song: PathBuf,

    /// Player configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Patch bank (JSON array indexed by program)
    #[arg(short, long)]
    patches: Option<PathBuf>,

    /// Record layout, overriding the configuration
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Song ticks per second, overriding the configuration
    #[arg(long)]
    song_rate: Option<u32>,

    /// Hardware pulses per second, overriding the configuration
    #[arg(long)]
    hardware_rate: Option<u32>,

    /// Restart the song at its end
    #[arg(long = "loop")]
    looping: bool,

    /// Pulses to simulate; stops earlier when the song finishes (default: 36000)
    #[arg(short = 'n', long)]
    pulses: Option<u64>,

    /// Pace pulses in real time on a separate thread; Enter stops playback
    #[arg(long)]
    realtime: bool,

    /// Write the register trace here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List the song's events and exit
    #[arg(long)]
    list: bool,
}

/// One register write in the trace
#[derive(Serialize, Clone, Copy)]
struct TraceRow {
    pulse: u64,
    register: u8,
    value: u8,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&args)?;
    if args.list {
        return list_song(&args.song, config.stream_format);
    }

    let patches = match &args.patches {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            PatchBank::from_json(&json).with_context(|| format!("parsing patch bank {}", path.display()))?
        }
        None => PatchBank::builtin(),
    };

    let file = File::open(&args.song).with_context(|| format!("opening {}", args.song.display()))?;
    let store = ReaderStore::new(BufReader::new(file))?;
    let mut player: SongPlayer = Player::new(&config, store, RecordingBus::new(), patches)?;
    player.play();

    let limit = args.pulses.unwrap_or(DEFAULT_PULSE_LIMIT);
    let (trace, player) = if args.realtime {
        run_realtime(player, &config, limit)?
    } else {
        run_simulated(player, limit)
    };

    write_trace(&trace, args.output.as_deref())?;
    report(&player);
    Ok(())
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            PlayerConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PlayerConfig::default(),
    };
    if let Some(format) = args.format {
        config.stream_format = match format {
            Format::Events => StreamFormat::Events,
            Format::RegisterDump => StreamFormat::RegisterDump,
        };
    }
    if let Some(rate) = args.song_rate {
        config.song_rate = rate;
    }
    if let Some(rate) = args.hardware_rate {
        config.hardware_rate = rate;
    }
    if args.looping {
        config.end_policy = EndPolicy::Loop;
    }
    config.validate()?;
    Ok(config)
}

fn list_song(path: &Path, format: StreamFormat) -> Result<()> {
    if format != StreamFormat::Events {
        bail!("listing is only supported for event streams");
    }
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (rest, events) =
        parse_song(&data).map_err(|err| anyhow::anyhow!("malformed song {}: {err:?}", path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tick = 0u64;
    for (i, event) in events.iter().enumerate() {
        let kind = match event.event_type() {
            Some(kind) => format!("{kind:?}"),
            None => format!("reserved {:#04x}", event.code),
        };
        writeln!(
            out,
            "{:5} @{:6}  {:<14} ch{} {:3} {:3}  +{}",
            i, tick, kind, event.channel, event.param_a, event.param_b, event.delay_after
        )?;
        tick += u64::from(event.delay_after);
    }
    writeln!(out, "{} events, {} ticks, {} trailing bytes", events.len(), tick, rest.len())?;
    Ok(())
}

fn drain(player: &mut SongPlayer, pulse: u64, trace: &mut Vec<TraceRow>) {
    let writes = player.bus_mut().take_writes();
    trace.extend(writes.into_iter().map(|w| TraceRow {
        pulse,
        register: w.index,
        value: w.value,
    }));
}

fn run_simulated(mut player: SongPlayer, limit: u64) -> (Vec<TraceRow>, SongPlayer) {
    let mut trace = Vec::new();
    drain(&mut player, 0, &mut trace);
    for pulse in 1..=limit {
        player.on_pulse(&CONTROL);
        drain(&mut player, pulse, &mut trace);
        if player.state() == SequencerState::Finished {
            break;
        }
    }
    (trace, player)
}

fn run_realtime(mut player: SongPlayer, config: &PlayerConfig, limit: u64) -> Result<(Vec<TraceRow>, SongPlayer)> {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicBool::new(true));
    let period = Duration::from_secs(1) / config.hardware_rate;

    drain(&mut player, 0, &mut trace.lock());

    let pulse_trace = Arc::clone(&trace);
    let pulse_running = Arc::clone(&running);
    let pulse_thread = thread::spawn(move || {
        let start = Instant::now();
        let mut pulse = 0u64;
        while pulse < limit && pulse_running.load(Ordering::Relaxed) {
            pulse += 1;
            let due = start + period * pulse as u32;
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            player.on_pulse(&CONTROL);
            drain(&mut player, pulse, &mut pulse_trace.lock());
            if player.state() == SequencerState::Finished || !CONTROL.is_enabled() {
                break;
            }
        }
        pulse_running.store(false, Ordering::Relaxed);
        player
    });

    eprintln!("Playing in real time, press Enter to stop");
    let input_running = Arc::clone(&running);
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_ok() && input_running.load(Ordering::Relaxed) {
            CONTROL.stop();
        }
    });

    let player = pulse_thread
        .join()
        .map_err(|_| anyhow::anyhow!("pulse thread panicked"))?;
    let trace = std::mem::take(&mut *trace.lock());
    Ok((trace, player))
}

fn write_trace(trace: &[TraceRow], output: Option<&Path>) -> Result<()> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    for row in trace {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn report(player: &SongPlayer) {
    let stats = player.diagnostics();
    eprintln!(
        "{} steps, {} records, {} loops, {} unknown records, {} ignored voice ops, {} missing patches",
        stats.steps,
        stats.records_dispatched,
        stats.loops,
        stats.unknown_records,
        stats.ignored_operations,
        stats.missing_patches
    );
    if let Some(err) = stats.last_error {
        eprintln!("last error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_pulse_help_states_cap() {
        let help = Args::command().render_long_help().to_string();
        assert!(help.contains(&DEFAULT_PULSE_LIMIT.to_string()));
    }

    #[test]
    fn test_pulse_cap_applies_without_count() {
        let args = Args::try_parse_from(["opl2-play", "song.bin"]).unwrap();
        assert_eq!(args.pulses.unwrap_or(DEFAULT_PULSE_LIMIT), 36000);
    }
}
