//! # phasetune - terminal tuner
//!
//! Runs the pitch detector on the default input device.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, display, session log and clustering
//! - **Capture Thread**: owns the audio stream and the detector
//! - **Communication**: crossbeam channels carrying owned frame snapshots
//!
//! ## Commands
//! - `live`: prints the held note and its deviation every frame
//! - `record`: captures for a while and prints the notes found as JSON
//! - `reeds`: shows each reed of an accordion note and their beat rates
//! - `temperaments`: lists the built-in temperaments

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender, select};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use phasetune_core::{
    DetectorConfig, FrameReport, FrequencyLog, NoteClusterer, NoteHold, PitchDetector,
    ReedDetector, ReedReport, TemperamentSetting, audio,
    reeds::{self, DEFAULT_REED_SPREAD, MAX_REEDS},
    tuning::{self, NOTE_NAMES, Temperament},
};

/// Frames buffered between the audio callback and the detector.
const RAW_QUEUE: usize = 64;
/// Width of the cents bar, each side of centre.
const METER_WIDTH: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "phasetune", version, about = "Real-time pitch detection tuner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the detected note continuously
    Live {
        #[command(flatten)]
        detector: DetectorArgs,
        /// Shift displayed note names by this many semitones (-6 to 6)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        transpose: i32,
        /// Write a JSON session log here on exit
        #[arg(long)]
        log: Option<PathBuf>,
        /// Write a CSV session log here on exit
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Capture for a fixed time and report every note found
    Record {
        #[command(flatten)]
        detector: DetectorArgs,
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the reeds sounding one accordion note
    Reeds {
        #[command(flatten)]
        detector: DetectorArgs,
        /// Most reeds per note (1-4)
        #[arg(long, default_value_t = MAX_REEDS)]
        max_reeds: usize,
        /// Largest distance from the note in cents (10-100)
        #[arg(long, default_value_t = DEFAULT_REED_SPREAD)]
        spread: f64,
        /// FFT length; close reeds need a long one
        #[arg(long, default_value_t = 32768)]
        fft_size: usize,
    },
    /// List the built-in temperaments
    Temperaments,
}

#[derive(Args, Debug, Clone, Default)]
struct DetectorArgs {
    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Save the effective configuration to this file
    #[arg(long)]
    save_config: Option<PathBuf>,
    /// Pitch of A4 in Hz
    #[arg(long)]
    reference: Option<f64>,
    /// Temperament name, see `phasetune temperaments`
    #[arg(long)]
    temperament: Option<String>,
    /// Temperament key, as a note name (C, F#, Bb...) or 0-11
    #[arg(long)]
    key: Option<String>,
    /// Harmonic product spectrum
    #[arg(long)]
    hps: bool,
    /// Low-pass pre-filter
    #[arg(long)]
    pre_filter: bool,
    /// Only report partials sharing the fundamental's pitch class
    #[arg(long)]
    fundamental: bool,
}

impl DetectorArgs {
    /// Loads the configuration file, if any, and applies the flags on top.
    fn to_config(&self) -> Result<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DetectorConfig::default(),
        };

        if let Some(reference) = self.reference {
            config.reference = reference;
        }
        if let Some(name) = &self.temperament {
            let temperament = tuning::find_temperament(name)
                .ok_or_else(|| anyhow!("Unknown temperament '{}'", name))?;
            config.temperament = TemperamentSetting::BuiltIn(temperament);
        }
        if let Some(key) = &self.key {
            config.key = parse_key(key)?;
        }
        config.hps |= self.hps;
        config.pre_filter |= self.pre_filter;
        config.fundamental_filter |= self.fundamental;

        config.validate()?;

        if let Some(path) = &self.save_config {
            config
                .save(path)
                .with_context(|| format!("saving {}", path.display()))?;
        }
        Ok(config)
    }
}

fn parse_key(key: &str) -> Result<usize> {
    if let Ok(index) = key.parse::<usize>() {
        if index < 12 {
            return Ok(index);
        }
        return Err(anyhow!("Key must be 0-11, got {}", index));
    }
    let alias = match key {
        "Db" => "C#",
        "D#" => "Eb",
        "Gb" => "F#",
        "G#" => "Ab",
        "A#" => "Bb",
        other => other,
    };
    NOTE_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(alias))
        .ok_or_else(|| anyhow!("Unknown key '{}'", key))
}

/// Capture thread management.
///
/// The audio stream and the detector live on the capture thread; snapshots
/// of each frame come back over `frames`.
struct CaptureWorker {
    frames: Receiver<FrameReport>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<Result<()>>>,
}

impl CaptureWorker {
    fn start(config: DetectorConfig) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(RAW_QUEUE);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        let thread_handle = thread::spawn(move || capture_loop(config, frame_tx, shutdown_rx));

        Self {
            frames: frame_rx,
            shutdown_tx,
            thread_handle: Some(thread_handle),
        }
    }

    /// Signals the capture thread and waits for it, returning its error if it failed.
    fn stop(mut self) -> Result<()> {
        let _ = self.shutdown_tx.try_send(());
        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("Capture thread panicked"))?,
            None => Ok(()),
        }
    }
}

fn capture_loop(
    config: DetectorConfig,
    frame_tx: Sender<FrameReport>,
    shutdown_rx: Receiver<()>,
) -> Result<()> {
    let (raw_tx, raw_rx) = crossbeam_channel::bounded::<Vec<f32>>(RAW_QUEUE);
    let (stream, sample_rate) =
        audio::start_audio_capture(raw_tx, config.sample_rate, config.step())?;

    if sample_rate != config.sample_rate {
        log::warn!(
            "Device runs at {} Hz instead of {} Hz; frequency resolution changes accordingly",
            sample_rate,
            config.sample_rate
        );
    }
    let mut detector = PitchDetector::new(DetectorConfig { sample_rate, ..config })?;

    log::info!("Capture loop running");
    loop {
        select! {
            recv(raw_rx) -> msg => match msg {
                Ok(block) => {
                    detector.process_buffer(&block);
                    if frame_tx.send(detector.snapshot()).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    log::warn!("Audio channel closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                log::debug!("Received shutdown signal");
                break;
            },
        }
    }

    if let Err(e) = stream.pause() {
        log::warn!("Error pausing stream: {}", e);
    }
    drop(stream);
    log::info!("Capture loop finished");
    Ok(())
}

/// Fires once when a line (or end of input) arrives on stdin.
fn stdin_stop() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

fn cents_meter(cents: f64) -> String {
    let offset = ((cents / 50.0) * METER_WIDTH as f64)
        .round()
        .clamp(-(METER_WIDTH as f64), METER_WIDTH as f64) as i64;
    (-(METER_WIDTH as i64)..=METER_WIDTH as i64)
        .map(|i| match i {
            0 => '|',
            i if i == offset => '#',
            _ => '-',
        })
        .collect()
}

fn run_live(
    detector: DetectorArgs,
    transpose: i32,
    log_path: Option<PathBuf>,
    csv_path: Option<PathBuf>,
) -> Result<()> {
    let config = detector.to_config()?;
    let transpose = transpose.clamp(-6, 6);
    let worker = CaptureWorker::start(config);
    let stop = stdin_stop();

    let mut hold = NoteHold::new();
    let mut session = FrequencyLog::new();
    if log_path.is_some() || csv_path.is_some() {
        session.start_session();
    }

    eprintln!("Listening. Press Enter to stop.");
    let mut stdout = io::stdout();
    loop {
        select! {
            recv(worker.frames) -> msg => match msg {
                Ok(frame) => {
                    session.add_entry(&frame.result);
                    let shown = hold.update(&frame.result);
                    let line = if shown.valid {
                        format!(
                            "{:<4} {:>9.2} Hz  {:+6.1} cents  {}",
                            shown.label(transpose),
                            shown.frequency,
                            shown.cents,
                            cents_meter(shown.cents)
                        )
                    } else {
                        "--".to_string()
                    };
                    write!(stdout, "\r{:<80}", line)?;
                    stdout.flush()?;
                }
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    writeln!(stdout)?;
    worker.stop()?;

    session.stop_session();
    if !session.is_empty() {
        let stats = session.statistics();
        eprintln!(
            "{} readings, {} notes, average {:.1} cents off (worst {:.1})",
            stats.total_entries, stats.unique_notes, stats.average_cents, stats.max_cents_deviation
        );
    }
    if let Some(path) = log_path {
        session.save_json(&path)?;
    }
    if let Some(path) = csv_path {
        session.export_csv(&path)?;
    }
    Ok(())
}

fn run_record(detector: DetectorArgs, seconds: f64, output: Option<PathBuf>) -> Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(anyhow!("--seconds must be positive"));
    }
    let config = detector.to_config()?;
    let reference = config.reference;
    let mut clusterer = NoteClusterer::new(config.max_peaks);

    let worker = CaptureWorker::start(config);
    let deadline = crossbeam_channel::after(Duration::from_secs_f64(seconds));
    eprintln!("Recording for {:.1} s...", seconds);

    loop {
        select! {
            recv(worker.frames) -> msg => match msg {
                Ok(frame) => clusterer.add_frame(&frame.result, &frame.maxima),
                Err(_) => break,
            },
            recv(deadline) -> _ => break,
        }
    }
    worker.stop()?;

    let report = clusterer.finish(reference);
    match report.primary() {
        Some(note) => log::info!("Primary note {}{} at {:.2} Hz", note.name, note.octave, note.frequency),
        None => log::info!("No notes found in {} valid frames", report.valid_frames),
    }

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

fn reed_line(report: &ReedReport) -> String {
    if !report.valid {
        return "--".to_string();
    }
    let reeds: Vec<String> = report
        .reeds
        .iter()
        .map(|r| format!("{:.2} Hz ({:+.1})", r.frequency, r.cents))
        .collect();
    let beats: Vec<String> = report
        .beat_frequencies
        .iter()
        .map(|b| format!("{:.2}", b))
        .collect();
    format!(
        "{}{}  {}  beats {} Hz",
        report.name,
        report.octave,
        reeds.join("  "),
        if beats.is_empty() { "-".to_string() } else { beats.join("/") }
    )
}

fn run_reeds(detector: DetectorArgs, max_reeds: usize, spread: f64, fft_size: usize) -> Result<()> {
    let base = DetectorConfig { fft_size, ..detector.to_config()? };
    let config = reeds::reed_config(base);
    config.validate()?;
    let analyzer = ReedDetector::new(max_reeds, spread);
    log::info!(
        "Reed analysis: up to {} reeds within {:.0} cents",
        analyzer.max_reeds(),
        analyzer.spread()
    );

    let worker = CaptureWorker::start(config);
    let stop = stdin_stop();
    eprintln!("Listening. Press Enter to stop.");
    let mut stdout = io::stdout();
    loop {
        select! {
            recv(worker.frames) -> msg => match msg {
                Ok(frame) => {
                    let report = analyzer.analyze(&frame.result, &frame.maxima);
                    write!(stdout, "\r{:<100}", reed_line(&report))?;
                    stdout.flush()?;
                }
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    writeln!(stdout)?;
    worker.stop()
}

fn list_temperaments() {
    for temperament in Temperament::ALL {
        let table = temperament.table();
        let cents: Vec<String> = table
            .ratios()
            .iter()
            .zip(tuning::EQUAL_RATIOS.iter())
            .map(|(r, e)| format!("{:+5.1}", 1200.0 * (r / e).log2()))
            .collect();
        println!("{:<16} {}", temperament.name(), cents.join(" "));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Live { detector, transpose, log, csv } => run_live(detector, transpose, log, csv),
        Command::Record { detector, seconds, output } => run_record(detector, seconds, output),
        Command::Reeds { detector, max_reeds, spread, fft_size } => {
            run_reeds(detector, max_reeds, spread, fft_size)
        }
        Command::Temperaments => {
            list_temperaments();
            Ok(())
        }
    }
}
