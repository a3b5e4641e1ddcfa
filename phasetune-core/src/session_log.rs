//! # Session Log Module
//!
//! Records detected notes over a tuning session, with timestamps relative to
//! the session start, and exports them as JSON or CSV.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::PitchResult;
use crate::error::TunerError;
use crate::tuning;

/// One logged detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the session started
    pub timestamp: f64,
    pub frequency: f64,
    pub note: i32,
    pub octave: i32,
    pub cents: f64,
}

/// Summary of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub average_frequency: f64,
    /// Mean of the absolute deviations
    pub average_cents: f64,
    pub max_cents_deviation: f64,
    pub total_entries: usize,
    pub unique_notes: usize,
}

#[derive(Debug, Clone)]
pub struct FrequencyLog {
    logging: bool,
    started: Instant,
    entries: Vec<LogEntry>,
}

impl Default for FrequencyLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyLog {
    pub fn new() -> Self {
        Self {
            logging: false,
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    /// Clears previous entries and starts timing a new session.
    pub fn start_session(&mut self) {
        self.clear();
        self.logging = true;
        log::info!("Session logging started");
    }

    pub fn stop_session(&mut self) {
        if self.logging {
            log::info!("Session logging stopped with {} entries", self.entries.len());
        }
        self.logging = false;
    }

    pub fn is_logging(&self) -> bool {
        self.logging
    }

    /// Logs a result, timestamped now. Invalid results are skipped.
    pub fn add_entry(&mut self, result: &PitchResult) {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.add_entry_at(result, elapsed);
    }

    /// Logs a result with an explicit session time in seconds.
    pub fn add_entry_at(&mut self, result: &PitchResult, timestamp: f64) {
        if !self.logging || !result.valid {
            return;
        }
        self.entries.push(LogEntry {
            timestamp,
            frequency: result.frequency,
            note: result.note,
            octave: result.octave,
            cents: result.cents,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.started = Instant::now();
    }

    /// Seconds since the session started, or 0 when nothing was logged.
    pub fn session_duration(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.started.elapsed().as_secs_f64()
        }
    }

    pub fn statistics(&self) -> Statistics {
        if self.entries.is_empty() {
            return Statistics::default();
        }

        let count = self.entries.len() as f64;
        let notes: BTreeSet<i32> = self.entries.iter().map(|e| e.note).collect();

        Statistics {
            average_frequency: self.entries.iter().map(|e| e.frequency).sum::<f64>() / count,
            average_cents: self.entries.iter().map(|e| e.cents.abs()).sum::<f64>() / count,
            max_cents_deviation: self.entries.iter().map(|e| e.cents.abs()).fold(0.0, f64::max),
            total_entries: self.entries.len(),
            unique_notes: notes.len(),
        }
    }

    /// Writes the entries as a pretty-printed JSON array.
    pub fn save_json(&self, path: &Path) -> Result<(), TunerError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json)?;
        log::info!("Saved {} log entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Writes `timestamp,frequency,note,octave,cents` rows.
    pub fn write_csv<W: Write>(&self, mut out: W) -> Result<(), TunerError> {
        writeln!(out, "timestamp,frequency,note,octave,cents")?;
        for entry in &self.entries {
            writeln!(
                out,
                "{:.3},{:.2},{},{},{:+.1}",
                entry.timestamp,
                entry.frequency,
                tuning::note_name(entry.note),
                entry.octave,
                entry.cents
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &Path) -> Result<(), TunerError> {
        let file = fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))?;
        log::info!("Exported {} log entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}
