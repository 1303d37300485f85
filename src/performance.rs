//! Decoded MIDI performance: the input the pedal adjuster and the
//! statistics engine work on.

use serde::{Deserialize, Serialize};

/// Tempo assumed when a performance carries no tempo event.
pub const DEFAULT_BPM: f64 = 60.0;

/// A performed note. Timing is in ticks, velocity normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub tick: u64,
    pub duration_ticks: u64,
    pub velocity: f64,
    /// MIDI key (0-127), kept for display only
    #[serde(default)]
    pub pitch: u8,
}

impl Note {
    pub fn end_tick(&self) -> u64 {
        self.tick + self.duration_ticks
    }
}

/// A controller event with its value normalized to [0, 1] (raw / 127).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlChange {
    pub tick: u64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Vec<Note>,
    /// CC64 (sustain pedal) events in source order
    #[serde(default)]
    pub sustain: Vec<ControlChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Pulses per quarter note
    pub ppq: u16,
    /// Tempo events in beats per minute, ordered by tick
    #[serde(default)]
    pub tempos: Vec<f64>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Performance {
    /// All notes across tracks, track by track.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.tracks.iter().flat_map(|t| t.notes.iter())
    }

    pub fn notes_mut(&mut self) -> impl Iterator<Item = &mut Note> {
        self.tracks.iter_mut().flat_map(|t| t.notes.iter_mut())
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn tempo(&self) -> TempoContext {
        TempoContext::from(self)
    }
}

/// Tick-to-millisecond conversion for one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoContext {
    pub bpm: f64,
    pub ppq: u16,
}

impl TempoContext {
    pub fn new(bpm: f64, ppq: u16) -> Self {
        Self { bpm, ppq }
    }

    /// Positive finite tempo and a non-zero resolution.
    pub fn is_valid(&self) -> bool {
        self.bpm.is_finite() && self.bpm > 0.0 && self.ppq > 0
    }

    /// `round(60000 / (bpm × ppq) × ticks)`
    pub fn to_millis(&self, ticks: u64) -> f64 {
        (60_000.0 / (self.bpm * self.ppq as f64) * ticks as f64).round()
    }
}

impl From<&Performance> for TempoContext {
    /// Earliest tempo event wins; 60 BPM without one.
    fn from(p: &Performance) -> Self {
        let bpm = p
            .tempos
            .first()
            .copied()
            .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
            .unwrap_or(DEFAULT_BPM);
        Self { bpm, ppq: p.ppq }
    }
}
