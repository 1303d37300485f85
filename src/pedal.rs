//! Sustain-pedal duration correction.
//!
//! A note released while the pedal is down keeps sounding until the pedal
//! comes up, so duration statistics use the pedal release as the effective
//! note-off.

use crate::performance::{ControlChange, Performance};

const PEDAL_DOWN: f64 = 1.0;
const PEDAL_UP: f64 = 0.0;

/// Tick interval during which the sustain pedal is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedalRange {
    pub on: u64,
    pub off: u64,
}

impl PedalRange {
    /// Strictly inside on both sides.
    pub fn contains(&self, tick: u64) -> bool {
        self.on < tick && tick < self.off
    }
}

/// Pair up pedal-down / pedal-up events across all tracks, in source order.
///
/// Events that don't carry the expected value are skipped. The last event is
/// taken regardless once the scan runs out of input; a trailing half range is
/// dropped.
pub fn pedal_ranges(performance: &Performance) -> Vec<PedalRange> {
    let events: Vec<&ControlChange> = performance
        .tracks
        .iter()
        .flat_map(|t| t.sustain.iter())
        .collect();

    let mut ranges = Vec::new();
    let mut current: Vec<u64> = Vec::with_capacity(2);
    let mut i = 0;

    while i < events.len() {
        let expected = if current.is_empty() { PEDAL_DOWN } else { PEDAL_UP };
        while events[i].value != expected && i < events.len() - 1 {
            i += 1;
        }
        current.push(events[i].tick);
        if current.len() == 2 {
            ranges.push(PedalRange {
                on: current[0],
                off: current[1],
            });
            current.clear();
        }
        i += 1;
    }

    ranges
}

/// Extend every note that ends inside a pedal range up to the pedal release.
/// Only the first matching range is applied. Returns how many notes changed.
pub fn adjust_durations(performance: &mut Performance) -> usize {
    let ranges = pedal_ranges(performance);
    if ranges.is_empty() {
        return 0;
    }
    log::debug!("Found {} pedal ranges", ranges.len());

    let mut adjusted = 0;
    for note in performance.notes_mut() {
        let end = note.end_tick();
        if let Some(range) = ranges.iter().find(|r| r.contains(end)) {
            note.duration_ticks = range.off - note.tick;
            adjusted += 1;
        }
    }
    adjusted
}
