//! Performance-deviation statistics: IOI, velocity and duration series,
//! accumulated per file and optionally across files.

pub mod series;

use serde::{Deserialize, Serialize};

use crate::performance::{Note, TempoContext};
pub use series::{Bounds, ValueSeries};

/// Musically expected ratios between consecutive IOI / duration values.
pub const DEFAULT_RELATIONS: [f64; 11] = [0.25, 0.33, 0.5, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Inter-onset interval (ms)
    Attack,
    Velocity,
    /// Note duration (ms)
    Duration,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Attack, Metric::Velocity, Metric::Duration];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Attack => "IOI (inter-onset interval)",
            Self::Velocity => "velocity",
            Self::Duration => "duration",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Attack | Self::Duration => "ms",
            Self::Velocity => "[0-1]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Values,
    Delta,
    DeltaNormalized,
}

impl View {
    pub const ALL: [View; 3] = [View::Values, View::Delta, View::DeltaNormalized];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Values => "values",
            Self::Delta => "Δ",
            Self::DeltaNormalized => "Δ normalized",
        }
    }

    fn select<'a>(&self, series: &'a ValueSeries) -> &'a [f64] {
        match self {
            Self::Values => series.values(),
            Self::Delta => series.delta(),
            Self::DeltaNormalized => series.delta_normalized(),
        }
    }
}

/// Accessor output: one flat sequence (single-file mode) or one sequence
/// per analyzed file (aggregated mode).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesData {
    Flat(Vec<f64>),
    PerFile(Vec<Vec<f64>>),
}

impl SeriesData {
    pub fn flatten(self) -> Vec<f64> {
        match self {
            Self::Flat(v) => v,
            Self::PerFile(files) => files.into_iter().flatten().collect(),
        }
    }

    /// Per-file view; a flat sequence counts as a single file.
    pub fn per_file(self) -> Vec<Vec<f64>> {
        match self {
            Self::Flat(v) => vec![v],
            Self::PerFile(files) => files,
        }
    }
}

/// Session parameters, fixed for the lifetime of a [`DeviationStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    pub aggregated: bool,
    pub attack: Bounds,
    pub duration: Bounds,
    pub relations: Vec<f64>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            aggregated: true,
            attack: Bounds::new(None, Some(400.0)),
            duration: Bounds::new(None, Some(1500.0)),
            relations: DEFAULT_RELATIONS.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
struct FileSeries {
    attack: ValueSeries,
    velocity: ValueSeries,
    duration: ValueSeries,
}

impl FileSeries {
    fn get(&self, metric: Metric) -> &ValueSeries {
        match metric {
            Metric::Attack => &self.attack,
            Metric::Velocity => &self.velocity,
            Metric::Duration => &self.duration,
        }
    }
}

/// Position within the file currently being fed.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    tempo: TempoContext,
    previous_tick: Option<u64>,
}

/// Accumulates deviation series for one analysis session.
///
/// Call [`new_midi`](Self::new_midi) once per file, then [`note`](Self::note)
/// for each of its notes in order. Notes are not checked for tick order; a
/// note earlier than its predecessor yields a negative IOI and is counted in
/// [`out_of_order_notes`](Self::out_of_order_notes).
#[derive(Debug, Clone)]
pub struct DeviationStats {
    config: StatsConfig,
    files: Vec<FileSeries>,
    cursor: Option<Cursor>,
    out_of_order: usize,
}

impl DeviationStats {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config,
            files: Vec::new(),
            cursor: None,
            out_of_order: 0,
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Start a new file. In single-file mode, discards everything collected so far.
    /// A file with an unusable tempo (zero ppq, non-positive bpm) is not
    /// started and its notes are ignored.
    pub fn new_midi(&mut self, tempo: TempoContext) {
        if !tempo.is_valid() {
            log::warn!("Skipping file with invalid tempo: {} BPM, {} ppq", tempo.bpm, tempo.ppq);
            self.cursor = None;
            return;
        }
        if !self.config.aggregated {
            self.files.clear();
            self.out_of_order = 0;
        }
        self.files.push(FileSeries {
            attack: ValueSeries::with_relations(&self.config.relations, self.config.attack),
            velocity: ValueSeries::plain(),
            duration: ValueSeries::with_relations(&self.config.relations, self.config.duration),
        });
        self.cursor = Some(Cursor {
            tempo,
            previous_tick: None,
        });
    }

    /// Feed the next note of the current file.
    pub fn note(&mut self, note: &Note) {
        let (Some(cursor), Some(file)) = (self.cursor.as_mut(), self.files.last_mut()) else {
            log::warn!("Note at tick {} ignored: no file started", note.tick);
            return;
        };
        let tempo = cursor.tempo;

        file.duration.push(tempo.to_millis(note.duration_ticks));
        file.velocity.push(note.velocity);

        if let Some(previous) = cursor.previous_tick {
            if note.tick < previous {
                log::debug!("Note at tick {} precedes previous note at {}", note.tick, previous);
                self.out_of_order += 1;
            }
            let ioi = tempo.to_millis(note.tick) - tempo.to_millis(previous);
            file.attack.push(ioi);
        }
        cursor.previous_tick = Some(note.tick);
    }

    /// Select one view of one metric, keeping only values `filter` accepts.
    pub fn get<F>(&self, metric: Metric, view: View, filter: F) -> SeriesData
    where
        F: Fn(f64) -> bool,
    {
        let pick = |file: &FileSeries| -> Vec<f64> {
            view.select(file.get(metric))
                .iter()
                .copied()
                .filter(|v| filter(*v))
                .collect()
        };

        if self.config.aggregated {
            SeriesData::PerFile(self.files.iter().map(pick).collect())
        } else {
            SeriesData::Flat(self.files.last().map(pick).unwrap_or_default())
        }
    }

    pub fn values(&self, metric: Metric) -> SeriesData {
        self.get(metric, View::Values, |_| true)
    }

    pub fn delta(&self, metric: Metric) -> SeriesData {
        self.get(metric, View::Delta, |_| true)
    }

    pub fn delta_normalized(&self, metric: Metric) -> SeriesData {
        self.get(metric, View::DeltaNormalized, |_| true)
    }

    /// Number of files whose series are retained.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn out_of_order_notes(&self) -> usize {
        self.out_of_order
    }
}

impl Default for DeviationStats {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 60 BPM at 1000 ppq: one tick is one millisecond
    const TEMPO: TempoContext = TempoContext { bpm: 60.0, ppq: 1000 };

    fn note(tick: u64, duration_ticks: u64, velocity: f64) -> Note {
        Note { tick, duration_ticks, velocity, pitch: 60 }
    }

    fn unbounded(aggregated: bool, relations: &[f64]) -> StatsConfig {
        StatsConfig {
            aggregated,
            attack: Bounds::UNBOUNDED,
            duration: Bounds::UNBOUNDED,
            relations: relations.to_vec(),
        }
    }

    #[test]
    fn test_first_note_has_no_ioi() {
        let mut stats = DeviationStats::new(unbounded(false, &[1.0]));
        stats.new_midi(TEMPO);
        stats.note(&note(0, 250, 0.6));

        assert_eq!(stats.values(Metric::Attack), SeriesData::Flat(vec![]));
        assert_eq!(stats.values(Metric::Duration), SeriesData::Flat(vec![250.0]));
        assert_eq!(stats.values(Metric::Velocity), SeriesData::Flat(vec![0.6]));
        assert_eq!(stats.delta(Metric::Duration), SeriesData::Flat(vec![]));
    }

    #[test]
    fn test_ioi_series_from_ticks() {
        let mut stats = DeviationStats::new(unbounded(false, &[0.5, 1.0, 2.0]));
        stats.new_midi(TEMPO);
        for (tick, dur) in [(0, 100), (100, 100), (280, 100)] {
            stats.note(&note(tick, dur, 0.5));
        }
        assert_eq!(stats.values(Metric::Attack), SeriesData::Flat(vec![100.0, 180.0]));
        let delta = stats.delta(Metric::Attack).flatten();
        assert_eq!(delta, vec![-10.0]);
        let norm = stats.delta_normalized(Metric::Attack).flatten();
        assert!((norm[0] + 10.0 / 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_uses_plain_difference() {
        let mut stats = DeviationStats::new(unbounded(false, &[2.0]));
        stats.new_midi(TEMPO);
        stats.note(&note(0, 10, 0.5));
        stats.note(&note(10, 10, 0.75));
        assert_eq!(stats.delta(Metric::Velocity), SeriesData::Flat(vec![0.25]));
    }

    #[test]
    fn test_duration_bounds_filter() {
        let config = StatsConfig {
            duration: Bounds::new(Some(50.0), Some(1500.0)),
            ..unbounded(false, &[1.0])
        };
        let mut stats = DeviationStats::new(config);
        stats.new_midi(TEMPO);
        for (tick, dur) in [(0, 10), (100, 200), (200, 2000), (300, 300)] {
            stats.note(&note(tick, dur, 0.5));
        }
        assert_eq!(stats.values(Metric::Duration).flatten(), vec![200.0, 300.0]);
        assert_eq!(stats.delta(Metric::Duration).flatten(), vec![100.0]);
    }

    #[test]
    fn test_aggregated_keeps_files() {
        let mut stats = DeviationStats::new(unbounded(true, &[1.0]));
        stats.new_midi(TEMPO);
        stats.note(&note(0, 100, 0.5));
        stats.note(&note(200, 100, 0.5));
        stats.new_midi(TEMPO);
        stats.note(&note(5000, 100, 0.5));
        stats.note(&note(5300, 100, 0.5));

        assert_eq!(stats.file_count(), 2);
        assert_eq!(
            stats.values(Metric::Attack),
            SeriesData::PerFile(vec![vec![200.0], vec![300.0]])
        );
        // IOI never spans the file boundary
        assert_eq!(stats.values(Metric::Attack).flatten(), vec![200.0, 300.0]);
    }

    #[test]
    fn test_single_file_mode_discards_previous() {
        let mut stats = DeviationStats::new(unbounded(false, &[1.0]));
        stats.new_midi(TEMPO);
        stats.note(&note(0, 100, 0.5));
        stats.note(&note(200, 100, 0.5));
        stats.new_midi(TEMPO);
        stats.note(&note(0, 40, 0.1));

        assert_eq!(stats.file_count(), 1);
        assert_eq!(stats.values(Metric::Attack), SeriesData::Flat(vec![]));
        assert_eq!(stats.values(Metric::Duration), SeriesData::Flat(vec![40.0]));
    }

    #[test]
    fn test_accessor_filter() {
        let mut stats = DeviationStats::new(unbounded(true, &[1.0]));
        stats.new_midi(TEMPO);
        for tick in [0, 100, 300, 600] {
            stats.note(&note(tick, 100, 0.5));
        }
        let long = stats.get(Metric::Attack, View::Values, |v| v >= 200.0);
        assert_eq!(long, SeriesData::PerFile(vec![vec![200.0, 300.0]]));
    }

    #[test]
    fn test_note_before_new_midi_is_ignored() {
        let mut stats = DeviationStats::default();
        stats.note(&note(0, 100, 0.5));
        assert_eq!(stats.file_count(), 0);
        assert_eq!(stats.values(Metric::Duration), SeriesData::PerFile(vec![]));
    }

    #[test]
    fn test_out_of_order_notes_are_accepted_and_counted() {
        let mut stats = DeviationStats::new(unbounded(false, &[1.0]));
        stats.new_midi(TEMPO);
        stats.note(&note(500, 100, 0.5));
        stats.note(&note(300, 100, 0.5));
        assert_eq!(stats.values(Metric::Attack).flatten(), vec![-200.0]);
        assert_eq!(stats.out_of_order_notes(), 1);
    }

    #[test]
    fn test_zero_ppq_file_is_skipped() {
        let mut stats = DeviationStats::default();
        stats.new_midi(TEMPO);
        stats.note(&note(0, 100, 0.5));
        stats.new_midi(TempoContext::new(60.0, 0));
        stats.note(&note(0, 100, 0.5));
        stats.note(&note(100, 100, 0.5));

        assert_eq!(stats.file_count(), 1);
        assert_eq!(stats.values(Metric::Duration), SeriesData::PerFile(vec![vec![100.0]]));
        assert_eq!(stats.values(Metric::Attack), SeriesData::PerFile(vec![vec![]]));
        let all = stats.values(Metric::Duration).flatten();
        assert!(all.iter().all(|v| !v.is_nan() && *v <= 1500.0));
    }

    #[test]
    fn test_tempo_conversion_applies() {
        // 120 BPM, 480 ppq: 480 ticks = 500 ms
        let mut stats = DeviationStats::new(unbounded(false, &[1.0]));
        stats.new_midi(TempoContext::new(120.0, 480));
        stats.note(&note(0, 240, 0.5));
        stats.note(&note(480, 240, 0.5));
        assert_eq!(stats.values(Metric::Attack).flatten(), vec![500.0]);
        assert_eq!(stats.values(Metric::Duration).flatten(), vec![250.0, 250.0]);
    }

    #[test]
    fn test_default_config() {
        let config = StatsConfig::default();
        assert!(config.aggregated);
        assert_eq!(config.attack.max, Some(400.0));
        assert_eq!(config.duration.max, Some(1500.0));
        assert_eq!(config.relations.len(), 11);
    }
}
