use crate::midi::{self, DecodeError};
use crate::pedal;
use crate::performance::{Performance, TempoContext};
use crate::report::SessionReport;
use crate::stats::{DeviationStats, StatsConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Decode error in {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },
    #[error("Invalid tempo in {label}: {bpm} BPM, {ppq} ppq")]
    InvalidTempo { label: String, bpm: f64, ppq: u16 },
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub struct AnalyzeResult {
    pub analyzed: u64,
    pub failed: u64,
}

/// One analysis session: the statistics accumulator plus the labels of the
/// files it has seen, in the order they were fed.
pub struct Session {
    stats: DeviationStats,
    files: Vec<String>,
    pedal: bool,
}

impl Session {
    pub fn new(config: StatsConfig, pedal: bool) -> Self {
        Self {
            stats: DeviationStats::new(config),
            files: Vec::new(),
            pedal,
        }
    }

    /// Pedal-adjust a performance and feed all its notes, track by track.
    ///
    /// A performance whose tempo cannot convert ticks (zero ppq) is rejected
    /// before anything is recorded.
    pub fn analyze_performance(
        &mut self,
        label: &str,
        mut performance: Performance,
    ) -> Result<(), AnalyzeError> {
        let tempo = TempoContext::from(&performance);
        if !tempo.is_valid() {
            return Err(AnalyzeError::InvalidTempo {
                label: label.to_string(),
                bpm: tempo.bpm,
                ppq: tempo.ppq,
            });
        }

        if self.pedal {
            let adjusted = pedal::adjust_durations(&mut performance);
            log::debug!("{}: {} notes extended by sustain pedal", label, adjusted);
        }

        log::debug!(
            "{}: {} notes at {:.1} BPM, {} ppq",
            label,
            performance.note_count(),
            tempo.bpm,
            tempo.ppq
        );

        if !self.stats.config().aggregated {
            self.files.clear();
        }
        self.files.push(label.to_string());

        self.stats.new_midi(tempo);
        for note in performance.notes() {
            self.stats.note(note);
        }
        Ok(())
    }

    /// Decode and analyze a single file.
    pub fn analyze_file(&mut self, path: &Path) -> Result<(), AnalyzeError> {
        let performance = decode(path)?;
        self.analyze_performance(&file_label(path), performance)
    }

    pub fn stats(&self) -> &DeviationStats {
        &self.stats
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn report(&self, bins: usize) -> SessionReport {
        SessionReport::build(&self.stats, &self.files, bins)
    }
}

/// Decode files in parallel, then feed them to the session in input order.
///
/// Decoding is the only parallel step; the statistics see files strictly one
/// after another so per-file output order matches `paths`. At most
/// `2 × workers` decoded performances are held in memory at a time.
pub fn analyze_files(
    session: &mut Session,
    paths: &[PathBuf],
    jobs: usize,
) -> std::result::Result<AnalyzeResult, AnalyzeError> {
    if paths.is_empty() {
        log::info!("No MIDI files to analyze");
        return Ok(AnalyzeResult {
            analyzed: 0,
            failed: 0,
        });
    }

    log::info!("Decoding {} files with {} workers", paths.len(), jobs);

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    // Process in chunks so decoded performances don't pile up in memory
    let chunk_size = (pool.current_num_threads() * 2).max(1);

    let mut analyzed: u64 = 0;
    let mut failed: u64 = 0;

    for chunk in paths.chunks(chunk_size) {
        let decoded: Vec<Result<Performance, AnalyzeError>> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|path| {
                    let result = decode(path);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        for (path, result) in chunk.iter().zip(decoded) {
            let result = result
                .and_then(|performance| session.analyze_performance(&file_label(path), performance));
            match result {
                Ok(()) => analyzed += 1,
                Err(e) => {
                    log::warn!("Analysis failed: {}", e);
                    failed += 1;
                }
            }
        }
    }

    pb.finish_with_message(format!("Done: {} analyzed, {} failed", analyzed, failed));

    Ok(AnalyzeResult { analyzed, failed })
}

fn decode(path: &Path) -> Result<Performance, AnalyzeError> {
    log::debug!(
        "Decoding: {}",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("?")
    );
    midi::load_performance(path).map_err(|source| AnalyzeError::Decode {
        path: path.display().to_string(),
        source,
    })
}

/// Label used for a file in reports: its file name, or the full path if it has none.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
