use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use midistat::analyzer::{self, Session};
use midistat::config::AppConfig;
use midistat::report::{Histogram, SessionReport};
use midistat::stats::{Bounds, View};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "midistat", version, about = "MIDI performance deviation analyzer")]
struct Cli {
    /// Path to a config file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze IOI, velocity and duration deviations across MIDI files
    Analyze {
        /// MIDI files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Report only the last file instead of one series per file
        #[arg(long)]
        single: bool,

        /// Use literal note-off timing (skip sustain pedal correction)
        #[arg(long)]
        no_pedal: bool,

        /// Minimum IOI in ms (inclusive)
        #[arg(long)]
        min_attack: Option<f64>,

        /// Maximum IOI in ms (inclusive)
        #[arg(long)]
        max_attack: Option<f64>,

        /// Minimum duration in ms (inclusive)
        #[arg(long)]
        min_duration: Option<f64>,

        /// Maximum duration in ms (inclusive)
        #[arg(long)]
        max_duration: Option<f64>,

        /// Expected ratios, comma separated, in tie-break order (e.g. "0.5,1,2")
        #[arg(long, value_delimiter = ',')]
        relations: Option<Vec<f64>>,

        /// Histogram bins
        #[arg(long)]
        bins: Option<usize>,

        /// Number of parallel decode workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the sustain pedal ranges of a MIDI file
    Pedal {
        /// MIDI file
        file: PathBuf,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Config file is optional: --config > XDG default > built-in defaults
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Analyze {
            paths,
            single,
            no_pedal,
            min_attack,
            max_attack,
            min_duration,
            max_duration,
            relations,
            bins,
            jobs,
            json,
        } => {
            // CLI flags override config values
            if single {
                config.aggregated = false;
            }
            if no_pedal {
                config.pedal = false;
            }
            config.attack = override_bounds(config.attack, min_attack, max_attack);
            config.duration = override_bounds(config.duration, min_duration, max_duration);
            if let Some(relations) = relations {
                if relations.is_empty() || relations.iter().any(|r| !r.is_finite() || *r <= 0.0) {
                    anyhow::bail!("Relations must be positive numbers");
                }
                config.relations = relations;
            }
            if let Some(bins) = bins {
                config.histogram_bins = bins;
            }

            let files = midistat::scanner::find_midi_files(&paths);
            if files.is_empty() {
                anyhow::bail!("No MIDI files found in the given paths");
            }

            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let mut session = Session::new(config.stats_config(), config.pedal);
            let result = analyzer::analyze_files(&mut session, &files, workers)
                .context("Analysis failed")?;

            let report = session.report(config.histogram_bins);
            if json {
                let out = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                println!("{}", out);
            } else {
                print_report(&report);
                println!();
                println!(
                    "Analysis complete: {} analyzed, {} failed",
                    result.analyzed, result.failed
                );
            }
        }

        Commands::Pedal { file } => {
            let mut performance = midistat::midi::load_performance(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let ranges = midistat::pedal::pedal_ranges(&performance);

            if ranges.is_empty() {
                println!("No sustain pedal ranges in {}.", file.display());
                return Ok(());
            }

            let tempo = performance.tempo();
            println!("{:>4} {:>10} {:>10} {:>10}", "#", "On", "Off", "Length ms");
            println!("{}", "-".repeat(37));
            for (i, r) in ranges.iter().enumerate() {
                println!(
                    "{:>4} {:>10} {:>10} {:>10.0}",
                    i + 1,
                    r.on,
                    r.off,
                    tempo.to_millis(r.off.saturating_sub(r.on)),
                );
            }

            let total = performance.note_count();
            let adjusted = midistat::pedal::adjust_durations(&mut performance);
            println!();
            println!(
                "{} ranges, {} of {} notes extended to the pedal release",
                ranges.len(),
                adjusted,
                total
            );
        }

        Commands::Config => {
            match &cli.config {
                Some(path) => println!("Config file: {}", path.display()),
                None => match AppConfig::config_path() {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("Config file: (no config directory available)"),
                },
            }
            println!();
            let out = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            print!("{}", out);
        }
    }

    Ok(())
}

fn override_bounds(bounds: Bounds, min: Option<f64>, max: Option<f64>) -> Bounds {
    Bounds::new(min.or(bounds.min), max.or(bounds.max))
}

/// Print per-file box-plot rows and a histogram overview for every metric.
fn print_report(report: &SessionReport) {
    for metric in &report.metrics {
        println!("== {} ({})", metric.metric.label(), metric.unit);

        for view in &metric.views {
            println!();
            println!("  {}", view.view.label());
            println!(
                "  {:<28} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10}",
                "File", "N", "Min", "Q1", "Median", "Q3", "Max"
            );
            println!("  {}", "-".repeat(90));

            for (file, summary) in report.files.iter().zip(&view.per_file) {
                let name: String = if file.chars().count() > 28 {
                    format!("{}...", file.chars().take(25).collect::<String>())
                } else {
                    file.clone()
                };
                match summary {
                    Some(s) => println!(
                        "  {:<28} {:>6} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                        name, s.count, s.min, s.q1, s.median, s.q3, s.max
                    ),
                    None => println!("  {:<28} {:>6}", name, 0),
                }
            }

            if let Some(h) = &view.histogram {
                print_histogram(h, view.view);
            }
        }
        println!();
    }

    if report.out_of_order_notes > 0 {
        println!(
            "Note: {} notes started before their predecessor (negative IOI kept)",
            report.out_of_order_notes
        );
    }
}

/// Compact text histogram: groups the fine bins into a handful of rows.
fn print_histogram(h: &Histogram, view: View) {
    const ROWS: usize = 15;
    const WIDTH: usize = 40;

    let per_row = h.counts.len().div_ceil(ROWS).max(1);
    let rows: Vec<(f64, usize)> = h
        .counts
        .chunks(per_row)
        .enumerate()
        .map(|(i, chunk)| (h.bin_start(i * per_row), chunk.iter().sum()))
        .collect();
    let peak = rows.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1);

    println!();
    println!("  histogram of {} ({} values)", view.label(), h.total());
    for (start, count) in rows {
        let bar = "#".repeat(count * WIDTH / peak);
        println!("  {:>10.3} | {:<40} {}", start, bar, count);
    }
}
