pub mod analyzer;
pub mod config;
pub mod midi;
pub mod pedal;
pub mod performance;
pub mod report;
pub mod scanner;
pub mod stats;

/// MIDI file extensions we pick up when scanning directories
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mid", "midi"];

/// Application name for XDG paths
pub const APP_NAME: &str = "midistat";
