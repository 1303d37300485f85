use crate::SUPPORTED_EXTENSIONS;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Collect MIDI files from the given paths.
///
/// Files are taken as given, whatever their extension. Directories are walked
/// recursively for `.mid`/`.midi` files. Each directory's results are sorted so
/// the analysis order (and thus per-file output order) is stable.
pub fn find_midi_files<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if !path.is_dir() {
            log::warn!("Skipping {}: no such file or directory", path.display());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_midi(e.path()))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        log::info!("Found {} MIDI files under {}", found.len(), path.display());
        files.extend(found);
    }

    files
}

fn is_midi(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}
