//! Project directory discovery
//!
//! Walks the project root once and sorts files into query definitions,
//! seed data and config definitions by extension.

use dagwalk_core::{Diagnostic, DiagnosticCode, Location, ScanSettings};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What a discovered file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Query,
    Seed,
    Config,
}

/// Classify a file by extension; `None` for files the scan ignores
pub fn classify(path: &Path, settings: &ScanSettings) -> Option<FileClass> {
    let ext = path.extension()?.to_str()?;

    if settings.is_query_extension(ext) {
        Some(FileClass::Query)
    } else if settings.is_seed_extension(ext) {
        Some(FileClass::Seed)
    } else if settings.is_config_extension(ext) {
        Some(FileClass::Config)
    } else {
        None
    }
}

/// Files found under a project root, each list sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFiles {
    pub queries: Vec<PathBuf>,
    pub seeds: Vec<PathBuf>,
    pub configs: Vec<PathBuf>,
    /// Entries the walk could not read
    pub diagnostics: Vec<Diagnostic>,
}

impl ProjectFiles {
    pub fn len(&self) -> usize {
        self.queries.len() + self.seeds.len() + self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fatal scan error
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("project root {path} cannot be read: {reason}")]
    UnreadableRoot { path: PathBuf, reason: String },
}

/// Discover all classified files under `root`.
///
/// Only an unreadable root is fatal; unreadable entries below it become
/// diagnostics. Ignored and dot-directories are pruned.
pub fn discover(root: &Path, settings: &ScanSettings) -> Result<ProjectFiles, ScanError> {
    let metadata = std::fs::metadata(root).map_err(|e| ScanError::UnreadableRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::UnreadableRoot {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    std::fs::read_dir(root).map_err(|e| ScanError::UnreadableRoot {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut files = ProjectFiles::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !entry
                .file_name()
                .to_str()
                .map(|name| settings.is_ignored_dir(name))
                .unwrap_or(false)
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let location = e
                    .path()
                    .map(Location::from_path)
                    .unwrap_or_else(|| Location::from_path(root));
                files.diagnostics.push(
                    Diagnostic::info(DiagnosticCode::UnreadableFile, format!("Skipping entry: {}", e))
                        .with_location(location),
                );
                continue;
            }
        };

        // Symlinked files are not followed by the walk itself.
        if entry.path_is_symlink() && !entry.path().exists() {
            files.diagnostics.push(
                Diagnostic::info(
                    DiagnosticCode::UnreadableFile,
                    format!("Skipping broken symlink {}", entry.path().display()),
                )
                .with_location(Location::from_path(entry.path())),
            );
            continue;
        }
        if !entry.path().is_file() {
            continue;
        }

        let path = entry.into_path();
        match classify(&path, settings) {
            Some(FileClass::Query) => files.queries.push(path),
            Some(FileClass::Seed) => files.seeds.push(path),
            Some(FileClass::Config) => files.configs.push(path),
            None => {}
        }
    }

    files.queries.sort();
    files.seeds.sort();
    files.configs.sort();

    tracing::debug!(
        root = %root.display(),
        queries = files.queries.len(),
        seeds = files.seeds.len(),
        configs = files.configs.len(),
        "discovered project files"
    );

    Ok(files)
}
