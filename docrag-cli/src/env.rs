//! `.env` discovery.

use std::path::{Path, PathBuf};

/// How many parent directories are searched above the starting one.
const MAX_PARENT_LEVELS: usize = 4;

/// Find the nearest `.env` at `start` or up to four directories above it.
pub fn find_dotenv(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(MAX_PARENT_LEVELS + 1)
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
}

/// Load the nearest `.env` into the process environment.
///
/// Variables already set are left alone.
pub fn load_dotenv(start: &Path) -> Option<PathBuf> {
    let path = find_dotenv(start)?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}
