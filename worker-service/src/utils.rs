// Utility Functions
// Path helpers for the worker's storage and working directories

use std::io;
use std::path::{Path, PathBuf};

/// Default root for worker storage: `~/.shift/storage`.
///
/// Falls back to a relative `.shift/storage` when no home directory is known.
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".shift"))
        .unwrap_or_else(|| PathBuf::from(".shift"))
        .join("storage")
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve and create the directory build commands run in.
///
/// Returns the absolute path of the directory.
pub fn prepare_working_dir(path: &Path) -> io::Result<PathBuf> {
    let path = expand_home(path);
    std::fs::create_dir_all(&path)?;
    path.canonicalize()
}
