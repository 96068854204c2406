//! Directory creation.

use std::fs;
use std::path::Path;

use super::error::PathError;

/// Create `path` (and parents) if missing.
///
/// Fails when something other than a directory already occupies the path.
pub fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }

    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
