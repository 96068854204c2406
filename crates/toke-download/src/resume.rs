//! Partial-file naming and staleness policy.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

/// A partial file untouched for this long is discarded instead of resumed.
pub const STALE_PARTIAL_AGE: Duration = Duration::from_secs(5 * 60);

/// `<dest>.partial`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

/// Decide where a download into `partial` should resume from.
///
/// Returns the current length of a fresh partial file. A partial file whose
/// modification time is older than `max_age` is deleted and `0` returned;
/// failing to delete it is logged, not propagated.
pub fn prepare_resume(partial: &Path, max_age: Duration) -> u64 {
    let Ok(meta) = std::fs::metadata(partial) else {
        return 0;
    };

    let age = meta
        .modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .unwrap_or_default();

    if age > max_age {
        info!(path = %partial.display(), age_secs = age.as_secs(), "Removing stale partial download");
        if let Err(e) = std::fs::remove_file(partial) {
            warn!(path = %partial.display(), error = %e, "Failed to remove stale partial download");
        }
        return 0;
    }

    info!(path = %partial.display(), start_byte = meta.len(), "Resuming download");
    meta.len()
}
