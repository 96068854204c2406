//! Resumable HTTP downloads.
//!
//! [`DownloadEngine`] streams a GET response into `<dest>.partial`, resuming
//! with a `Range` header when a fresh partial file exists, and promotes the
//! partial to `dest` once the body is complete (and, when a real checksum is
//! known, verified).
//!
//! - `engine` - the transfer itself
//! - `resume` - partial-file naming and the staleness policy
//! - `checksum` - SHA-256 verification
//! - `progress` - progress throttling for UI consumers

mod checksum;
mod engine;
mod error;
mod progress;
mod resume;

pub use checksum::{sha256_file, should_verify, verify_sha256};
pub use engine::{DownloadEngine, DownloadOutcome, DownloadRequest, USER_AGENT};
pub use error::DownloadError;
pub use progress::ProgressThrottle;
pub use resume::{STALE_PARTIAL_AGE, partial_path, prepare_resume};
