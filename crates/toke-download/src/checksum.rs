//! SHA-256 verification of downloaded artifacts.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::DownloadError;

/// Value used in catalogs and manifests when no real hash is known.
const PLACEHOLDER: &str = "placeholder";

/// Whether `checksum` names a real hash worth verifying against.
pub fn should_verify(checksum: Option<&str>) -> bool {
    checksum
        .map(str::trim)
        .is_some_and(|c| !c.is_empty() && !c.starts_with(PLACEHOLDER))
}

/// Lower-case hex SHA-256 of a file, computed on the blocking pool.
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String, DownloadError> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| DownloadError::Io {
        kind: "JoinError".to_string(),
        message: e.to_string(),
    })?
}

/// Check `path` against `expected` (case-insensitive hex).
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<(), DownloadError> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(DownloadError::IntegrityFailed {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA_SHA256: &str =
        "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9";

    #[test]
    fn placeholders_are_not_verified() {
        assert!(!should_verify(None));
        assert!(!should_verify(Some("")));
        assert!(!should_verify(Some("placeholder")));
        assert!(!should_verify(Some("placeholder_checksum")));
        assert!(should_verify(Some(TEST_DATA_SHA256)));
    }

    #[test]
    fn hashes_file_contents() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        std::fs::write(&path, b"test data").unwrap();

        let hash = tokio_test::block_on(sha256_file(&path)).unwrap();
        assert_eq!(hash, TEST_DATA_SHA256);
    }

    #[tokio::test]
    async fn verify_accepts_uppercase_and_rejects_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("blob");
        std::fs::write(&path, b"test data").unwrap();

        verify_sha256(&path, &TEST_DATA_SHA256.to_ascii_uppercase())
            .await
            .unwrap();

        let err = verify_sha256(&path, "00").await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::IntegrityFailed { ref actual, .. } if actual == TEST_DATA_SHA256
        ));
    }
}
