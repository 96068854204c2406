//! Resumable HTTP transfer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode, header};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checksum::{should_verify, verify_sha256};
use crate::error::DownloadError;
use crate::resume::{STALE_PARTIAL_AGE, partial_path, prepare_resume};

/// Sent with every download; some mirrors reject unknown agents.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One transfer: where from, where to, and what we already have.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub dest: PathBuf,
    /// Byte offset of the existing `<dest>.partial` to resume from.
    pub resume_from: u64,
    /// Fallback progress total when the server sends no length.
    pub expected_size: Option<u64>,
    /// SHA-256 to verify before promotion; placeholders are ignored.
    pub checksum: Option<String>,
}

impl DownloadRequest {
    /// A fresh download that ignores any partial file.
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            resume_from: 0,
            expected_size: None,
            checksum: None,
        }
    }

    /// A download that resumes a fresh partial file and discards a stale one.
    pub fn resumable(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        let mut request = Self::new(url, dest);
        request.resume_from = prepare_resume(&partial_path(&request.dest), STALE_PARTIAL_AGE);
        request
    }

    #[must_use]
    pub const fn with_resume_from(mut self, offset: u64) -> Self {
        self.resume_from = offset;
        self
    }

    #[must_use]
    pub const fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// What a successful transfer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// Offset the transfer actually resumed from (0 for a full download).
    pub resumed_from: u64,
}

/// HTTP downloader with range resume and atomic promotion.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: Client,
}

impl DownloadEngine {
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS).
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Download `request.url` into `request.dest`.
    ///
    /// `on_progress(downloaded, total)` is invoked for every chunk written,
    /// with `downloaded` counting bytes already present in the partial file.
    /// On any transfer or write error the partial file is left in place.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<DownloadOutcome, DownloadError> {
        let partial = partial_path(&request.dest);
        if let Some(parent) = request.dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut start = request.resume_from;
        if start > 0 && fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0) < start {
            warn!(path = %partial.display(), "Partial file shorter than resume offset, restarting");
            start = 0;
        }

        info!(url = %request.url, start_byte = start, "Downloading");
        let mut response = self.send(&request.url, start, cancel).await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && start > 0 {
            info!("Server rejected range, starting from beginning");
            remove_quietly(&partial).await;
            start = 0;
            response = self.send(&request.url, 0, cancel).await?;
        }

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::network_with_status(
                format!("download failed with status: {status}"),
                status.as_u16(),
            ));
        }

        if start > 0 && status == StatusCode::OK {
            debug!("Server ignored range header, rewriting from zero");
            start = 0;
        }

        let declared = response.content_length().map(|len| len + start);
        let total = declared.or(request.expected_size).unwrap_or(0);

        let mut file = if start > 0 {
            // Bytes past the resume offset are not trusted; drop them first.
            let file = OpenOptions::new().write(true).open(&partial).await?;
            file.set_len(start).await?;
            drop(file);
            OpenOptions::new().append(true).open(&partial).await?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&partial)
                .await?
        };

        let mut downloaded = start;
        if start > 0 {
            on_progress(downloaded, total);
        }

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    file.flush().await?;
                    info!(bytes = downloaded, "Download cancelled");
                    return Err(DownloadError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk).await?;
                    downloaded += chunk.len() as u64;
                    on_progress(downloaded, total);
                }
                Some(Err(e)) => {
                    file.flush().await?;
                    warn!(error = %e, bytes = downloaded, "Transfer interrupted");
                    return Err(DownloadError::Interrupted {
                        bytes_downloaded: downloaded,
                    });
                }
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = declared {
            if downloaded < expected {
                return Err(DownloadError::Interrupted {
                    bytes_downloaded: downloaded,
                });
            }
        }

        if should_verify(request.checksum.as_deref()) {
            if let Some(checksum) = request.checksum.as_deref() {
                if let Err(e) = verify_sha256(&partial, checksum).await {
                    warn!(path = %partial.display(), error = %e, "Discarding corrupt download");
                    remove_quietly(&partial).await;
                    return Err(e);
                }
            }
        }

        promote(&partial, &request.dest).await?;
        info!(path = %request.dest.display(), bytes = downloaded, "Download complete");

        Ok(DownloadOutcome {
            path: request.dest.clone(),
            bytes: downloaded,
            resumed_from: start,
        })
    }

    async fn send(
        &self,
        url: &str,
        start: u64,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut builder = self.client.get(url);
        if start > 0 {
            builder = builder.header(header::RANGE, format!("bytes={start}-"));
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = builder.send() => Ok(result?),
        }
    }
}

/// Move the finished partial into place, copying when rename fails
/// (e.g. across devices).
async fn promote(partial: &Path, dest: &Path) -> Result<(), DownloadError> {
    if let Err(rename_err) = fs::rename(partial, dest).await {
        warn!(error = %rename_err, "Rename failed, trying copy instead");
        if let Err(copy_err) = fs::copy(partial, dest).await {
            remove_quietly(dest).await;
            return Err(copy_err.into());
        }
        remove_quietly(partial).await;
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumable_request_picks_up_fresh_partial() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("model.gguf");
        std::fs::write(partial_path(&dest), vec![1u8; 10]).unwrap();

        let request = DownloadRequest::resumable("http://localhost/model.gguf", &dest);
        assert_eq!(request.resume_from, 10);
        assert_eq!(request.dest, dest);
    }

    #[test]
    fn builder_sets_optional_fields() {
        let request = DownloadRequest::new("http://x", "/tmp/x")
            .with_expected_size(42)
            .with_checksum("abc")
            .with_resume_from(7);
        assert_eq!(request.expected_size, Some(42));
        assert_eq!(request.checksum.as_deref(), Some("abc"));
        assert_eq!(request.resume_from, 7);
    }

    #[tokio::test]
    async fn promote_moves_partial() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("out.bin");
        let partial = partial_path(&dest);
        std::fs::write(&partial, b"payload").unwrap();

        promote(&partial, &dest).await.unwrap();
        assert!(!partial.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }
}
