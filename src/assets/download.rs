//! Idempotent fetch-or-skip of a URL into the cache.

use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::resolve::USER_AGENT;
use crate::cache::{self, CachedFile};
use crate::error::DownloadError;

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    timeout: Duration,
}

impl Downloader {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, timeout })
    }

    /// Download `url` to `dest` unless `dest` already holds a non-empty file.
    ///
    /// A failed download leaves no file behind.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<CachedFile, DownloadError> {
        let io_err = |source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if cache::is_cached(dest) {
            info!(path = %dest.display(), "already cached, skipping download");
            return CachedFile::inspect(dest, false).map_err(io_err);
        }

        if let Err(e) = self.stream_to(url, dest).await {
            if let Err(cleanup) = cache::discard(dest) {
                warn!(path = %dest.display(), error = %cleanup, "could not remove partial download");
            }
            return Err(e);
        }

        let cached = CachedFile::inspect(dest, true).map_err(io_err)?;
        info!(path = %dest.display(), size = cached.size, sha256 = %cached.sha256, "downloaded");
        Ok(cached)
    }

    async fn stream_to(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let transport = |e: reqwest::Error| DownloadError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let io_err = |source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut writer = tokio::io::BufWriter::new(file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            writer.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(io_err)?;

        if written == 0 {
            return Err(DownloadError::Empty {
                url: url.to_string(),
            });
        }
        Ok(())
    }
}
