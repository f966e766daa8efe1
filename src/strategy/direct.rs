//! Direct HTTP acquisition for locators that already point at a media
//! file. Streams the response body to disk with byte-accurate progress.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::fetcher::{Artifact, CancelFlag, FetchRequest, ProbeReport, ProgressSink};
use crate::job::sanitize_title;

use super::{Strategy, StrategyError};

const MEDIA_EXTENSIONS: &[&str] = &["mp4", "m4a", "mp3", "webm", "mkv", "mov", "wav", "ogg"];
const USER_AGENT: &str = concat!("mediagrab/", env!("CARGO_PKG_VERSION"));

/// Primary strategy: plain HTTP download of a direct media URL.
pub struct DirectHttpStrategy {
    client: Client,
    download_dir: PathBuf,
}

impl DirectHttpStrategy {
    pub fn new(download_dir: impl Into<PathBuf>) -> Result<Self, StrategyError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| StrategyError::Network(e.to_string()))?;
        Ok(Self {
            client,
            download_dir: download_dir.into(),
        })
    }

    /// The file extension when the locator names a media file directly.
    fn media_extension(locator: &str) -> Option<&str> {
        let path = locator.split(['?', '#']).next().unwrap_or(locator);
        let ext = path.rsplit('.').next()?;
        MEDIA_EXTENSIONS.contains(&ext).then_some(ext)
    }
}

#[async_trait]
impl Strategy for DirectHttpStrategy {
    fn name(&self) -> &str {
        "direct-http"
    }

    async fn probe(&self, locator: &str) -> Result<ProbeReport, StrategyError> {
        if Self::media_extension(locator).is_none() {
            return Err(StrategyError::Unsupported(
                "locator does not name a media file".to_string(),
            ));
        }
        // Title from the last path segment, extension stripped.
        let path = locator.split(['?', '#']).next().unwrap_or(locator);
        let name = path.rsplit('/').next().unwrap_or(path);
        let title = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        Ok(ProbeReport::single(title))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, StrategyError> {
        let extension = Self::media_extension(&request.locator).ok_or_else(|| {
            StrategyError::Unsupported("locator does not name a media file".to_string())
        })?;

        let response = self
            .client
            .get(&request.locator)
            .send()
            .await
            .map_err(|e| StrategyError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StrategyError::Network(format!("server returned {status}")));
        }
        if !status.is_success() {
            return Err(StrategyError::Unsupported(format!("server returned {status}")));
        }

        let total = response.content_length();
        fs::create_dir_all(&self.download_dir).await?;
        let filename = format!("{}.{extension}", sanitize_title(&request.title));
        let path = self.download_dir.join(filename);
        let mut file = fs::File::create(&path).await?;
        let mut guard = PartialGuard::new(path.clone());

        let mut downloaded: u64 = 0;
        let mut response = response;
        loop {
            if cancel.is_canceled() {
                return Err(StrategyError::Canceled);
            }
            let chunk = match next_chunk(&mut response).await? {
                Some(chunk) => chunk,
                None => break,
            };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(total) = total.filter(|t| *t > 0) {
                // Hold 100 back until the file is actually on disk.
                let percent = ((downloaded * 100) / total).min(99) as u8;
                sink(percent);
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        guard.disarm();
        sink(100);

        debug!(path = %path.display(), bytes = downloaded, "Direct download finished");
        Ok(Artifact {
            path,
            file_size: Some(downloaded),
        })
    }
}

async fn next_chunk(response: &mut reqwest::Response) -> Result<Option<Bytes>, StrategyError> {
    response
        .chunk()
        .await
        .map_err(|e| StrategyError::Network(e.to_string()))
}

/// Removes an in-progress download unless disarmed. Covers cancel and
/// error returns as well as the caller dropping the fetch future at
/// its attempt timeout.
struct PartialGuard {
    path: Option<PathBuf>,
}

impl PartialGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
