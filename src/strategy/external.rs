//! Acquisition via an external downloader tool (yt-dlp compatible).
//!
//! The tool is opaque: it exposes no byte-level transfer progress, so
//! this strategy emits a bounded sequence of coarse synthetic progress
//! steps while the tool runs. The synthetic sequence is cosmetic, tops
//! out at 95 and never reports 100 — completion is only signaled once
//! the tool has exited successfully and the artifact is on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::fetcher::{Artifact, CancelFlag, FetchRequest, ProbeReport, ProgressSink};
use crate::job::{MediaMode, QualityHint, sanitize_title};

use super::quality::{StreamVariant, select_variant};
use super::{Strategy, StrategyError};

/// Synthetic progress steps emitted while the tool runs. Deliberately
/// capped below 100.
const SYNTHETIC_STEPS: [u8; 7] = [10, 25, 40, 55, 70, 85, 95];
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Last-resort strategy that shells out to a yt-dlp-style command.
pub struct ExternalToolStrategy {
    command: String,
    download_dir: PathBuf,
}

impl ExternalToolStrategy {
    pub fn new(command: impl Into<String>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            download_dir: download_dir.into(),
        }
    }

    /// Run the tool in metadata-only mode and parse its JSON document.
    async fn dump_info(&self, locator: &str, flat: bool) -> Result<Value, StrategyError> {
        let mut args = vec!["--dump-single-json", "--no-download", "--no-warnings"];
        if flat {
            args.push("--flat-playlist");
        }
        let output = Command::new(&self.command)
            .args(&args)
            .arg(locator)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(StrategyError::Tool(stderr_excerpt(&output.stderr)));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| StrategyError::Tool(format!("unparseable metadata: {e}")))
    }

    /// Locate the newest file the tool wrote for `title`. The output
    /// template fixes the stem, the tool picks the extension.
    async fn find_artifact(&self, title: &str) -> Result<Artifact, StrategyError> {
        let mut newest: Option<(std::time::SystemTime, PathBuf, u64)> = None;
        let mut dir = tokio::fs::read_dir(&self.download_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.starts_with(title) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            if newest.as_ref().is_none_or(|(t, _, _)| modified > *t) {
                newest = Some((modified, path, meta.len()));
            }
        }
        let (_, path, len) = newest.ok_or_else(|| {
            StrategyError::Tool("tool reported success but produced no file".to_string())
        })?;
        Ok(Artifact {
            path,
            file_size: Some(len),
        })
    }
}

#[async_trait]
impl Strategy for ExternalToolStrategy {
    fn name(&self) -> &str {
        "external-tool"
    }

    async fn probe(&self, locator: &str) -> Result<ProbeReport, StrategyError> {
        let info = self.dump_info(locator, true).await?;
        let title = info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled")
            .to_string();

        if info.get("_type").and_then(Value::as_str) == Some("playlist") {
            // Provider order preserved.
            let items: Vec<String> = info
                .get("entries")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| {
                            e.get("url")
                                .or_else(|| e.get("webpage_url"))
                                .and_then(Value::as_str)
                                .map(str::to_string)
                        })
                        .collect()
                })
                .unwrap_or_default();
            if items.is_empty() {
                return Err(StrategyError::Tool("playlist has no entries".to_string()));
            }
            Ok(ProbeReport::collection(title, items))
        } else {
            let mut report = ProbeReport::single(title);
            report.duration = info.get("duration").and_then(Value::as_u64);
            Ok(report)
        }
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        sink: ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Artifact, StrategyError> {
        let title = sanitize_title(&request.title);
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let template = self.download_dir.join(format!("{title}.%(ext)s"));

        let mut command = Command::new(&self.command);
        command.arg("--no-warnings");
        match request.mode {
            MediaMode::Audio => {
                command.args(["-x", "--audio-format", "mp3", "--audio-quality", "0"]);
            }
            MediaMode::Video => {
                // Resolve the format against what the provider actually
                // advertises; fall back to a generic selector when the
                // probe yields no usable variant list.
                let selector = match self.dump_info(&request.locator, false).await {
                    Ok(info) => {
                        let variants = parse_variants(&info);
                        select_variant(&variants, request.mode, &request.quality)
                            .map(|v| v.id.clone())
                    }
                    Err(err) => {
                        warn!(error = %err, "Format probe failed, using generic selector");
                        None
                    }
                };
                let selector =
                    selector.unwrap_or_else(|| generic_selector(&request.quality).to_string());
                command.args(["-f", &selector]);
            }
        }
        command.arg("-o").arg(&template).arg(&request.locator);
        command.kill_on_drop(true);

        let done = Arc::new(AtomicBool::new(false));
        let heartbeat = spawn_heartbeat(Arc::clone(&sink), Arc::clone(&done), cancel.clone());

        debug!(command = %self.command, locator = %request.locator, "Invoking external tool");
        let output = command.output().await;
        done.store(true, Ordering::SeqCst);
        heartbeat.abort();

        let output = output?;
        if !output.status.success() {
            return Err(StrategyError::Tool(stderr_excerpt(&output.stderr)));
        }

        let artifact = self.find_artifact(&title).await?;
        sink(100);
        Ok(artifact)
    }
}

fn parse_variants(info: &Value) -> Vec<StreamVariant> {
    info.get("formats")
        .and_then(Value::as_array)
        .map(|formats| {
            formats
                .iter()
                .filter_map(|f| {
                    let id = f.get("format_id").and_then(Value::as_str)?;
                    let codec_present = |key: &str| {
                        f.get(key)
                            .and_then(Value::as_str)
                            .is_some_and(|c| c != "none")
                    };
                    Some(StreamVariant {
                        id: id.to_string(),
                        height: f.get("height").and_then(Value::as_u64).map(|h| h as u32),
                        has_video: codec_present("vcodec"),
                        has_audio: codec_present("acodec"),
                        container: f
                            .get("ext")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Combined-asset-first selector used when no variant list is known.
fn generic_selector(quality: &QualityHint) -> String {
    match quality {
        QualityHint::Highest => {
            "best[ext=mp4][acodec!=none][vcodec!=none]/best[ext=mp4]/best".to_string()
        }
        QualityHint::Lowest => {
            "worst[ext=mp4][acodec!=none][vcodec!=none]/worst[ext=mp4]/worst".to_string()
        }
        tier => {
            let height = tier.tier_height().unwrap_or(720);
            format!(
                "best[height<={height}][ext=mp4][acodec!=none][vcodec!=none]/best[height<={height}]/best"
            )
        }
    }
}

/// Coarse synthetic progress while the tool is in flight. Stops as soon
/// as the real operation finishes or cancellation is observed.
fn spawn_heartbeat(
    sink: ProgressSink,
    done: Arc<AtomicBool>,
    cancel: CancelFlag,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for step in SYNTHETIC_STEPS {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            if done.load(Ordering::SeqCst) || cancel.is_canceled() {
                break;
            }
            sink(step);
        }
    })
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "tool exited unsuccessfully".to_string()
    } else {
        trimmed.chars().take(240).collect()
    }
}
