//! Checkpoint retrieval.
//!
//! The model file is fetched once from a remote URL and kept at a local path.
//! Later runs reuse the local copy. When a SHA-256 digest is configured, both
//! fresh downloads and existing files must match it.

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CheckpointSettings;

const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct CheckpointSource {
    pub url: Option<String>,
    pub path: PathBuf,
    pub sha256: Option<String>,
    pub retries: u32,
    /// Show a progress bar while downloading.
    pub progress: bool,
}

impl CheckpointSource {
    pub fn from_settings(settings: &CheckpointSettings) -> Self {
        Self {
            url: settings.url.clone(),
            path: settings.path.clone(),
            sha256: settings.sha256.clone(),
            retries: settings.retries,
            progress: true,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the local checkpoint path, downloading it first when absent.
    pub fn ensure_local(&self) -> Result<PathBuf> {
        if self.path.is_file() {
            log::debug!("checkpoint present at {}", self.path.display());
            self.verify_digest(&self.path)?;
            return Ok(self.path.clone());
        }

        let url = self.url.as_deref().ok_or_else(|| {
            anyhow!(
                "checkpoint {} not found and no download url configured (set WHEAT_CHECKPOINT_URL)",
                self.path.display()
            )
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("create checkpoint directory {}", parent.display())
                })?;
            }
        }

        let partial = partial_path(&self.path);
        let attempts = self.retries.saturating_add(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            log::info!(
                "downloading checkpoint {} -> {} (attempt {}/{})",
                url,
                self.path.display(),
                attempt,
                attempts
            );
            match self.download_once(url, &partial) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(DownloadError::Fatal(err)) => {
                    let _ = fs::remove_file(&partial);
                    return Err(err);
                }
                Err(DownloadError::Retryable(err)) => {
                    log::warn!("checkpoint download failed: {:#}", err);
                    let _ = fs::remove_file(&partial);
                    last_err = Some(err);
                    if attempt < attempts {
                        std::thread::sleep(RETRY_BACKOFF * attempt);
                    }
                }
            }
        }
        if let Some(err) = last_err {
            return Err(err.context(format!(
                "checkpoint download failed after {} attempts",
                attempts
            )));
        }

        if let Err(err) = self.verify_digest(&partial) {
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
        fs::rename(&partial, &self.path).with_context(|| {
            format!(
                "move downloaded checkpoint into place at {}",
                self.path.display()
            )
        })?;
        log::info!("checkpoint saved to {}", self.path.display());
        Ok(self.path.clone())
    }

    fn download_once(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let agent = ureq::AgentBuilder::new()
            .timeout(DOWNLOAD_TIMEOUT)
            .build();
        let response = match agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) if (500..600).contains(&code) => {
                return Err(DownloadError::Retryable(anyhow!(
                    "server returned HTTP {} for {}",
                    code,
                    url
                )));
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(DownloadError::Fatal(anyhow!(
                    "server returned HTTP {} for {}",
                    code,
                    url
                )));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(DownloadError::Retryable(
                    anyhow!(transport).context(format!("connect to {}", url)),
                ));
            }
        };

        let total = response
            .header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok());
        let bar = self.progress_bar(total, url);

        let mut file = File::create(dest)
            .with_context(|| format!("create {}", dest.display()))
            .map_err(DownloadError::Fatal)?;
        let mut reader = bar.wrap_read(response.into_reader());
        let written = io::copy(&mut reader, &mut file)
            .context("read checkpoint body")
            .map_err(DownloadError::Retryable)?;
        file.flush()
            .and_then(|_| file.sync_all())
            .with_context(|| format!("flush {}", dest.display()))
            .map_err(DownloadError::Fatal)?;
        bar.finish_and_clear();

        if let Some(expected) = total {
            if written != expected {
                return Err(DownloadError::Retryable(anyhow!(
                    "truncated download: expected {} bytes, received {}",
                    expected,
                    written
                )));
            }
        }
        if written == 0 {
            return Err(DownloadError::Retryable(anyhow!("empty checkpoint body")));
        }
        log::debug!("downloaded {} bytes", written);
        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>, url: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let name = url.rsplit('/').next().unwrap_or(url).to_string();
        let bar = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                let style = ProgressStyle::with_template(
                    "{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar());
                bar.set_style(style);
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                let style = ProgressStyle::with_template("{spinner} {msg} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                bar.set_style(style);
                bar
            }
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_message(name);
        bar
    }

    fn verify_digest(&self, path: &Path) -> Result<()> {
        let Some(expected) = &self.sha256 else {
            return Ok(());
        };
        let actual = file_sha256_hex(path)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "checkpoint digest mismatch for {}: expected {}, got {}",
                path.display(),
                expected,
                actual
            ));
        }
        Ok(())
    }
}

enum DownloadError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn file_sha256_hex(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
