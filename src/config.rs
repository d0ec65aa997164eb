use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filter::resolve_threshold;

const DEFAULT_CHECKPOINT_PATH: &str = "fasterrcnn_wheat.onnx";
const DEFAULT_CHECKPOINT_RETRIES: u32 = 3;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_WEB_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_CACHE_CAPACITY: usize = 1;

#[derive(Debug, Deserialize, Default)]
struct DemoConfigFile {
    checkpoint: Option<CheckpointConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    web: Option<WebConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CheckpointConfigFile {
    url: Option<String>,
    path: Option<PathBuf>,
    sha256: Option<String>,
    retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    input_layout: Option<InputLayout>,
    cache_ttl_secs: Option<u64>,
    cache_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct WebConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

/// Tensor layout the exported model expects.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[3, H, W]`, the torchvision detection export.
    #[default]
    Chw,
    /// `[1, 3, H, W]`.
    Nchw,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub checkpoint: CheckpointSettings,
    pub model: ModelSettings,
    pub confidence_threshold: f32,
    pub web: WebSettings,
}

#[derive(Debug, Clone)]
pub struct CheckpointSettings {
    pub url: Option<String>,
    pub path: PathBuf,
    pub sha256: Option<String>,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: String,
    pub input_layout: InputLayout,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub addr: String,
    pub max_upload_bytes: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::from_file(DemoConfigFile::default())
    }
}

impl DemoConfig {
    /// Load defaults, then the file named by `WHEAT_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WHEAT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DemoConfigFile) -> Self {
        let checkpoint = file.checkpoint.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let web = file.web.unwrap_or_default();
        Self {
            checkpoint: CheckpointSettings {
                url: checkpoint.url,
                path: checkpoint
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
                sha256: checkpoint.sha256,
                retries: checkpoint.retries.unwrap_or(DEFAULT_CHECKPOINT_RETRIES),
            },
            model: ModelSettings {
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                input_layout: model.input_layout.unwrap_or_default(),
                cache_ttl: Duration::from_secs(
                    model.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS),
                ),
                cache_capacity: model.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            },
            confidence_threshold: resolve_threshold(
                file.detection
                    .and_then(|detection| detection.confidence_threshold),
            ),
            web: WebSettings {
                addr: web.addr.unwrap_or_else(|| DEFAULT_WEB_ADDR.to_string()),
                max_upload_bytes: web.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WHEAT_CHECKPOINT_URL") {
            if !url.trim().is_empty() {
                self.checkpoint.url = Some(url);
            }
        }
        if let Ok(path) = std::env::var("WHEAT_CHECKPOINT_PATH") {
            if !path.trim().is_empty() {
                self.checkpoint.path = PathBuf::from(path);
            }
        }
        if let Ok(digest) = std::env::var("WHEAT_CHECKPOINT_SHA256") {
            if !digest.trim().is_empty() {
                self.checkpoint.sha256 = Some(digest);
            }
        }
        if let Ok(backend) = std::env::var("WHEAT_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend;
            }
        }
        if let Ok(addr) = std::env::var("WHEAT_WEB_ADDR") {
            if !addr.trim().is_empty() {
                self.web.addr = addr;
            }
        }
        if let Ok(confidence) = std::env::var("WHEAT_CONFIDENCE") {
            let parsed: f32 = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("WHEAT_CONFIDENCE must be a number between 0 and 1"))?;
            self.confidence_threshold = resolve_threshold(Some(parsed));
        }
        if let Ok(ttl) = std::env::var("WHEAT_MODEL_TTL_SECS") {
            let seconds: u64 = ttl.trim().parse().map_err(|_| {
                anyhow!("WHEAT_MODEL_TTL_SECS must be an integer number of seconds")
            })?;
            self.model.cache_ttl = Duration::from_secs(seconds);
        }
        Ok(())
    }

    /// Check ranges and normalize fields; call again after changing fields by hand.
    pub fn validate(&mut self) -> Result<()> {
        validate_threshold(self.confidence_threshold)?;

        self.model.backend = self.model.backend.trim().to_lowercase();
        if !matches!(self.model.backend.as_str(), "tract" | "fixed") {
            return Err(anyhow!(
                "unknown backend '{}' (expected 'tract' or 'fixed')",
                self.model.backend
            ));
        }
        if self.model.cache_capacity == 0 {
            return Err(anyhow!("model cache capacity must be at least 1"));
        }
        if self.model.cache_ttl.as_secs() == 0 {
            return Err(anyhow!("model cache ttl must be greater than zero"));
        }
        if self.web.max_upload_bytes == 0 {
            return Err(anyhow!("web max_upload_bytes must be greater than zero"));
        }

        if let Some(raw) = &self.checkpoint.url {
            let parsed = url::Url::parse(raw)
                .map_err(|e| anyhow!("invalid checkpoint url '{}': {}", raw, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!(
                    "checkpoint url must use http or https, got '{}'",
                    parsed.scheme()
                ));
            }
        }
        if let Some(digest) = &mut self.checkpoint.sha256 {
            *digest = digest.trim().to_lowercase();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(anyhow!("checkpoint sha256 must be 64 hex characters"));
            }
        }
        Ok(())
    }
}

/// Thresholds outside [0, 1] (or NaN) are configuration errors.
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "confidence threshold must be between 0 and 1, got {}",
            threshold
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<DemoConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: DemoConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
