//! Export service configuration.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use hlx_media::EncoderSource;
use hlx_models::EncodingConfig;

/// Export service configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Pipelines allowed to run at once
    pub max_concurrent_exports: usize,
    /// Root of the per-job work directories
    pub work_dir: PathBuf,
    /// Root of the delivery directories
    pub output_dir: PathBuf,
    /// JSON file holding job records
    pub store_path: PathBuf,
    /// Directory with one subdirectory per known project
    pub projects_root: PathBuf,
    /// Explicit encoder binary
    pub encoder_path: Option<PathBuf>,
    /// Encoder binary to install under `encoder_install_dir`
    pub encoder_bundle: Option<PathBuf>,
    pub encoder_install_dir: PathBuf,
    pub encoder_version: String,
    /// Per-invocation encoder timeout
    pub encode_timeout: Option<Duration>,
    /// How long shutdown waits for running pipelines
    pub shutdown_timeout: Duration,
    /// Prometheus listen address, metrics are off when unset
    pub metrics_addr: Option<SocketAddr>,
    pub encoding: EncodingConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrent_exports: 2,
            work_dir: PathBuf::from("/tmp/hlx/work"),
            output_dir: PathBuf::from("/tmp/hlx/exports"),
            store_path: PathBuf::from("/tmp/hlx/jobs.json"),
            projects_root: PathBuf::from("/tmp/hlx/projects"),
            encoder_path: None,
            encoder_bundle: None,
            encoder_install_dir: PathBuf::from("/tmp/hlx/bin"),
            encoder_version: hlx_media::provision::UNKNOWN_ENCODER_VERSION.to_string(),
            encode_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            metrics_addr: None,
            encoding: EncodingConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut encoding = defaults.encoding.clone();
        if let Ok(codec) = std::env::var("HLX_VIDEO_CODEC") {
            encoding.codec = codec;
        }
        if let Ok(preset) = std::env::var("HLX_PRESET") {
            encoding.preset = preset;
        }
        if let Some(crf) = std::env::var("HLX_CRF").ok().and_then(|s| s.parse().ok()) {
            encoding.crf = crf;
        }

        Self {
            max_concurrent_exports: std::env::var("HLX_MAX_CONCURRENT_EXPORTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_exports),
            work_dir: env_path("HLX_WORK_DIR").unwrap_or(defaults.work_dir),
            output_dir: env_path("HLX_OUTPUT_DIR").unwrap_or(defaults.output_dir),
            store_path: env_path("HLX_STORE_PATH").unwrap_or(defaults.store_path),
            projects_root: env_path("HLX_PROJECTS_ROOT").unwrap_or(defaults.projects_root),
            encoder_path: env_path("HLX_ENCODER_PATH"),
            encoder_bundle: env_path("HLX_ENCODER_BUNDLE"),
            encoder_install_dir: env_path("HLX_ENCODER_INSTALL_DIR")
                .unwrap_or(defaults.encoder_install_dir),
            encoder_version: std::env::var("HLX_ENCODER_VERSION")
                .unwrap_or(defaults.encoder_version),
            encode_timeout: std::env::var("HLX_ENCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            shutdown_timeout: Duration::from_secs(
                std::env::var("HLX_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
            encoding,
        }
    }

    /// Where the encoder comes from, in order of preference: explicit path,
    /// bundled binary, then `ffmpeg` on the PATH.
    pub async fn encoder_source(&self) -> std::io::Result<EncoderSource> {
        if let Some(path) = &self.encoder_path {
            return Ok(EncoderSource::Path(path.clone()));
        }

        if let Some(bundle) = &self.encoder_bundle {
            let bytes = tokio::fs::read(bundle).await?;
            let file_name = bundle
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "ffmpeg".to_string());
            return Ok(EncoderSource::Bundled {
                bytes: Cow::Owned(bytes),
                file_name,
            });
        }

        Ok(EncoderSource::System)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
