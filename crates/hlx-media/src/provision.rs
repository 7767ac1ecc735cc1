//! Encoder binary provisioning.
//!
//! The encoder is resolved at most once per process. Bundled encoders are
//! written to a temp name and renamed into place, so concurrent callers never
//! observe a half-written binary. A failed resolution is remembered and
//! returned to every later caller without retrying.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Version reported when none was configured.
pub const UNKNOWN_ENCODER_VERSION: &str = "unknown";

/// Where the encoder binary comes from.
#[derive(Debug, Clone)]
pub enum EncoderSource {
    /// Look up `ffmpeg` on the PATH.
    System,
    /// Use an existing binary as-is.
    Path(PathBuf),
    /// Install the given bytes under the provisioner's install directory.
    Bundled {
        bytes: Cow<'static, [u8]>,
        file_name: String,
    },
}

/// Resolves and caches the encoder binary path for the process lifetime.
#[derive(Debug)]
pub struct EncoderProvisioner {
    source: EncoderSource,
    install_dir: PathBuf,
    version: String,
    resolved: OnceCell<Result<PathBuf, String>>,
    materializations: AtomicUsize,
}

impl EncoderProvisioner {
    /// Create a provisioner; nothing is resolved until [`resolve`](Self::resolve).
    pub fn new(source: EncoderSource, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            install_dir: install_dir.into(),
            version: UNKNOWN_ENCODER_VERSION.to_string(),
            resolved: OnceCell::new(),
            materializations: AtomicUsize::new(0),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Static descriptor of the encoder build.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolve the encoder path, materializing it on first use.
    pub async fn resolve(&self) -> MediaResult<PathBuf> {
        self.resolved
            .get_or_init(|| async {
                match self.materialize().await {
                    Ok(path) => {
                        info!(path = %path.display(), version = %self.version, "Encoder resolved");
                        Ok(path)
                    }
                    Err(e) => {
                        warn!("Encoder resolution failed: {}", e);
                        Err(match e {
                            MediaError::ProvisionFailed(msg) => msg,
                            other => other.to_string(),
                        })
                    }
                }
            })
            .await
            .clone()
            .map_err(MediaError::ProvisionFailed)
    }

    /// True iff [`resolve`](Self::resolve) succeeds.
    pub async fn is_available(&self) -> bool {
        self.resolve().await.is_ok()
    }

    /// Number of times an artifact was written to disk.
    pub fn materialization_count(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Best-effort removal of an installed encoder.
    ///
    /// Only bundled encoders are removed; system and explicit paths are never
    /// touched. Failures are logged, not returned.
    pub async fn teardown(&self) {
        if !matches!(self.source, EncoderSource::Bundled { .. }) {
            return;
        }
        let Some(Ok(path)) = self.resolved.get() else {
            debug!("Encoder was never installed, nothing to tear down");
            return;
        };

        match fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Removed installed encoder"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to remove installed encoder: {}", e),
        }
    }

    async fn materialize(&self) -> MediaResult<PathBuf> {
        match &self.source {
            EncoderSource::System => check_ffmpeg(),
            EncoderSource::Path(path) => {
                let meta = fs::metadata(path).await.map_err(|e| {
                    MediaError::ProvisionFailed(format!("{}: {}", path.display(), e))
                })?;
                if !meta.is_file() {
                    return Err(MediaError::ProvisionFailed(format!(
                        "{} is not a file",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
            EncoderSource::Bundled { bytes, file_name } => {
                let path = install(&self.install_dir, file_name, bytes).await?;
                self.materializations.fetch_add(1, Ordering::SeqCst);
                counter!("hlx_encoder_materializations_total").increment(1);
                Ok(path)
            }
        }
    }
}

async fn install(dir: &Path, file_name: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
    if bytes.is_empty() {
        return Err(MediaError::ProvisionFailed("bundled encoder is empty".to_string()));
    }

    fs::create_dir_all(dir).await?;
    let target = dir.join(file_name);
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755)).await?;
    }

    if let Err(e) = fs::rename(&tmp, &target).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(path = %target.display(), size = bytes.len(), "Installed bundled encoder");
    Ok(target)
}
