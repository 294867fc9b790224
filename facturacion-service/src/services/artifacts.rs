//! Object storage for rendered artifacts (signed XML, PDFs).

use async_trait::async_trait;
use facturacion_core::error::AppError;
use std::path::PathBuf;
use tokio::fs;

#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist an artifact under `key` and return its public URL.
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<String, AppError>;
}

/// Filesystem-backed artifact storage; URLs are served from a configured
/// public base (reverse proxy or CDN in front of the artifact directory).
pub struct LocalArtifactStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStorage {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into(),
        })
    }
}

#[async_trait]
impl ArtifactStorage for LocalArtifactStorage {
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<String, AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        ))
    }
}
