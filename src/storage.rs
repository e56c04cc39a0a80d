//! Persistence of finished interview artifacts

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use crate::error::{Result, SessionError};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `bytes` under a relative `path`; returns a URL for the stored object
    async fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String>;
}

/// Stores artifacts as files below a root directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative object path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            anyhow::bail!("invalid object path: {}", path);
        }
        Ok(self.root.join(relative))
    }

    async fn write(&self, bytes: &[u8], path: &str) -> anyhow::Result<PathBuf> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        // Absolute path for the URL
        let target = tokio::fs::canonicalize(&target)
            .await
            .with_context(|| format!("Failed to resolve {}", target.display()))?;
        Ok(target)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, bytes: &[u8], path: &str, content_type: &str) -> Result<String> {
        let target = self
            .write(bytes, path)
            .await
            .map_err(|e| SessionError::Storage(format!("{:#}", e)))?;

        info!(
            "Stored {} ({} bytes, {})",
            target.display(),
            bytes.len(),
            content_type
        );
        Ok(format!("file://{}", target.display()))
    }
}
