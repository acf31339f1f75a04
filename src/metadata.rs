use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths;

/// Installation record kept in metadata.json.
///
/// This file is the single source of truth for whether mindcraft-ce is
/// installed. The provisioning script rewrites it on a successful install;
/// the launcher rewrites it on uninstall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub version: Option<String>,
    pub installed: bool,
    pub installation_path: Option<PathBuf>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: None,
            installed: false,
            installation_path: None,
        }
    }
}

/// Async accessor for the metadata file. Reads and writes the whole document.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store rooted at the launcher's local data directory.
    pub fn open_default() -> Result<Self> {
        let dir = paths::local_data_dir()?;
        Ok(Self::new(paths::metadata_path(&dir)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the metadata file, creating it with defaults on first run.
    pub async fn load_or_init(&self) -> Result<Metadata> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let initial = Metadata::default();
                self.save(&initial).await?;
                info!("created initial metadata at {}", self.path.display());
                Ok(initial)
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    pub async fn save(&self, metadata: &Metadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(metadata)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    /// Returns the installation directory, or an error when not installed.
    pub async fn require_installed(&self) -> Result<PathBuf> {
        let metadata = self.load_or_init().await?;
        if !metadata.installed {
            return Err(anyhow!("mindcraft-ce is not installed"));
        }
        metadata
            .installation_path
            .ok_or_else(|| anyhow!("metadata has no installation path"))
    }
}
