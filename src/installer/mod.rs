//! Install, update and uninstall orchestration.
//!
//! The launcher itself never downloads or unpacks the project. It resolves
//! the latest release tag, writes the platform provisioning script, runs it
//! elevated, and tails the log the script writes. The script is the one that
//! records metadata on success, so a confirmed install is simply metadata
//! that says installed afterwards.

pub mod elevation;
pub mod log_watcher;
pub mod scripts;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::metadata::{Metadata, MetadataStore};
use crate::{paths, version};
use elevation::{classify_exit, elevated_command};
use log_watcher::LogWatcher;
use scripts::OsFamily;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("your operating system is not supported by mindcraft-ce")]
    UnsupportedPlatform,
    #[error("the operation was cancelled by the user")]
    UserCancelled,
    #[error("the installation script failed with exit code {0}")]
    ScriptFailed(i32),
    #[error("the installation script was terminated before reporting an exit code")]
    ScriptTerminated,
    #[error("installation process failed; check the install log for details")]
    NotConfirmed,
}

/// Outcome of comparing installed state against the latest release.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateStatus {
    NotInstalled { latest: String },
    UpToDate { version: String },
    UpdateAvailable { installed: String, latest: String },
}

fn resolve_status(metadata: &Metadata, latest: String) -> UpdateStatus {
    if !metadata.installed {
        return UpdateStatus::NotInstalled { latest };
    }
    match metadata.version.as_deref() {
        Some(installed) if installed == latest => UpdateStatus::UpToDate { version: latest },
        installed => UpdateStatus::UpdateAvailable {
            installed: installed.unwrap_or("unknown").to_string(),
            latest,
        },
    }
}

pub struct Installer {
    client: reqwest::Client,
    metadata: MetadataStore,
    data_dir: PathBuf,
}

impl Installer {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let metadata = MetadataStore::new(paths::metadata_path(&data_dir));
        Ok(Self {
            client: version::discovery_client()?,
            metadata,
            data_dir,
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::new(paths::local_data_dir()?)
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Compares installed version against the latest release tag.
    pub async fn check(&self) -> Result<UpdateStatus> {
        let metadata = self.metadata.load_or_init().await?;
        let latest = version::latest_version(&self.client).await?;
        Ok(resolve_status(&metadata, latest))
    }

    /// Runs the full install/update workflow. Lines tailed from the install
    /// log are forwarded on the channel while the script runs.
    pub async fn install(&self, lines: mpsc::UnboundedSender<String>) -> Result<Metadata> {
        let latest = version::latest_version(&self.client).await?;
        info!("installing mindcraft-ce {latest}");

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;

        let log_path = paths::install_log_path(&self.data_dir);
        match tokio::fs::remove_file(&log_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("failed to clear {}", log_path.display()))
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let watcher = tokio::spawn(LogWatcher::new(log_path.clone()).watch(lines, cancel_rx));

        let script_result = self.run_script(&latest, &log_path).await;

        // Let the watcher flush whatever the script wrote last.
        let _ = cancel_tx.send(true);
        let _ = watcher.await;

        script_result?;

        // The script writes metadata only after every step succeeded.
        let metadata = self.metadata.load_or_init().await?;
        if metadata.installed {
            info!("installation complete: {:?}", metadata.version);
            Ok(metadata)
        } else {
            Err(InstallError::NotConfirmed.into())
        }
    }

    async fn run_script(&self, latest: &str, log_path: &Path) -> Result<()> {
        let family = OsFamily::current()?;
        let script_path = self.data_dir.join(family.script_file_name());
        tokio::fs::write(&script_path, family.script_body())
            .await
            .with_context(|| format!("failed to write {}", script_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))
                .await
                .context("failed to mark the install script executable")?;
        }

        info!("administrator privileges are required; please approve the prompt");
        let status = elevated_command(family, &script_path, log_path, &self.data_dir, latest)
            .status()
            .await
            .context("failed to launch the elevated shell")?;

        Ok(classify_exit(family, status.code())?)
    }

    /// Deletes the installation tree and clears metadata. Any failure leaves
    /// the previous metadata untouched.
    pub async fn uninstall(&self) -> Result<()> {
        let metadata = self.metadata.load_or_init().await?;
        if !metadata.installed {
            info!("mindcraft-ce is not installed; there is nothing to uninstall");
            return Ok(());
        }

        let install_dir = metadata
            .installation_path
            .clone()
            .ok_or_else(|| anyhow!("metadata has no installation path"))?;
        if !tokio::fs::try_exists(&install_dir).await? {
            return Err(anyhow!(
                "installation path {} does not exist",
                install_dir.display()
            ));
        }

        info!("removing installation directory {}", install_dir.display());
        tokio::fs::remove_dir_all(&install_dir)
            .await
            .with_context(|| format!("failed to remove {}", install_dir.display()))?;

        let cleared = Metadata {
            version: metadata.version,
            installed: false,
            installation_path: None,
        };
        self.metadata.save(&cleared).await?;
        info!("mindcraft-ce has been uninstalled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_resolution() {
        let fresh = Metadata::default();
        assert_eq!(
            resolve_status(&fresh, "v1.3.0".into()),
            UpdateStatus::NotInstalled {
                latest: "v1.3.0".into()
            }
        );

        let installed = Metadata {
            version: Some("v1.3.0".into()),
            installed: true,
            installation_path: Some("/opt/mc".into()),
        };
        assert_eq!(
            resolve_status(&installed, "v1.3.0".into()),
            UpdateStatus::UpToDate {
                version: "v1.3.0".into()
            }
        );
        assert_eq!(
            resolve_status(&installed, "v1.4.0".into()),
            UpdateStatus::UpdateAvailable {
                installed: "v1.3.0".into(),
                latest: "v1.4.0".into()
            }
        );
    }

    #[tokio::test]
    async fn uninstall_removes_tree_and_clears_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().join("mindcraft-ce-install");
        tokio::fs::create_dir_all(install_dir.join("gui_agents"))
            .await
            .unwrap();
        tokio::fs::write(install_dir.join("settings.json"), "{}")
            .await
            .unwrap();

        let installer = Installer::new(dir.path().to_path_buf()).unwrap();
        installer
            .metadata()
            .save(&Metadata {
                version: Some("v1.3.0".into()),
                installed: true,
                installation_path: Some(install_dir.clone()),
            })
            .await
            .unwrap();

        installer.uninstall().await.unwrap();

        assert!(!install_dir.exists());
        let metadata = installer.metadata().load_or_init().await.unwrap();
        assert!(!metadata.installed);
        assert_eq!(metadata.installation_path, None);
        // The last installed version is kept for display.
        assert_eq!(metadata.version.as_deref(), Some("v1.3.0"));
    }

    #[tokio::test]
    async fn failed_uninstall_leaves_metadata_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");

        let installer = Installer::new(dir.path().to_path_buf()).unwrap();
        let before = Metadata {
            version: Some("v1.3.0".into()),
            installed: true,
            installation_path: Some(missing),
        };
        installer.metadata().save(&before).await.unwrap();

        assert!(installer.uninstall().await.is_err());
        let after = installer.metadata().load_or_init().await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn uninstall_without_install_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(dir.path().to_path_buf()).unwrap();
        installer.uninstall().await.unwrap();
        assert!(!installer.metadata().load_or_init().await.unwrap().installed);
    }
}
