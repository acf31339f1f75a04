use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Directory name used for the launcher's local data on every platform.
pub const APP_DIR_NAME: &str = "mindcraft-ce";

/// Directory created by the provisioning script inside the local data folder.
pub const INSTALL_DIR_NAME: &str = "mindcraft-ce-install";

/// Resolves the launcher's local data directory.
///
/// This is where metadata.json, install.log and the generated provisioning
/// script live. The installation itself is a subdirectory of it.
pub fn local_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| anyhow!("APPDATA environment variable not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME))
    }

    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
        Ok(home
            .join("Library")
            .join("Application Support")
            .join(APP_DIR_NAME))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
        Ok(home.join(".config").join(APP_DIR_NAME))
    }
}

pub fn metadata_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("metadata.json")
}

pub fn install_log_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("install.log")
}

pub fn default_install_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(INSTALL_DIR_NAME)
}
