//! Filesystem locations: data root, database file, download directories.
//!
//! Every location has an environment override so deployments (containers,
//! NAS mounts) can relocate state without touching configuration files.

use std::path::PathBuf;

/// Root directory for application state (database, provider config, cookie
/// jar). `GRABBIT_DATA_DIR` overrides; defaults to the platform data dir.
#[must_use]
pub fn data_root() -> PathBuf {
    if let Ok(dir) = std::env::var("GRABBIT_DATA_DIR") {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("grabbit")
}

/// Path to the SQLite database file. `DATABASE_PATH` overrides.
#[must_use]
pub fn database_path() -> PathBuf {
    if let Ok(path) = std::env::var("DATABASE_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    data_root().join("grabbit.db")
}

/// Base directory for downloaded artifacts. Media-kind subfolders
/// (`Videos`, `Images`, `Documents`) live under it. `DOWNLOAD_DIR` overrides.
#[must_use]
pub fn download_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DOWNLOAD_DIR") {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    data_root().join("downloads")
}

/// Netscape-format cookie jar handed to the extractor for access-restricted
/// sites, when present.
#[must_use]
pub fn cookies_file() -> Option<PathBuf> {
    let path = data_root().join("cookies.txt");
    path.is_file().then_some(path)
}

/// Chat provider config file (operator-mutable via the control surface).
#[must_use]
pub fn provider_config_path() -> PathBuf {
    data_root().join("provider_config.json")
}
