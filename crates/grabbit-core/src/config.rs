//! Configuration: chat provider credentials and runtime tunables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// Chat provider credentials and target channel.
///
/// Loaded from the JSON config file in the data root when present; environment
/// variables (`PROVIDER_APP_ID`, `PROVIDER_APP_HASH`, `TARGET_CHANNEL_ID`)
/// provide the fallback. All three are required before the chat intake can
/// start; the rest of the system runs without them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub provider_app_id: i64,
    #[serde(default)]
    pub provider_app_hash: String,
    #[serde(default)]
    pub target_channel_id: i64,
}

impl ChatConfig {
    /// Load from file with env fallbacks. File values win where present.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let mut config = Self::from_env();

        if let Ok(raw) = std::fs::read_to_string(path) {
            match serde_json::from_str::<Self>(&raw) {
                Ok(file) => {
                    if file.provider_app_id != 0 {
                        config.provider_app_id = file.provider_app_id;
                    }
                    if !file.provider_app_hash.is_empty() {
                        config.provider_app_hash = file.provider_app_hash;
                    }
                    if file.target_channel_id != 0 {
                        config.target_channel_id = file.target_channel_id;
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed provider config file");
                }
            }
        }

        config
    }

    fn from_env() -> Self {
        fn env_i64(key: &str) -> i64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0)
        }

        Self {
            provider_app_id: env_i64("PROVIDER_APP_ID"),
            provider_app_hash: std::env::var("PROVIDER_APP_HASH").unwrap_or_default(),
            target_channel_id: env_i64("TARGET_CHANNEL_ID"),
        }
    }

    /// Persist to the config file (pretty-printed for hand edits).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).expect("config serializes");
        std::fs::write(path, json)
    }

    /// Whether all three values are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.provider_app_id != 0
            && !self.provider_app_hash.is_empty()
            && self.target_channel_id != 0
    }

    /// Operator-facing view with the hash masked.
    #[must_use]
    pub fn masked(&self) -> ChatConfigView {
        let masked_hash = if self.provider_app_hash.is_empty() {
            String::new()
        } else {
            let prefix: String = self.provider_app_hash.chars().take(8).collect();
            format!("{prefix}...")
        };
        ChatConfigView {
            provider_app_id: self.provider_app_id,
            provider_app_hash: masked_hash,
            target_channel_id: self.target_channel_id,
            configured: self.is_complete(),
        }
    }
}

/// API response shape for the provider config; never leaks the full hash.
#[derive(Clone, Debug, Serialize)]
pub struct ChatConfigView {
    pub provider_app_id: i64,
    pub provider_app_hash: String,
    pub target_channel_id: i64,
    pub configured: bool,
}

/// Runtime configuration assembled at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// HTTP bind host.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Base download directory (media-kind subfolders live under it).
    pub download_dir: PathBuf,
    /// Max attempts for a chat download.
    pub max_retries: u32,
    /// Chat provider config file location.
    pub provider_config_path: PathBuf,
}

impl AppConfig {
    /// Build from the environment with the usual defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let port = std::env::var("WEB_PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(4444);
        let max_retries = std::env::var("MAX_RETRIES")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(6);

        Self {
            host: std::env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            download_dir: paths::download_dir(),
            max_retries,
            provider_config_path: paths::provider_config_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_config_is_flagged() {
        let config = ChatConfig {
            provider_app_id: 12345,
            provider_app_hash: String::new(),
            target_channel_id: -100_123,
        };
        assert!(!config.is_complete());

        let config = ChatConfig {
            provider_app_id: 12345,
            provider_app_hash: "abcdef0123456789".into(),
            target_channel_id: -100_123,
        };
        assert!(config.is_complete());
    }

    #[test]
    fn masked_view_hides_the_hash() {
        let config = ChatConfig {
            provider_app_id: 1,
            provider_app_hash: "abcdef0123456789".into(),
            target_channel_id: 2,
        };
        let view = config.masked();
        assert_eq!(view.provider_app_hash, "abcdef01...");
        assert!(view.configured);
    }

    #[test]
    fn file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("provider_config.json");
        let config = ChatConfig {
            provider_app_id: 42,
            provider_app_hash: "hash".into(),
            target_channel_id: -1001,
        };
        config.save(&path).unwrap();

        let loaded = ChatConfig::load(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("provider_config.json");
        std::fs::write(&path, "{not json").unwrap();

        // Falls back to env (zero/empty in tests)
        let loaded = ChatConfig::load(&path);
        assert!(!loaded.is_complete());
    }
}
