//! Runtime configuration.
//!
//! Sources, later wins:
//! 1. built-in defaults
//! 2. a TOML file (`AclConfig::load`)
//! 3. environment variables (`AclConfig::apply_env`):
//!    - BANLIST_ENABLED ("true"/"false")
//!    - BANLIST_DATA_DIR
//!    - BANLIST_CACHE_TTL_SECS
//!    - BANLIST_LOCK_TIMEOUT_MS

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Access-control settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// When false, checks never block and never touch storage.
    pub enabled: bool,
    /// Directory holding the four collection documents.
    pub data_dir: PathBuf,
    /// Read cache lifetime; 0 disables the cache.
    pub cache_ttl_secs: u64,
    /// Upper bound on waiting for the state lock.
    pub lock_timeout_ms: u64,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data"),
            cache_ttl_secs: 60,
            lock_timeout_ms: 5_000,
        }
    }
}

impl AclConfig {
    /// Read a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable lookup. Unparseable
    /// values are logged and ignored.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("BANLIST_ENABLED") {
            match v.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.enabled = true,
                "false" | "0" | "no" => self.enabled = false,
                _ => warn!(key = "BANLIST_ENABLED", value = %v, "ignoring invalid value"),
            }
        }
        if let Some(v) = lookup("BANLIST_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BANLIST_CACHE_TTL_SECS") {
            match v.parse() {
                Ok(n) => self.cache_ttl_secs = n,
                Err(_) => warn!(key = "BANLIST_CACHE_TTL_SECS", value = %v, "ignoring invalid value"),
            }
        }
        if let Some(v) = lookup("BANLIST_LOCK_TIMEOUT_MS") {
            match v.parse() {
                Ok(n) => self.lock_timeout_ms = n,
                Err(_) => warn!(key = "BANLIST_LOCK_TIMEOUT_MS", value = %v, "ignoring invalid value"),
            }
        }
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AclConfig::default();
        assert!(config.enabled);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist.toml");
        std::fs::write(&path, "enabled = false\ndata_dir = \"/var/lib/banlist\"\n").unwrap();
        let config = AclConfig::load(&path).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/banlist"));
        assert_eq!(config.cache_ttl_secs, 60);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banlist.toml");
        std::fs::write(&path, "enabled = \"maybe\"").unwrap();
        assert!(matches!(
            AclConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            AclConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BANLIST_ENABLED", "false"),
            ("BANLIST_CACHE_TTL_SECS", "0"),
            ("BANLIST_LOCK_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config =
            AclConfig::default().apply_env_from(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!config.enabled);
        assert_eq!(config.cache_ttl_secs, 0);
        assert_eq!(config.lock_timeout_ms, 5_000);
    }
}
