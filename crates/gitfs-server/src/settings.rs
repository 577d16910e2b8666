//! Server settings.
//!
//! Settings come from a TOML file (`gitfs.toml`, or the path in
//! `GITFS_CONFIG`) layered with `GITFS__*` environment variables, so
//! `GITFS__SERVER__PORT=9000` overrides `[server] port`.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8890
//!
//! [refresh]
//! interval_secs = 60
//!
//! [[remotes]]
//! url = "https://github.com/org/salt-states.git"
//! cache_root = "/var/cache/gitfs"
//! refs = ["main", "release-*"]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use gitfs_git::RefreshConfig;
use gitfs_git::gitfs_core::RemoteConfig;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the settings file.
pub const CONFIG_PATH_VAR: &str = "GITFS_CONFIG";

/// Settings file used when [`CONFIG_PATH_VAR`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "gitfs.toml";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("invalid refresh settings: {0}")]
    InvalidRefresh(&'static str),
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8890,
        }
    }
}

/// Background refresh settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_secs: u64,
    pub max_failures: u32,
    pub backoff_multiplier: f64,
    pub max_backoff_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        let defaults = RefreshConfig::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            max_failures: defaults.max_failures,
            backoff_multiplier: defaults.backoff_multiplier,
            max_backoff_secs: defaults.max_backoff.as_secs(),
        }
    }
}

/// Complete server settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub refresh: RefreshSettings,
    pub remotes: Vec<RemoteConfig>,
}

impl Settings {
    /// Loads settings from `GITFS_CONFIG`, or from `gitfs.toml` if present.
    pub fn load() -> Result<Self, SettingsError> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::build(Path::new(&path), true),
            Err(_) => Self::build(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Loads settings from an explicit file, which must exist.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        Self::build(&path.into(), true)
    }

    fn build(path: &Path, required: bool) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("GITFS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Returns the socket address to listen on.
    pub fn addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = format!("{}:{}", self.server.host, self.server.port);
        raw.parse().map_err(|_| SettingsError::InvalidAddress(raw))
    }

    /// Converts the refresh section into scheduler settings.
    pub fn refresh_config(&self) -> Result<RefreshConfig, SettingsError> {
        let refresh = &self.refresh;
        if refresh.interval_secs == 0 {
            return Err(SettingsError::InvalidRefresh("interval_secs must be positive"));
        }
        if refresh.max_failures == 0 {
            return Err(SettingsError::InvalidRefresh("max_failures must be positive"));
        }
        if refresh.backoff_multiplier.is_nan() || refresh.backoff_multiplier < 1.0 {
            return Err(SettingsError::InvalidRefresh("backoff_multiplier must be at least 1"));
        }
        if refresh.max_backoff_secs < refresh.interval_secs {
            return Err(SettingsError::InvalidRefresh(
                "max_backoff_secs must not be below interval_secs",
            ));
        }

        Ok(RefreshConfig {
            interval: Duration::from_secs(refresh.interval_secs),
            max_failures: refresh.max_failures,
            backoff_multiplier: refresh.backoff_multiplier,
            max_backoff: Duration::from_secs(refresh.max_backoff_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use gitfs_git::gitfs_core::Provider;
    use tempfile::NamedTempFile;

    use super::*;

    fn toml(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.addr().unwrap().to_string(), "0.0.0.0:8890");
        assert!(settings.remotes.is_empty());

        let refresh = settings.refresh_config().unwrap();
        assert_eq!(refresh, RefreshConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = toml(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [refresh]
            interval_secs = 30
            max_failures = 5

            [[remotes]]
            url = "https://git.example.com/states.git"
            cache_root = "/var/cache/gitfs"
            refs = ["main", "release-*"]
            base = "production"

            [[remotes]]
            url = "https://git.example.com/formulas.git"
            provider = "git2"
            cache_root = "/var/cache/gitfs"
            mountpoint = "formulas"
            fetch_timeout = 10
            "#,
        );

        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.addr().unwrap().to_string(), "127.0.0.1:9000");
        let refresh = settings.refresh_config().unwrap();
        assert_eq!(refresh.interval, Duration::from_secs(30));
        assert_eq!(refresh.max_failures, 5);
        assert_eq!(refresh.max_backoff, Duration::from_secs(600));

        assert_eq!(settings.remotes.len(), 2);
        let states = &settings.remotes[0];
        assert_eq!(states.base(), "production");
        assert_eq!(states.refs().patterns().len(), 2);
        assert_eq!(states.provider(), Provider::Gix);

        let formulas = &settings.remotes[1];
        assert_eq!(formulas.provider(), Provider::Git2);
        assert_eq!(formulas.mountpoint(), Some("formulas"));
        assert_eq!(formulas.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_required_file() {
        let result = Settings::load_from("/nonexistent/gitfs.toml");
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }

    #[test]
    fn test_invalid_address() {
        let mut settings = Settings::default();
        settings.server.host = "not an address".to_string();
        assert!(matches!(settings.addr(), Err(SettingsError::InvalidAddress(_))));
    }

    #[test]
    fn test_invalid_refresh() {
        let mut settings = Settings::default();
        settings.refresh.backoff_multiplier = 0.5;
        assert!(settings.refresh_config().is_err());

        let mut settings = Settings::default();
        settings.refresh.interval_secs = 0;
        assert!(settings.refresh_config().is_err());
    }
}
