//! Remote repository configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, MountMap, Provider, RefAllowlist};

/// Identity of a remote cache: one cache exists per (url, cache root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteId {
    url: String,
    cache_root: PathBuf,
}

impl RemoteId {
    /// Creates a remote identity.
    pub fn new(url: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            cache_root: cache_root.into(),
        }
    }

    /// Returns the remote URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the cache root directory.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.url, self.cache_root.display())
    }
}

/// Configuration of one remote repository.
///
/// Immutable once loaded. Two configurations with the same [`RemoteId`]
/// describe the same cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// The Git repository URL (HTTPS, SSH, file or local path).
    url: String,

    /// Git library used to maintain the mirror.
    #[serde(default)]
    provider: Provider,

    /// Ordered allowlist of ref patterns. Empty allows every ref.
    #[serde(default)]
    refs: RefAllowlist,

    /// Directory under which the mirror is stored.
    cache_root: PathBuf,

    /// Ref served for the `base` environment.
    #[serde(default = "default_base")]
    base: String,

    /// Repository subdirectory served as the top of the file tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root: Option<String>,

    /// Virtual prefix under which the remote's files appear.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mountpoint: Option<String>,

    /// Clone timeout duration.
    #[serde(default = "default_clone_timeout", with = "duration_secs")]
    clone_timeout: Duration,

    /// Fetch timeout duration.
    #[serde(default = "default_fetch_timeout", with = "duration_secs")]
    fetch_timeout: Duration,
}

fn default_base() -> String {
    "main".to_string()
}

fn default_clone_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RemoteConfig {
    /// Creates a new builder for RemoteConfig.
    pub fn builder() -> RemoteConfigBuilder {
        RemoteConfigBuilder::default()
    }

    /// Returns the identity of this remote.
    pub fn id(&self) -> RemoteId {
        RemoteId::new(&self.url, &self.cache_root)
    }

    /// Returns the repository URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the provider.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Returns the ref allowlist.
    pub fn refs(&self) -> &RefAllowlist {
        &self.refs
    }

    /// Returns the cache root directory.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Returns the ref served for the `base` environment.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the repository root, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Returns the mountpoint, if any.
    pub fn mountpoint(&self) -> Option<&str> {
        self.mountpoint.as_deref()
    }

    /// Returns the clone timeout.
    pub fn clone_timeout(&self) -> Duration {
        self.clone_timeout
    }

    /// Returns the fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Maps an environment name to the ref pattern it selects.
    pub fn env_ref<'a>(&'a self, env: &'a str) -> &'a str {
        if env == "base" { &self.base } else { env }
    }

    /// Builds the path mapping for this remote.
    pub fn mount_map(&self) -> Result<MountMap, ConfigError> {
        MountMap::new(self.mountpoint.as_deref(), self.root.as_deref())
    }

    /// Checks the configuration for values the cache cannot work with.
    ///
    /// Deserialized configurations bypass the builder, so loaders call this
    /// before handing them to the cache.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("url"));
        }
        if self.url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigError::invalid("url", "must not contain whitespace"));
        }
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("cache_root"));
        }
        if self.base.trim().is_empty() {
            return Err(ConfigError::invalid("base", "must not be empty"));
        }
        if self.clone_timeout.is_zero() {
            return Err(ConfigError::invalid("clone_timeout", "must be positive"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::invalid("fetch_timeout", "must be positive"));
        }
        self.mount_map()?;
        Ok(())
    }
}

/// Builder for RemoteConfig.
#[derive(Debug, Default)]
pub struct RemoteConfigBuilder {
    url: Option<String>,
    provider: Provider,
    refs: Vec<String>,
    cache_root: Option<PathBuf>,
    base: Option<String>,
    root: Option<String>,
    mountpoint: Option<String>,
    clone_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl RemoteConfigBuilder {
    /// Sets the repository URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the provider.
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Adds a ref allowlist pattern.
    pub fn allow_ref(mut self, pattern: impl Into<String>) -> Self {
        self.refs.push(pattern.into());
        self
    }

    /// Sets the ref allowlist.
    pub fn refs(mut self, patterns: Vec<impl Into<String>>) -> Self {
        self.refs = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cache root directory.
    pub fn cache_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(path.into());
        self
    }

    /// Sets the ref served for the `base` environment.
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the repository root.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the mountpoint.
    pub fn mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    /// Sets the clone timeout.
    pub fn clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = Some(timeout);
        self
    }

    /// Sets the fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or a pattern or path
    /// is invalid.
    pub fn build(self) -> Result<RemoteConfig, ConfigError> {
        let url = self.url.ok_or(ConfigError::MissingField("url"))?;
        let cache_root = self
            .cache_root
            .ok_or(ConfigError::MissingField("cache_root"))?;

        let config = RemoteConfig {
            url,
            provider: self.provider,
            refs: RefAllowlist::new(self.refs)?,
            cache_root,
            base: self.base.unwrap_or_else(default_base),
            root: self.root,
            mountpoint: self.mountpoint,
            clone_timeout: self.clone_timeout.unwrap_or_else(default_clone_timeout),
            fetch_timeout: self.fetch_timeout.unwrap_or_else(default_fetch_timeout),
        };
        config.validate()?;

        Ok(config)
    }
}

mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
