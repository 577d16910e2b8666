//! Git provider selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// The Git library used to maintain a mirror.
///
/// Both providers expose the same semantics; the choice only affects which
/// library performs clone, fetch and object reads.
///
/// # Example
///
/// ```
/// use gitfs_core::Provider;
///
/// let provider: Provider = "git2".parse().unwrap();
/// assert_eq!(provider, Provider::Git2);
/// assert_eq!(Provider::default().as_str(), "gix");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Pure Rust implementation (gitoxide).
    #[default]
    Gix,
    /// libgit2 bindings.
    Git2,
}

impl Provider {
    /// All supported providers.
    pub const ALL: [Provider; 2] = [Provider::Gix, Provider::Git2];

    /// Returns the configuration name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gix => "gix",
            Self::Git2 => "git2",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gix" | "gitoxide" => Ok(Self::Gix),
            "git2" | "libgit2" => Ok(Self::Git2),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}
