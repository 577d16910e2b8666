//! Ref name patterns and allowlists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const GLOB_META: &[char] = &['*', '?', '['];

/// A pattern matched against short ref names (`main`, `release-1.2`, `v1`).
///
/// Patterns containing `*`, `?` or `[` are compiled as globs; everything
/// else matches by equality.
///
/// # Example
///
/// ```
/// use gitfs_core::RefPattern;
///
/// let pattern = RefPattern::new("release-*").unwrap();
/// assert!(pattern.matches("release-2024.1"));
/// assert!(!pattern.matches("main"));
/// ```
#[derive(Clone)]
pub struct RefPattern {
    raw: String,
    glob: Option<glob::Pattern>,
}

impl RefPattern {
    /// Compiles a pattern, rejecting malformed globs.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        let raw = raw.trim().to_string();

        if raw.is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: raw,
                reason: "pattern cannot be empty".to_string(),
            });
        }

        let glob = if raw.contains(GLOB_META) {
            let compiled = glob::Pattern::new(&raw).map_err(|e| ConfigError::InvalidPattern {
                pattern: raw.clone(),
                reason: e.msg.to_string(),
            })?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self { raw, glob })
    }

    /// Compiles a pattern, treating a malformed glob as a literal name.
    ///
    /// Used for caller-supplied environment names, where a bad pattern is
    /// simply a name that matches nothing.
    pub fn lenient(raw: &str) -> Self {
        Self::new(raw).unwrap_or_else(|_| Self {
            raw: raw.to_string(),
            glob: None,
        })
    }

    /// Returns the pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the pattern contains glob metacharacters.
    pub fn is_glob(&self) -> bool {
        self.glob.is_some()
    }

    /// Tests a short ref name against the pattern.
    pub fn matches(&self, name: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.matches(name),
            None => self.raw == name,
        }
    }
}

impl PartialEq for RefPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for RefPattern {}

impl fmt::Debug for RefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefPattern").field(&self.raw).finish()
    }
}

impl fmt::Display for RefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered set of patterns restricting which refs a remote exposes.
///
/// An empty allowlist permits every branch and tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct RefAllowlist {
    patterns: Vec<RefPattern>,
}

impl RefAllowlist {
    /// Compiles an allowlist from raw pattern strings.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns
            .into_iter()
            .map(RefPattern::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns the compiled patterns in configuration order.
    pub fn patterns(&self) -> &[RefPattern] {
        &self.patterns
    }

    /// Returns true if no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if the short ref name may be served.
    pub fn permits(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(name))
    }
}

impl TryFrom<Vec<String>> for RefAllowlist {
    type Error = ConfigError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RefAllowlist> for Vec<String> {
    fn from(value: RefAllowlist) -> Self {
        value.patterns.into_iter().map(|p| p.raw).collect()
    }
}
