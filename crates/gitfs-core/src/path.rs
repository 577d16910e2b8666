//! Repository-relative path handling.

use crate::ConfigError;

/// Normalizes a request path into a repository-relative path.
///
/// Leading and repeated separators and `.` components are dropped. Returns
/// `None` for empty paths and for any path containing `..`.
///
/// # Example
///
/// ```
/// use gitfs_core::normalize_path;
///
/// assert_eq!(normalize_path("/top.sls").as_deref(), Some("top.sls"));
/// assert_eq!(normalize_path("a/./b//c").as_deref(), Some("a/b/c"));
/// assert_eq!(normalize_path("../etc/passwd"), None);
/// ```
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts = Vec::new();

    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => return None,
            other if other.chars().any(char::is_control) => return None,
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Maps virtual request paths onto repository paths.
///
/// The `mountpoint` is a virtual prefix the remote's files appear under;
/// the `root` is the repository subdirectory served as the top of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountMap {
    mountpoint: Option<String>,
    root: Option<String>,
}

impl MountMap {
    /// Creates a mapping, validating both prefixes.
    pub fn new(mountpoint: Option<&str>, root: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            mountpoint: normalize_prefix("mountpoint", mountpoint)?,
            root: normalize_prefix("root", root)?,
        })
    }

    /// Returns the normalized mountpoint.
    pub fn mountpoint(&self) -> Option<&str> {
        self.mountpoint.as_deref()
    }

    /// Returns the normalized repository root.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Translates a request path to the path inside the repository.
    ///
    /// Returns `None` when the path is invalid or lies outside the mountpoint.
    pub fn to_repo_path(&self, request: &str) -> Option<String> {
        let path = normalize_path(request)?;

        let relative = match &self.mountpoint {
            Some(mount) => {
                let rest = path.strip_prefix(mount.as_str())?;
                let rest = rest.strip_prefix('/')?;
                rest.to_string()
            },
            None => path,
        };

        Some(match &self.root {
            Some(root) => format!("{}/{}", root, relative),
            None => relative,
        })
    }
}

fn normalize_prefix(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<String>, ConfigError> {
    match value.map(str::trim) {
        None | Some("") | Some("/") => Ok(None),
        Some(raw) => normalize_path(raw)
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(field, format!("'{}' is not a valid path", raw))),
    }
}
