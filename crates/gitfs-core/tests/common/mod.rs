#![allow(dead_code)]
use gitfs_core::RemoteConfig;

/// Parses a RemoteConfig from a JSON string slice.
/// Panics if the JSON is invalid (intended for tests).
pub fn remote_from_json(json: &str) -> RemoteConfig {
    serde_json::from_str(json).expect("Failed to parse test remote from JSON")
}

/// Returns a remote with every optional field populated.
pub fn full_remote_json() -> &'static str {
    r#"{
        "url": "https://github.com/org/states.git",
        "provider": "git2",
        "refs": ["main", "release-*"],
        "cache_root": "/var/cache/salt",
        "base": "main",
        "root": "salt",
        "mountpoint": "formulas/web",
        "clone_timeout": 60,
        "fetch_timeout": 10
    }"#
}
