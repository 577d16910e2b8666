mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeBinding;
use gitfs_core::RemoteConfig;
use gitfs_git::{GitFsError, RefreshConfig};

const A: &str = "https://git.example.com/a.git";
const B: &str = "https://git.example.com/b.git";
const C: &str = "https://git.example.com/c.git";

fn seeded(urls: &[&str]) -> Arc<FakeBinding> {
    let binding = FakeBinding::new();
    for url in urls {
        binding.commit(url, "refs/heads/main", &[("top.sls", url)], 100);
    }
    binding
}

#[tokio::test]
async fn test_load_clones_every_remote() {
    let binding = seeded(&[A, B]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    let report = registry
        .load(vec![common::remote(A, &root), common::remote(B, &root)])
        .await
        .unwrap();

    assert_eq!(report.added.len(), 2);
    assert!(report.reused.is_empty());
    assert!(report.disabled.is_empty());
    assert_eq!(registry.len(), 2);
    assert!(registry.active_caches().iter().all(|c| c.is_ready()));
    assert_eq!(binding.clone_count(), 2);
}

#[tokio::test]
async fn test_duplicate_remotes_share_one_cache() {
    let binding = seeded(&[A]);
    binding.commit(A, "refs/heads/dev", &[("top.sls", "dev")], 100);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    let second = RemoteConfig::builder()
        .url(A)
        .cache_root(&root)
        .base("dev")
        .build()
        .unwrap();
    registry
        .load(vec![common::remote(A, &root), common::remote(A, &root), second])
        .await
        .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(binding.clone_count(), 1);

    // The first entry's settings win.
    let cache = &registry.active_caches()[0];
    assert_eq!(cache.config().base(), "main");
}

#[tokio::test]
async fn test_same_url_different_roots_are_separate() {
    let binding = seeded(&[A]);
    let (_first, root_a) = common::cache_dir();
    let (_second, root_b) = common::cache_dir();
    let registry = common::registry(&binding);

    registry
        .load(vec![common::remote(A, &root_a), common::remote(A, &root_b)])
        .await
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(binding.clone_count(), 2);
}

#[tokio::test]
async fn test_reload_reuses_unchanged_caches() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    registry.load(vec![common::remote(A, &root)]).await.unwrap();
    let before = registry.get(&common::remote(A, &root).id()).unwrap();

    let report = registry.load(vec![common::remote(A, &root)]).await.unwrap();
    let after = registry.get(&common::remote(A, &root).id()).unwrap();

    assert_eq!(report.reused, vec![common::remote(A, &root).id()]);
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(binding.clone_count(), 1);
}

#[tokio::test]
async fn test_changed_settings_keep_the_mirror() {
    let binding = seeded(&[A]);
    binding.commit(A, "refs/heads/dev", &[("top.sls", "dev")], 100);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    registry.load(vec![common::remote(A, &root)]).await.unwrap();
    let before = registry.get(&common::remote(A, &root).id()).unwrap();
    let generation = before.snapshot().unwrap().generation();

    let changed = RemoteConfig::builder()
        .url(A)
        .cache_root(&root)
        .base("dev")
        .build()
        .unwrap();
    let report = registry.load(vec![changed.clone()]).await.unwrap();
    let after = registry.get(&changed.id()).unwrap();

    assert_eq!(report.reused.len(), 1);
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.snapshot().unwrap().generation(), generation);
    assert_eq!(binding.clone_count(), 1);

    let file = after.lookup("base", "top.sls").await.unwrap().unwrap();
    assert_eq!(file.content, b"dev");
}

#[tokio::test]
async fn test_removed_remote_is_retired() {
    let binding = seeded(&[A, B]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    registry
        .load(vec![common::remote(A, &root), common::remote(B, &root)])
        .await
        .unwrap();
    let removed_id = common::remote(B, &root).id();
    let removed_dir = registry
        .get(&removed_id)
        .and_then(|c| c.snapshot())
        .map(|s| s.handle().git_dir().to_path_buf())
        .unwrap();
    assert!(removed_dir.exists());

    let report = registry.load(vec![common::remote(A, &root)]).await.unwrap();

    assert_eq!(report.removed, vec![removed_id.clone()]);
    assert!(registry.get(&removed_id).is_none());
    assert!(!removed_dir.exists());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_readded_remote_survives_reader_of_retired_mirror() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);
    let id = common::remote(A, &root).id();

    registry.load(vec![common::remote(A, &root)]).await.unwrap();
    let reader = registry.get(&id).and_then(|c| c.snapshot()).unwrap();
    let git_dir = reader.handle().git_dir().to_path_buf();

    registry.load(Vec::new()).await.unwrap();
    let report = registry.load(vec![common::remote(A, &root)]).await.unwrap();
    assert_eq!(report.added, vec![id.clone()]);

    drop(reader);
    assert!(git_dir.exists());
    assert_eq!(binding.clone_count(), 1);

    let cache = registry.get(&id).unwrap();
    let file = cache.lookup("main", "top.sls").await.unwrap().unwrap();
    assert_eq!(file.content, A.as_bytes());

    // Once revived, removing the remote again deletes the directory.
    registry.load(Vec::new()).await.unwrap();
    assert!(!git_dir.exists());
}

#[tokio::test]
async fn test_readded_remote_after_readers_drained_clones_again() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);
    let id = common::remote(A, &root).id();

    registry.load(vec![common::remote(A, &root)]).await.unwrap();
    registry.load(Vec::new()).await.unwrap();
    registry.load(vec![common::remote(A, &root)]).await.unwrap();

    assert_eq!(binding.clone_count(), 2);
    let cache = registry.get(&id).unwrap();
    let file = cache.lookup("main", "top.sls").await.unwrap().unwrap();
    assert_eq!(file.content, A.as_bytes());
}

#[tokio::test]
async fn test_invalid_config_aborts_load() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);
    registry.load(vec![common::remote(A, &root)]).await.unwrap();

    let invalid: RemoteConfig = serde_json::from_value(serde_json::json!({
        "url": B,
        "cache_root": root,
        "fetch_timeout": 0
    }))
    .unwrap();

    let err = registry
        .load(vec![common::remote(B, &root), invalid])
        .await
        .unwrap_err();

    assert!(matches!(err, GitFsError::InvalidConfig(_)));
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&common::remote(A, &root).id()).is_some());
    assert_eq!(binding.clone_count(), 1);
}

#[tokio::test]
async fn test_empty_remote_is_disabled_until_reload() {
    let binding = seeded(&[A]);
    binding.empty_remote(B);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    let configs = vec![common::remote(A, &root), common::remote(B, &root)];
    let report = registry.load(configs.clone()).await.unwrap();

    assert_eq!(report.disabled.len(), 1);
    assert_eq!(report.disabled[0].remote, common::remote(B, &root).id());
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.active_caches().len(), 1);
    assert_eq!(registry.disabled().len(), 1);

    binding.commit(B, "refs/heads/main", &[("top.sls", "b")], 100);
    let report = registry.load(configs).await.unwrap();

    assert!(report.disabled.is_empty());
    assert_eq!(registry.active_caches().len(), 2);
    assert!(registry.disabled().is_empty());
}

#[tokio::test]
async fn test_unreachable_remote_stays_active() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);

    // B does not exist upstream yet: transient, so it stays configured.
    let report = registry
        .load(vec![common::remote(A, &root), common::remote(B, &root)])
        .await
        .unwrap();

    assert!(report.disabled.is_empty());
    assert_eq!(registry.active_caches().len(), 2);
    assert!(!registry.get(&common::remote(B, &root).id()).unwrap().is_ready());

    binding.commit(B, "refs/heads/main", &[("top.sls", "b")], 100);
    let refreshed = registry.refresh_all().await;
    assert!(refreshed.is_success());
    assert!(registry.active_caches().iter().all(|c| c.is_ready()));
}

#[tokio::test]
async fn test_refresh_all_isolates_failures() {
    let binding = seeded(&[A, B, C]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);
    registry
        .load(vec![
            common::remote(A, &root),
            common::remote(B, &root),
            common::remote(C, &root),
        ])
        .await
        .unwrap();

    binding.set_unreachable(B, true);
    binding.commit(C, "refs/heads/main", &[("top.sls", "c2")], 200);
    let report = registry.refresh_all().await;

    assert!(!report.is_success());
    assert_eq!(report.refreshed.len(), 2);
    assert_eq!(report.refreshed[0].remote, common::remote(A, &root).id().to_string());
    assert!(!report.refreshed[0].changed);
    assert_eq!(report.refreshed[1].remote, common::remote(C, &root).id().to_string());
    assert!(report.refreshed[1].changed);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].remote, common::remote(B, &root).id().to_string());
    assert!(report.failures[0].transient);

    let health = registry.health();
    assert_eq!(health.len(), 3);
    assert_eq!(health[1].failure_count, 1);
}

#[tokio::test]
async fn test_refresh_due_respects_interval() {
    let binding = seeded(&[A]);
    let (_dir, root) = common::cache_dir();
    let registry = common::registry(&binding);
    registry.load(vec![common::remote(A, &root)]).await.unwrap();

    let slow = RefreshConfig {
        interval: Duration::from_secs(3600),
        ..Default::default()
    };
    assert!(registry.refresh_due(&slow).await.refreshed.is_empty());
    assert_eq!(binding.fetch_count(), 0);

    let eager = RefreshConfig {
        interval: Duration::ZERO,
        ..Default::default()
    };
    assert_eq!(registry.refresh_due(&eager).await.refreshed.len(), 1);
    assert_eq!(binding.fetch_count(), 1);
}
