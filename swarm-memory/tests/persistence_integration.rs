//! Persistence integration tests: backups, restore, and the state file.
//!
//! Tests verify:
//! - Restore reproduces the entry and partition sets captured by a backup
//! - A corrupted backup is rejected and leaves state untouched
//! - Old backups are pruned past `max_backups`
//! - State written on shutdown is loaded by the next manager

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use swarm_memory::{
    DeleteOptions, ManualClock, MemoryConfig, MemoryError, MemoryManager, MemoryQuery,
    PartitionOptions, RetrieveOptions, StoreOptions, UpdateOptions,
};

fn persistent_config(namespace: &str, dir: &Path) -> MemoryConfig {
    MemoryConfig {
        persistence_path: Some(dir.to_path_buf()),
        cleanup_interval_secs: 0,
        ..MemoryConfig::for_namespace(namespace)
    }
}

async fn start(config: MemoryConfig, clock: &ManualClock) -> Arc<MemoryManager> {
    let manager = MemoryManager::builder(config)
        .clock(clock.clone())
        .build()
        .expect("valid config");
    manager.initialize().await.expect("initialize");
    manager
}

fn keys(manager: &MemoryManager) -> BTreeSet<String> {
    manager
        .query(&MemoryQuery::new())
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect()
}

fn partition_names(manager: &MemoryManager) -> BTreeSet<String> {
    manager
        .list_partitions()
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect()
}

#[tokio::test]
async fn test_restore_reproduces_backup_state() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let manager = start(persistent_config("restore", dir.path()), &clock).await;

    manager.store("a", &json!("alpha"), StoreOptions::new()).unwrap();
    manager.store("b", &json!({"n": 1}), StoreOptions::new()).unwrap();
    let keys_at_backup = keys(&manager);
    let partitions_at_backup = partition_names(&manager);

    let backup_id = manager.create_backup().await.unwrap();
    assert!(backup_id.starts_with("backup-"));

    clock.advance(Duration::from_secs(1));
    manager.delete("a", DeleteOptions::new()).unwrap();
    manager.store("c", &json!("late"), StoreOptions::new()).unwrap();
    manager.update("b", &json!({"n": 2}), UpdateOptions::new()).unwrap();
    manager.create_partition("late", PartitionOptions::default()).unwrap();

    let restored = manager.restore_from_backup(&backup_id).await.unwrap();
    assert_eq!(restored, 2);
    assert_eq!(keys(&manager), keys_at_backup);
    assert_eq!(partition_names(&manager), partitions_at_backup);
    assert_eq!(
        manager.retrieve("b", RetrieveOptions::new()).unwrap(),
        Some(json!({"n": 1}))
    );
    assert!(manager.retrieve("c", RetrieveOptions::new()).unwrap().is_none());

    let listed = manager.list_backups().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, backup_id);
    assert_eq!(listed[0].entry_count, 2);
}

#[tokio::test]
async fn test_corrupted_backup_is_rejected() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let manager = start(persistent_config("corrupt", dir.path()), &clock).await;

    manager.store("a", &json!(1), StoreOptions::new()).unwrap();
    let backup_id = manager.create_backup().await.unwrap();
    manager.store("b", &json!(2), StoreOptions::new()).unwrap();

    // Flip one character of the stored checksum
    let path = dir.path().join("backups").join(format!("{}.json", backup_id));
    let mut doc: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let checksum = doc["checksum"].as_str().unwrap().to_string();
    let first = if checksum.starts_with('0') { "1" } else { "0" };
    doc["checksum"] = Value::String(format!("{}{}", first, &checksum[1..]));
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    let before = keys(&manager);
    let err = manager.restore_from_backup(&backup_id).await.unwrap_err();
    match err {
        MemoryError::IntegrityError {
            backup_id: id,
            expected,
            ..
        } => {
            assert_eq!(id, backup_id);
            assert_ne!(expected, checksum);
        }
        other => panic!("expected IntegrityError, got {:?}", other),
    }
    assert_eq!(keys(&manager), before);
    assert_eq!(before.len(), 2);
}

#[tokio::test]
async fn test_unknown_backup_is_not_found() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let manager = start(persistent_config("missing", dir.path()), &clock).await;

    let err = manager.restore_from_backup("backup-nope").await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
    let err = manager.restore_from_backup("../state").await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn test_backups_need_persistence() {
    let clock = ManualClock::starting_now();
    let config = MemoryConfig {
        cleanup_interval_secs: 0,
        ..MemoryConfig::for_namespace("volatile")
    };
    let manager = start(config, &clock).await;

    let err = manager.create_backup().await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidConfig(_)));
    assert!(manager.list_backups().await.unwrap().is_empty());
    manager.sync_now().await.unwrap();
}

#[tokio::test]
async fn test_old_backups_are_pruned() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let config = MemoryConfig {
        max_backups: 2,
        ..persistent_config("prune", dir.path())
    };
    let manager = start(config, &clock).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        manager
            .store(&format!("k{}", i), &json!(i), StoreOptions::new())
            .unwrap();
        ids.push(manager.create_backup().await.unwrap());
        clock.advance(Duration::from_secs(1));
    }

    let listed: Vec<String> = manager
        .list_backups()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(listed, vec![ids[3].clone(), ids[2].clone()]);

    let err = manager.restore_from_backup(&ids[0]).await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
    assert_eq!(manager.restore_from_backup(&ids[2]).await.unwrap(), 3);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();

    let first = start(persistent_config("durable", dir.path()), &clock).await;
    first
        .create_partition("notes", PartitionOptions::default())
        .unwrap();
    first
        .store("plan", &json!(["a", "b"]), StoreOptions::new().partition("notes"))
        .unwrap();
    first.update("plan", &json!(["a", "b", "c"]), UpdateOptions::new()).unwrap();
    first.shutdown().await.unwrap();
    assert!(!first.is_initialized());
    assert!(dir.path().join("state.json").exists());

    let second = start(persistent_config("durable", dir.path()), &clock).await;
    let entry = second
        .retrieve_entry("plan", RetrieveOptions::new().partition("notes"))
        .unwrap()
        .expect("entry reloaded");
    assert_eq!(entry.version, 2);
    assert_eq!(
        second.retrieve("plan", RetrieveOptions::new()).unwrap(),
        Some(json!(["a", "b", "c"]))
    );
    assert!(second.get_partition("notes").unwrap().is_some());
    assert_eq!(second.history("plan", None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_state_from_another_namespace_is_refused() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();

    let first = start(persistent_config("ns-a", dir.path()), &clock).await;
    first.store("k", &json!(1), StoreOptions::new()).unwrap();
    first.sync_now().await.unwrap();

    let second = MemoryManager::builder(persistent_config("ns-b", dir.path()))
        .clock(clock.clone())
        .build()
        .unwrap();
    let err = second.initialize().await.unwrap_err();
    assert!(matches!(err, MemoryError::InvalidConfig(_)));
    assert!(!second.is_initialized());
}

#[tokio::test]
async fn test_export_formats() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let manager = start(persistent_config("export", dir.path()), &clock).await;

    manager
        .store(
            "report, final",
            &json!({"ok": true}),
            StoreOptions::new().tags(vec!["x", "y"]).owner("agent-a"),
        )
        .unwrap();
    manager
        .store("gone", &json!(0), StoreOptions::new().ttl(Duration::from_millis(10)))
        .unwrap();
    clock.advance(Duration::from_millis(20));

    let json_export: Value =
        serde_json::from_str(&manager.export_memory(swarm_memory::ExportFormat::Json).unwrap())
            .unwrap();
    assert_eq!(json_export["namespace"], "export");
    assert_eq!(json_export["entries"].as_array().unwrap().len(), 1);
    assert_eq!(json_export["statistics"]["total_entries"], 1);

    let csv = manager
        .export_memory("csv".parse().unwrap())
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,key,type,access_level,created_at,updated_at,owner,tags");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("\"report, final\""));
    assert!(lines[1].contains("x;y"));
    assert!(lines[1].contains("agent-a"));
}
