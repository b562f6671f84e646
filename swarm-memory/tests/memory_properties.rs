//! Property tests for the memory manager's core guarantees, exercised over
//! varied inputs.
//!
//! Tests verify:
//! - Stored values round-trip unchanged
//! - Versions grow by one per update and history is capped at ten
//! - Version history never counts against the per-entry size limit
//! - Concurrent updates to one key are serialized
//! - Implicit partitions have no entry count cap
//! - Expired entries disappear from reads and statistics
//! - Deleting a partition deletes its entries
//! - Shared copies are independent of their source
//! - Admission control keeps the namespace under its byte budget
//! - Queries are deterministic

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use swarm_memory::{
    AccessLevel, DeleteOptions, EntryType, EventBusExt, EventFilter, ManualClock, MemoryConfig,
    MemoryError, MemoryEvent, MemoryManager, MemoryQuery, PartitionOptions, RetrieveOptions,
    ShareOptions, SortField, SortOrder, StoreOptions, UpdateOptions, MAX_PREVIOUS_VERSIONS,
};

/// Config with background loops disabled.
fn quiet_config(namespace: &str) -> MemoryConfig {
    MemoryConfig {
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

// ── Property: round-trip ───────────────────────────────────────────

#[tokio::test]
async fn prop_store_then_retrieve_round_trips() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("roundtrip"), &clock).await;

    let values = [
        json!(null),
        json!(true),
        json!(42),
        json!(-7.5),
        json!("text with ünïcode"),
        json!([1, "two", {"three": 3}]),
        json!({"nested": {"list": [1, 2, 3], "flag": false}, "empty": {}}),
    ];
    for (i, value) in values.iter().enumerate() {
        let key = format!("key-{}", i);
        manager.store(&key, value, StoreOptions::new()).unwrap();
        let got = manager.retrieve(&key, RetrieveOptions::new()).unwrap();
        assert_eq!(got.as_ref(), Some(value), "value #{} did not round-trip", i);
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Plan {
        steps: Vec<String>,
        retries: u32,
    }
    let plan = Plan {
        steps: vec!["fetch".into(), "build".into()],
        retries: 3,
    };
    manager.store("plan", &plan, StoreOptions::new()).unwrap();
    let got: Option<Plan> = manager.retrieve_as("plan", RetrieveOptions::new()).unwrap();
    assert_eq!(got, Some(plan));

    assert_eq!(manager.retrieve("missing", RetrieveOptions::new()).unwrap(), None);
}

// ── Property: version monotonicity ─────────────────────────────────

#[tokio::test]
async fn prop_versions_increase_and_history_is_capped() {
    for updates in [1u64, 3, 10, 11, 25] {
        let clock = ManualClock::starting_now();
        let manager = start(quiet_config("versions"), &clock).await;
        manager.store("k", &json!(0), StoreOptions::new()).unwrap();

        for i in 1..=updates {
            clock.advance(Duration::from_millis(5));
            assert!(manager.update("k", &json!(i), UpdateOptions::new()).unwrap());
        }

        let entry = manager
            .retrieve_entry("k", RetrieveOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(entry.version, updates + 1, "updates={}", updates);

        let history = manager.history("k", None).unwrap();
        let expected_len = (updates as usize).min(MAX_PREVIOUS_VERSIONS);
        assert_eq!(history.len(), expected_len, "updates={}", updates);

        // Chronological, ending with the version just before the current one
        assert!(history.windows(2).all(|w| w[0].version + 1 == w[1].version));
        assert!(history.windows(2).all(|w| w[0].updated_at < w[1].updated_at));
        assert_eq!(history.last().unwrap().version, updates);
        let last_value: Value = serde_json::from_slice(&history.last().unwrap().value).unwrap();
        assert_eq!(last_value, json!(updates - 1));
    }
}

#[tokio::test]
async fn prop_history_does_not_count_toward_entry_limit() {
    let clock = ManualClock::starting_now();
    let config = MemoryConfig {
        max_entry_size: 1024,
        ..quiet_config("ns1")
    };
    let manager = start(config, &clock).await;
    let note = "n".repeat(120);
    manager
        .store("cfg", &json!({"a": 0, "note": note}), StoreOptions::new())
        .unwrap();

    for i in 1..=25 {
        clock.advance(Duration::from_millis(5));
        assert!(
            manager
                .update("cfg", &json!({"a": i, "note": note}), UpdateOptions::new())
                .unwrap(),
            "update {} refused",
            i
        );
    }

    let entry = manager
        .retrieve_entry("cfg", RetrieveOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(entry.version, 26);
    assert_eq!(entry.previous_versions.len(), MAX_PREVIOUS_VERSIONS);
    // The stored entry is over the limit only because of its history
    assert!(entry.serialized_size() > 1024);
    assert!(entry.payload_size() <= 1024);

    // A value that alone exceeds the limit is still refused
    let err = manager
        .update("cfg", &json!({"a": 26, "note": "x".repeat(2048)}), UpdateOptions::new())
        .unwrap_err();
    assert!(matches!(err, MemoryError::SizeExceeded { limit: 1024, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prop_concurrent_updates_are_serialized() {
    let manager = MemoryManager::new(quiet_config("race")).unwrap();
    manager.initialize().await.unwrap();
    manager.store("k", &json!("seed"), StoreOptions::new()).unwrap();

    let writers: Vec<_> = (0..32)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let value = if i % 2 == 0 { "a" } else { "b" };
            tokio::task::spawn_blocking(move || {
                manager.update("k", &json!(value), UpdateOptions::new())
            })
        })
        .collect();

    let mut applied = 0u64;
    for writer in writers {
        if writer.await.unwrap().unwrap() {
            applied += 1;
        }
    }
    assert_eq!(applied, 32);

    let value = manager.retrieve("k", RetrieveOptions::new()).unwrap().unwrap();
    assert!(value == json!("a") || value == json!("b"), "torn value {}", value);

    let entry = manager
        .retrieve_entry("k", RetrieveOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(entry.version, 1 + applied);
    let history = manager.history("k", None).unwrap();
    assert!(history.len() <= MAX_PREVIOUS_VERSIONS);
    assert!(history.windows(2).all(|w| w[0].version + 1 == w[1].version));
    assert_eq!(history.last().unwrap().version, applied);
}

// ── Property: TTL expiration ───────────────────────────────────────

#[tokio::test]
async fn prop_expired_entries_are_invisible() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("ttl"), &clock).await;

    manager
        .store("short", &json!("v"), StoreOptions::new().ttl(Duration::from_millis(100)))
        .unwrap();
    manager.store("long", &json!("v"), StoreOptions::new()).unwrap();

    let stats = manager.get_statistics().unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.expiring_within_24h, 1);

    clock.advance(Duration::from_millis(150));

    assert_eq!(manager.get_statistics().unwrap().total_entries, 1);
    assert!(manager.retrieve("short", RetrieveOptions::new()).unwrap().is_none());
    assert!(manager.query(&MemoryQuery::new().key("short")).unwrap().is_empty());
    assert!(manager.retrieve("long", RetrieveOptions::new()).unwrap().is_some());
}

#[tokio::test]
async fn prop_cleanup_sweep_removes_expired() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("sweep"), &clock).await;

    for i in 0..5 {
        let ttl = Duration::from_millis(100 * (i + 1));
        manager
            .store(&format!("k{}", i), &json!(i), StoreOptions::new().ttl(ttl))
            .unwrap();
    }

    clock.advance(Duration::from_millis(250));
    assert_eq!(manager.cleanup_expired().unwrap(), 2);
    assert_eq!(manager.cleanup_expired().unwrap(), 0);

    clock.advance(Duration::from_secs(1));
    assert_eq!(manager.cleanup_expired().unwrap(), 3);
    let default = manager.get_partition("default").unwrap().unwrap();
    assert!(default.entries.is_empty());
}

// ── Property: partition cascade ────────────────────────────────────

#[tokio::test]
async fn prop_partition_delete_cascades() {
    for count in [1usize, 4, 16] {
        let clock = ManualClock::starting_now();
        let manager = start(quiet_config("cascade"), &clock).await;
        manager.create_partition("p", PartitionOptions::default()).unwrap();

        for i in 0..count {
            manager
                .store(&format!("k{}", i), &json!(i), StoreOptions::new().partition("p"))
                .unwrap();
        }
        manager.store("outside", &json!(0), StoreOptions::new()).unwrap();

        let err = manager.delete_partition("p", false).unwrap_err();
        assert!(matches!(err, MemoryError::NotEmpty { entries, .. } if entries == count));

        assert_eq!(manager.delete_partition("p", true).unwrap(), count);
        for i in 0..count {
            let key = format!("k{}", i);
            assert!(manager
                .retrieve(&key, RetrieveOptions::new().partition("p"))
                .unwrap()
                .is_none());
            assert!(manager.retrieve(&key, RetrieveOptions::new()).unwrap().is_none());
        }
        assert_eq!(manager.get_statistics().unwrap().total_entries, 1);
        assert!(manager.get_partition("p").unwrap().is_none());
        assert!(manager.search(&swarm_memory::MemorySearchOptions::new("k0")).unwrap().is_empty());
    }
}

// ── Property: sharing independence ─────────────────────────────────

#[tokio::test]
async fn prop_shared_copies_are_independent() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("sharing"), &clock).await;

    let source_id = manager
        .store("finding", &json!({"bug": 17}), StoreOptions::new().owner("agent-a"))
        .unwrap();
    let copy_id = manager
        .share_memory("finding", "agent-b", ShareOptions::new())
        .unwrap();
    assert_ne!(copy_id, source_id);

    let shared = manager
        .query(&MemoryQuery::new().partition("shared_agent-b"))
        .unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].id, copy_id);
    assert_eq!(shared[0].owner.as_deref(), Some("agent-b"));
    assert!(shared[0].references.contains(&source_id));
    assert_eq!(shared[0].version, 1);
    assert!(manager.get_partition("shared_agent-b").unwrap().unwrap().shared);

    assert!(manager
        .delete("finding", DeleteOptions::new().partition("default"))
        .unwrap());
    let copy = manager
        .retrieve("finding", RetrieveOptions::new().partition("shared_agent-b"))
        .unwrap();
    assert_eq!(copy, Some(json!({"bug": 17})));

    let err = manager
        .share_memory("nothing", "agent-b", ShareOptions::new())
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn prop_broadcast_continues_past_failures() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("broadcast"), &clock).await;
    manager
        .store("note", &json!("hi"), StoreOptions::new().access_level(AccessLevel::Swarm))
        .unwrap();

    // A read-only share partition makes one target fail
    manager
        .create_partition(
            "shared_blocked",
            PartitionOptions {
                read_only: true,
                ..PartitionOptions::default()
            },
        )
        .unwrap();

    let mut events = manager
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["memory_broadcasted"]));
    let ids = manager
        .broadcast_memory("note", &["a", "blocked", "c"], ShareOptions::new())
        .unwrap();
    assert_eq!(ids.len(), 2);

    match events.try_recv().unwrap() {
        MemoryEvent::MemoryBroadcasted { entry_ids, targets, .. } => {
            assert_eq!(entry_ids, ids);
            assert_eq!(targets, vec!["a".to_string(), "c".to_string()]);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let none = manager
        .broadcast_memory("missing", &["a", "c"], ShareOptions::new())
        .unwrap();
    assert!(none.is_empty());
}

// ── Property: admission control ────────────────────────────────────

#[tokio::test]
async fn prop_admission_control_bounds_memory() {
    for (budget, payload_len) in [(8 * 1024u64, 200usize), (16 * 1024, 400), (4 * 1024, 50)] {
        let clock = ManualClock::starting_now();
        let config = MemoryConfig {
            max_memory_size: budget,
            max_entry_size: 1024,
            ..quiet_config("admission")
        };
        let manager = start(config, &clock).await;

        manager
            .store(
                "pinned",
                &json!("system"),
                StoreOptions::new().access_level(AccessLevel::System),
            )
            .unwrap();

        let payload = "x".repeat(payload_len);
        for i in 0..100 {
            clock.advance(Duration::from_millis(1));
            manager
                .store(&format!("k{}", i), &payload, StoreOptions::new())
                .unwrap();
            let stats = manager.get_statistics().unwrap();
            assert!(
                stats.total_size <= budget,
                "budget={} payload={} i={}: total {} over budget",
                budget,
                payload_len,
                i,
                stats.total_size
            );
        }

        // Oldest non-system entries went first; the system entry stayed
        assert!(manager.retrieve("pinned", RetrieveOptions::new()).unwrap().is_some());
        assert!(manager.retrieve("k0", RetrieveOptions::new()).unwrap().is_none());
        assert!(manager.retrieve("k99", RetrieveOptions::new()).unwrap().is_some());
    }
}

#[tokio::test]
async fn prop_admission_control_reports_memory_full() {
    let clock = ManualClock::starting_now();
    let config = MemoryConfig {
        max_memory_size: 4 * 1024,
        max_entry_size: 1024,
        ..quiet_config("full")
    };
    let manager = start(config, &clock).await;

    let payload = "s".repeat(200);
    let mut stored = 0;
    let err = loop {
        match manager.store(
            &format!("sys{}", stored),
            &payload,
            StoreOptions::new().access_level(AccessLevel::System),
        ) {
            Ok(_) => stored += 1,
            Err(e) => break e,
        }
        assert!(stored < 100, "system entries were never refused");
    };

    assert!(matches!(err, MemoryError::MemoryFull { .. }));
    assert!(err.is_retryable());
    assert_eq!(manager.get_statistics().unwrap().total_entries, stored);
}

#[tokio::test]
async fn prop_default_partition_has_no_count_cap() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("bulk"), &clock).await;

    let count = 10_001;
    for i in 0..count {
        manager
            .store(&format!("k{}", i), &json!(i), StoreOptions::new())
            .unwrap();
    }

    let default = manager.get_partition("default").unwrap().unwrap();
    assert_eq!(default.entries.len(), count);
    assert_eq!(default.max_size, usize::MAX);
    assert_eq!(manager.get_statistics().unwrap().total_entries, count);

    // An explicit cap still holds
    manager
        .create_partition(
            "capped",
            PartitionOptions {
                max_size: 2,
                ..PartitionOptions::default()
            },
        )
        .unwrap();
    for key in ["a", "b"] {
        manager
            .store(key, &json!(key), StoreOptions::new().partition("capped"))
            .unwrap();
    }
    let err = manager
        .store("c", &json!("c"), StoreOptions::new().partition("capped"))
        .unwrap_err();
    assert!(matches!(err, MemoryError::PartitionFull { max_size: 2, .. }));
}

// ── Property: deterministic queries ────────────────────────────────

#[tokio::test]
async fn prop_queries_are_deterministic() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("query"), &clock).await;

    let types = [EntryType::Knowledge, EntryType::Results, EntryType::Logs];
    for i in 0..12 {
        clock.advance(Duration::from_millis(10));
        let tag = if i % 2 == 0 { "even" } else { "odd" };
        manager
            .store(
                &format!("item-{:02}", i),
                &json!(i),
                StoreOptions::new()
                    .entry_type(types[i % types.len()])
                    .tags(vec![tag, "all"])
                    .owner(if i < 6 { "a" } else { "b" }),
            )
            .unwrap();
    }

    let query = MemoryQuery::new()
        .tags(vec!["even", "missing"])
        .owner("a")
        .sort(SortField::Key, SortOrder::Descending)
        .page(1, 2);
    let first = manager.query(&query).unwrap();
    let second = manager.query(&query).unwrap();
    assert_eq!(first, second);

    let keys: Vec<_> = first.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["item-02", "item-00"]);

    let results = manager
        .query(&MemoryQuery::new().entry_type(EntryType::Results))
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

// ── Scenario: ns1 ──────────────────────────────────────────────────

#[tokio::test]
async fn scenario_ns1_store_update_retrieve() {
    let clock = ManualClock::starting_now();
    let config = MemoryConfig {
        max_entry_size: 1024,
        ..quiet_config("ns1")
    };
    let manager = start(config, &clock).await;

    let id = manager
        .store(
            "cfg",
            &json!({"a": 1}),
            StoreOptions::new().entry_type(EntryType::Configuration),
        )
        .unwrap();
    assert!(!id.is_empty());
    assert_eq!(
        manager.retrieve("cfg", RetrieveOptions::new()).unwrap(),
        Some(json!({"a": 1}))
    );

    assert!(manager.update("cfg", &json!({"a": 2}), UpdateOptions::new()).unwrap());

    let doc = manager
        .retrieve("cfg", RetrieveOptions::new().with_metadata())
        .unwrap()
        .unwrap();
    assert_eq!(doc["version"], 2);
    assert_eq!(doc["id"], json!(id));
    assert_eq!(doc["type"], "configuration");
    assert_eq!(doc["value"], json!({"a": 2}));
}

// ── Audit trail ────────────────────────────────────────────────────

#[tokio::test]
async fn audit_events_follow_operations() {
    let clock = ManualClock::starting_now();
    let manager = start(quiet_config("audit"), &clock).await;
    let mut events = manager.events().subscribe();

    let id = manager
        .store("k", &json!(1), StoreOptions::new().owner("agent-a"))
        .unwrap();
    manager.retrieve("k", RetrieveOptions::new().requester("agent-b")).unwrap();
    manager
        .update("k", &json!(2), UpdateOptions::new().updater("agent-a"))
        .unwrap();
    manager
        .delete("k", DeleteOptions::new().deleter("agent-c"))
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.entry_id(), Some(id.as_str()));
        seen.push((event.event_type(), event.actor().map(String::from)));
    }
    assert_eq!(
        seen,
        vec![
            ("entry_stored", Some("agent-a".to_string())),
            ("entry_retrieved", Some("agent-b".to_string())),
            ("entry_updated", Some("agent-a".to_string())),
            ("entry_deleted", Some("agent-c".to_string())),
        ]
    );
}
