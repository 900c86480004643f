use std::collections::BTreeSet;

use ledger_core::{CausalLedger, LedgerConfig};
use ledger_types::{catalogue, PayloadMap};

fn config_in(dir: &std::path::Path) -> LedgerConfig {
    LedgerConfig::new(dir.join("events.log"), 4)
}

fn payload(pairs: &[(&str, serde_json::Value)]) -> PayloadMap {
    let mut map = PayloadMap::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

#[tokio::test]
async fn linear_chain_auto_parents_within_a_trace() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let a = ledger
        .ingest_event("T", "SVC", "1.0", "host", "A", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let b = ledger
        .ingest_event("T", "SVC", "1.0", "host", "B", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let c = ledger
        .ingest_event("T", "SVC", "1.0", "host", "C", PayloadMap::new(), vec![])
        .await
        .unwrap();

    let event_b = ledger.get_event(b).await.unwrap().unwrap();
    assert_eq!(&event_b.causal_parent_event_ids[..], &[a]);
    let event_c = ledger.get_event(c).await.unwrap().unwrap();
    assert_eq!(&event_c.causal_parent_event_ids[..], &[b]);

    let order = ledger.get_topological_order().await.unwrap();
    assert_eq!(order, vec![a, b, c]);

    let ancestry: BTreeSet<_> = ledger.get_event_and_ancestry(c).await.into_iter().collect();
    assert_eq!(ancestry, BTreeSet::from([a, b, c]));
}

#[tokio::test]
async fn diamond_common_ancestors_and_shortest_path() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let x = ledger
        .ingest_event("trace-x", "SVC", "1.0", "host", "X", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let y = ledger
        .ingest_event("trace-y", "SVC", "1.0", "host", "Y", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let m = ledger
        .ingest_event(
            "trace-m",
            "SVC",
            "1.0",
            "host",
            "M",
            PayloadMap::new(),
            vec![x, y],
        )
        .await
        .unwrap();
    let z = ledger
        .ingest_event(
            "trace-z",
            "SVC",
            "1.0",
            "host",
            "Z",
            PayloadMap::new(),
            vec![x, y],
        )
        .await
        .unwrap();

    let common = ledger.get_all_common_causal_ancestors(m, z).await;
    assert_eq!(common, BTreeSet::from([x, y]));

    let nearest = ledger.get_nearest_common_causal_ancestors(m, z).await;
    assert_eq!(nearest, BTreeSet::from([x, y]));

    let path = ledger.get_shortest_causal_path(x, m).await;
    assert_eq!(path, vec![x, m]);
}

#[tokio::test]
async fn ingesting_with_unknown_parent_fails_and_leaves_ledger_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let fabricated_parent = uuid::Uuid::new_v4();
    let result = ledger
        .ingest_event(
            "T",
            "SVC",
            "1.0",
            "host",
            "A",
            PayloadMap::new(),
            vec![fabricated_parent],
        )
        .await;

    assert!(matches!(result, Err(ledger_core::LedgerError::UnknownParent(_))));
    let stats = ledger.get_stats().await;
    assert_eq!(stats.events_ingested, 0);
    assert_eq!(stats.num_vertices, 0);
}

#[tokio::test]
async fn warm_and_cold_restart_produce_equivalent_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let (x, y, m, z) = {
        let ledger = CausalLedger::open(config.clone()).await.unwrap();
        let x = ledger
            .ingest_event("trace-x", "SVC", "1.0", "host", "X", PayloadMap::new(), vec![])
            .await
            .unwrap();
        let y = ledger
            .ingest_event("trace-y", "SVC", "1.0", "host", "Y", PayloadMap::new(), vec![])
            .await
            .unwrap();
        let m = ledger
            .ingest_event("trace-m", "SVC", "1.0", "host", "M", PayloadMap::new(), vec![x, y])
            .await
            .unwrap();
        let z = ledger
            .ingest_event("trace-z", "SVC", "1.0", "host", "Z", PayloadMap::new(), vec![x, y])
            .await
            .unwrap();
        ledger.shutdown().await.unwrap();
        (x, y, m, z)
    };

    // Warm restart: index files are intact.
    let warm_order;
    let warm_stats;
    {
        let ledger = CausalLedger::open(config.clone()).await.unwrap();
        warm_order = ledger.get_topological_order().await.unwrap();
        warm_stats = ledger.get_stats().await;
        for id in [x, y, m, z] {
            assert!(ledger.contains_event(id).await);
        }
    }

    // Cold restart: delete every index file first.
    let index_dir = config.index_dir();
    for entry in std::fs::read_dir(&index_dir).unwrap() {
        let entry = entry.unwrap();
        if entry.path().extension().and_then(|e| e.to_str()) == Some("idx") {
            std::fs::remove_file(entry.path()).unwrap();
        }
    }

    let cold_order;
    let cold_stats;
    {
        let ledger = CausalLedger::open(config.clone()).await.unwrap();
        cold_order = ledger.get_topological_order().await.unwrap();
        cold_stats = ledger.get_stats().await;
        for id in [x, y, m, z] {
            assert!(ledger.contains_event(id).await);
            let ancestry: BTreeSet<_> = ledger.get_event_and_ancestry(id).await.into_iter().collect();
            assert!(ancestry.contains(&id));
        }
    }

    assert_eq!(warm_order.len(), cold_order.len());
    assert_eq!(warm_stats.num_vertices, cold_stats.num_vertices);
    assert_eq!(warm_stats.total_edges, cold_stats.total_edges);
    assert_eq!(warm_stats.events_ingested, cold_stats.events_ingested);
}

#[tokio::test]
async fn state_projection_and_time_travel() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let creation_id = ledger
        .ingest_event(
            "user-u1",
            "USER_ACCOUNT",
            "1.0",
            "host",
            catalogue::USER_CREATED,
            payload(&[("userId", "u1".into()), ("username", "a".into())]),
            vec![],
        )
        .await
        .unwrap();

    ledger
        .ingest_event(
            "user-u1",
            "USER_ACCOUNT",
            "1.0",
            "host",
            catalogue::USER_RENAMED,
            payload(&[("newUsername", "b".into())]),
            vec![creation_id],
        )
        .await
        .unwrap();

    let current = ledger.get_current_state_for_entity("USER_ACCOUNT").await.unwrap();
    assert_eq!(current.get("username").unwrap(), "b");
    assert_eq!(current.get("version").unwrap(), 2);
    assert_eq!(current.get("isActive").unwrap(), true);

    let historical = ledger
        .get_entity_state_up_to_event("USER_ACCOUNT", creation_id)
        .await
        .unwrap();
    assert_eq!(historical.get("username").unwrap(), "a");
    assert_eq!(historical.get("version").unwrap(), 1);
}

#[tokio::test]
async fn concurrent_branches_nearest_common_ancestor() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let r = ledger
        .ingest_event("trace-r", "SVC", "1.0", "host", "R", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let p = ledger
        .ingest_event("trace-p", "SVC", "1.0", "host", "P", PayloadMap::new(), vec![r])
        .await
        .unwrap();
    let q1 = ledger
        .ingest_event("trace-q1", "SVC", "1.0", "host", "Q1", PayloadMap::new(), vec![p])
        .await
        .unwrap();
    let q2 = ledger
        .ingest_event("trace-q2", "SVC", "1.0", "host", "Q2", PayloadMap::new(), vec![p])
        .await
        .unwrap();

    let nearest = ledger.get_nearest_common_causal_ancestors(q1, q2).await;
    assert_eq!(nearest, BTreeSet::from([p]));

    let all = ledger.get_all_common_causal_ancestors(q1, q2).await;
    assert_eq!(all, BTreeSet::from([r, p]));
}

#[tokio::test]
async fn shortest_path_boundary_cases() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let a = ledger
        .ingest_event("T", "SVC", "1.0", "host", "A", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let unrelated = ledger
        .ingest_event("U", "SVC", "1.0", "host", "U", PayloadMap::new(), vec![])
        .await
        .unwrap();

    assert_eq!(ledger.get_shortest_causal_path(a, a).await, vec![a]);
    assert!(ledger.get_shortest_causal_path(a, unrelated).await.is_empty());
}

#[tokio::test]
async fn compare_causality_reflects_vector_clock_relationship() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = CausalLedger::open(config_in(dir.path())).await.unwrap();

    let a = ledger
        .ingest_event("T", "SVC", "1.0", "host", "A", PayloadMap::new(), vec![])
        .await
        .unwrap();
    let b = ledger
        .ingest_event("T", "SVC", "1.0", "host", "B", PayloadMap::new(), vec![])
        .await
        .unwrap();

    assert_eq!(
        ledger.compare_causality(a, b).await.unwrap(),
        ledger_core::CausalityRelation::Causes
    );
    assert_eq!(
        ledger.compare_causality(b, a).await.unwrap(),
        ledger_core::CausalityRelation::CausedBy
    );
    assert_eq!(
        ledger.compare_causality(a, a).await.unwrap(),
        ledger_core::CausalityRelation::Identical
    );
    assert_eq!(
        ledger
            .compare_causality(a, uuid::Uuid::new_v4())
            .await
            .unwrap(),
        ledger_core::CausalityRelation::Undefined
    );
}
