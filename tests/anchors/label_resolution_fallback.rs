//! Anchor: label resolution is total and batched — cached labels come from
//! the store, misses trigger exactly one batched remote call whose hits are
//! persisted, and everything still unknown maps to itself.

use std::collections::HashSet;
use std::sync::Arc;

use crate::anchor_utils::{addr, MockLabelLookup};
use supply_graph::enrich::LabelEnricher;
use supply_graph::storage::labels_db::LabelsDb;

#[tokio::test]
async fn test_three_way_resolution() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let db = LabelsDb::open(dir.path().join("labels.db")).expect("open db");

    let cached = addr(0xa1);
    let fetchable = addr(0xb2);
    let unknown = addr(0xc3);

    db.insert_label_if_absent(cached, "Cached Router").expect("seed");

    let remote = Arc::new(MockLabelLookup {
        known: [(fetchable, "Fresh Vault".to_string())].into_iter().collect(),
        ..Default::default()
    });

    let enricher = LabelEnricher::new(db.clone(), Some(remote.clone()));
    let wanted: HashSet<_> = [cached, fetchable, unknown].into_iter().collect();
    let resolved = enricher.resolve(&wanted).await;

    assert_eq!(resolved.len(), 3);
    assert_eq!(resolved.get(&cached).map(String::as_str), Some("Cached Router"));
    assert_eq!(resolved.get(&fetchable).map(String::as_str), Some("Fresh Vault"));
    assert_eq!(resolved.get(&unknown).cloned(), Some(unknown.to_checksum(None)));

    // The freshly fetched label was persisted.
    assert_eq!(
        db.get_label(fetchable).expect("get").as_deref(),
        Some("Fresh Vault")
    );

    // Exactly one remote batch, and the cached address was not in it.
    assert_eq!(remote.batch_count(), 1);
    let batches = remote.batches.lock().expect("batches");
    assert!(!batches[0].contains(&cached));
    assert!(batches[0].contains(&fetchable));
    assert!(batches[0].contains(&unknown));
}

#[tokio::test]
async fn test_second_resolve_retries_only_the_unknown() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let db = LabelsDb::open(dir.path().join("labels.db")).expect("open db");

    let fetchable = addr(0xb2);
    let unknown = addr(0xc3);

    let remote = Arc::new(MockLabelLookup {
        known: [(fetchable, "Fresh Vault".to_string())].into_iter().collect(),
        ..Default::default()
    });
    let enricher = LabelEnricher::new(db, Some(remote.clone()));
    let wanted: HashSet<_> = [fetchable, unknown].into_iter().collect();

    enricher.resolve(&wanted).await;
    let resolved = enricher.resolve(&wanted).await;

    // The fallback was not cached; the unknown address is asked about again,
    // the resolved one is not.
    assert_eq!(remote.batch_count(), 2);
    let batches = remote.batches.lock().expect("batches");
    assert_eq!(batches[1], vec![unknown]);
    assert_eq!(resolved.get(&unknown).cloned(), Some(unknown.to_checksum(None)));
}
