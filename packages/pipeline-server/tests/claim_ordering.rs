//! Property tests for claim ordering and uniqueness (spec §8 invariants 4, 5).

use std::time::Duration;

use pipeline_core::{RecordState, TenantId};
use pipeline_server::storage::RecordStore;
use proptest::prelude::*;

fn open_store() -> (RecordStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(&dir.path().join("pipeline.redb"), Duration::from_secs(2)).unwrap();
    (store, dir)
}

proptest! {
    /// Invariant 5: sequential claims against one (tenant, state) partition
    /// dispatch strictly increasing record ids.
    #[test]
    fn sequential_claims_are_strictly_increasing(batch_size in 1usize..50) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (store, _dir) = open_store();
            let tenant: TenantId = "t1".into();
            let keys: Vec<String> = (0..batch_size).map(|i| format!("{:08}", 10_000_000 + i)).collect();
            store.create_batch(&tenant, "in.csv".to_string(), keys).unwrap();

            let mut last = 0u64;
            for _ in 0..batch_size {
                let record = store
                    .claim(&tenant, RecordState::Pending, RecordState::ProcessingA)
                    .await
                    .unwrap()
                    .expect("partition should not be empty yet");
                prop_assert!(record.id.0 > last);
                last = record.id.0;
            }
            let empty = store
                .claim(&tenant, RecordState::Pending, RecordState::ProcessingA)
                .await
                .unwrap();
            prop_assert!(empty.is_none());
            Ok(())
        })?;
    }
}

/// Invariant 4: at most one worker holds a record -- concurrent claims
/// against the same partition never return the same id twice.
#[tokio::test]
async fn concurrent_claims_never_return_the_same_record_twice() {
    let (store, _dir) = open_store();
    let tenant: TenantId = "t1".into();
    let keys: Vec<String> = (0..20).map(|i| format!("{:08}", 10_000_000 + i)).collect();
    store.create_batch(&tenant, "in.csv".to_string(), keys).unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim(&tenant, RecordState::Pending, RecordState::ProcessingA)
                .await
                .unwrap()
        }));
    }

    let mut claimed_ids = Vec::new();
    for handle in handles {
        if let Some(record) = handle.await.unwrap() {
            claimed_ids.push(record.id.0);
        }
    }

    let mut unique = claimed_ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), claimed_ids.len(), "a record was claimed more than once");
    assert_eq!(claimed_ids.len(), 20);
}
