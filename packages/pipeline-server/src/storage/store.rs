//! `RecordStore` / `BatchStore`: the redb-backed persistence layer (spec
//! §4.1, §4.2).
//!
//! Every mutating method opens exactly one redb write transaction and
//! commits or aborts it atomically -- "every state change is a single
//! committed transaction" (§4.1). Claims are run on a blocking thread pool
//! and bounded by a timeout so a contended writer lock degrades to "treat
//! the row as unavailable" (§7) instead of hanging a worker forever.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pipeline_core::{Batch, BatchId, Record, RecordId, RecordState, TenantId};
use redb::{Database, ReadableMultimapTable, ReadableTable};
use tracing::{debug, warn};

use super::error::StoreError;
use super::tables::{
    decode_batch, decode_record, encode_batch, encode_record, index_key, now_millis, BATCHES,
    COUNTERS, NEXT_BATCH_ID, NEXT_RECORD_ID, RECORDS, RECORDS_BY_TENANT_STATE,
};

/// Handle to the on-disk pipeline database. Cheaply cloneable (the inner
/// `redb::Database` is wrapped in an `Arc`).
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
    /// Bound on how long a `claim` waits for the writer lock before giving
    /// up and reporting the partition as empty (§6.6, §7).
    claim_timeout: Duration,
}

impl RecordStore {
    /// Opens (creating if absent) the single-file database at `path` and
    /// ensures all tables exist.
    pub fn open(path: &Path, claim_timeout: Duration) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(RECORDS)?;
            let _ = txn.open_table(BATCHES)?;
            let _ = txn.open_table(COUNTERS)?;
            let _ = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
        }
        txn.commit()?;
        Ok(Self {
            db: Arc::new(db),
            claim_timeout,
        })
    }

    /// Creates a batch and its records in one transaction. `keys` must
    /// already be cleaned, validated, and de-duplicated (spec §6.2,
    /// `ingest` module) -- this method only persists.
    pub fn create_batch(
        &self,
        tenant: &TenantId,
        source_filename: String,
        keys: Vec<String>,
    ) -> Result<Batch, StoreError> {
        let db = self.db.clone();
        let tenant = tenant.clone();
        let now = now_millis();
        let declared = keys.len() as u32;

        let txn = db.begin_write()?;
        let batch_id = {
            let mut counters = txn.open_table(COUNTERS)?;
            next_id(&mut counters, NEXT_BATCH_ID)?
        };
        let batch = Batch {
            id: BatchId(batch_id),
            tenant_id: tenant.clone(),
            source_filename,
            declared_record_count: declared,
            created_at: now,
        };
        {
            let mut batches = txn.open_table(BATCHES)?;
            batches.insert(batch_id, encode_batch(&batch)?)?;

            let mut records = txn.open_table(RECORDS)?;
            let mut index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
            let mut counters = txn.open_table(COUNTERS)?;
            for key in keys {
                let record_id = next_id(&mut counters, NEXT_RECORD_ID)?;
                let record = Record::new_pending(
                    RecordId(record_id),
                    BatchId(batch_id),
                    tenant.clone(),
                    key,
                    now,
                );
                records.insert(record_id, encode_record(&record)?)?;
                index.insert(index_key(&tenant, RecordState::Pending).as_str(), record_id)?;
            }
        }
        txn.commit()?;
        debug!(batch_id, tenant = tenant.as_str(), "created batch");
        Ok(batch)
    }

    /// Atomically claims the oldest record in `(tenant, source)`, moving it
    /// to `processing`. Returns `Ok(None)` on an empty partition, and also
    /// on writer-lock contention past `claim_timeout` (§7).
    pub async fn claim(
        &self,
        tenant: &TenantId,
        source: RecordState,
        processing: RecordState,
    ) -> Result<Option<Record>, StoreError> {
        let db = self.db.clone();
        let tenant = tenant.clone();
        let timeout = self.claim_timeout;

        let claim_fut = tokio::task::spawn_blocking(move || {
            claim_blocking(&db, &tenant, source, processing)
        });

        match tokio::time::timeout(timeout, claim_fut).await {
            Ok(join_result) => join_result.expect("claim blocking task panicked"),
            Err(_) => {
                warn!("claim timed out waiting for writer lock, treating as empty");
                Ok(None)
            }
        }
    }

    /// Transitions `record_id` from `expected` to `next`, applying `mutate`
    /// to set the settling payload/error fields. No-op (`Ok(false)`) if the
    /// stored state does not match `expected` -- guards against recovery
    /// races per §4.4.
    pub fn settle(
        &self,
        record_id: RecordId,
        expected: RecordState,
        next: RecordState,
        mutate: impl FnOnce(&mut Record),
    ) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let settled = {
            let mut records = txn.open_table(RECORDS)?;
            let mut index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
            let Some(bytes) = records.get(record_id.0)?.map(|v| v.value()) else {
                return Ok(false);
            };
            let mut record = decode_record(&bytes)?;
            if record.state != expected {
                return Ok(false);
            }
            index.remove(index_key(&record.tenant_id, expected).as_str(), record_id.0)?;
            record.state = next;
            record.updated_at = now_millis();
            mutate(&mut record);
            index.insert(index_key(&record.tenant_id, next).as_str(), record_id.0)?;
            records.insert(record_id.0, encode_record(&record)?)?;
            true
        };
        txn.commit()?;
        Ok(settled)
    }

    /// Demotes every stranded `Processing-A`/`Processing-B` record for
    /// `tenant` back to its recovery predecessor (§4.1 `rec`, §4.7). Returns
    /// the number of records demoted.
    pub fn recover(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        let mut demoted = 0;
        for processing in [RecordState::ProcessingA, RecordState::ProcessingB] {
            let predecessor = processing
                .recovery_predecessor()
                .expect("processing states have a recovery predecessor");
            let ids = self.ids_in_partition(tenant, processing)?;
            for id in ids {
                if self.settle(RecordId(id), processing, predecessor, |_| {})? {
                    demoted += 1;
                }
            }
        }
        Ok(demoted)
    }

    /// Resets every retry-eligible terminal record (`Not-Found`, `Error-A`,
    /// `Error-B`) for `tenant` back to `Pending`, clearing payloads/error
    /// message and incrementing `retry_count` (§4.8). Returns the number of
    /// records retried.
    ///
    /// `max_retries_a`/`max_retries_b` are the per-stage `max-retries` knobs
    /// (§6.7): a record already at its cap is left alone. `Not-Found`
    /// records are capped by `max_retries_b` since Stage B produced them.
    /// `None` means unlimited.
    pub fn retry_failed(
        &self,
        tenant: &TenantId,
        max_retries_a: Option<u32>,
        max_retries_b: Option<u32>,
    ) -> Result<usize, StoreError> {
        let mut retried = 0;
        for (eligible, cap) in [
            (RecordState::ErrorA, max_retries_a),
            (RecordState::ErrorB, max_retries_b),
            (RecordState::NotFound, max_retries_b),
        ] {
            let ids = self.ids_in_partition(tenant, eligible)?;
            for id in ids {
                if let Some(limit) = cap {
                    let Some(record) = self.get(RecordId(id))? else {
                        continue;
                    };
                    if record.retry_count >= limit {
                        continue;
                    }
                }
                let did = self.settle(RecordId(id), eligible, RecordState::Pending, |r| {
                    r.retry_count += 1;
                    r.payload_a = None;
                    r.payload_b = None;
                    r.last_error_message = None;
                })?;
                if did {
                    retried += 1;
                }
            }
        }
        Ok(retried)
    }

    /// Deletes every record and batch belonging to `tenant` in one
    /// transaction (§4.2).
    pub fn clean(&self, tenant: &TenantId) -> Result<usize, StoreError> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut records = txn.open_table(RECORDS)?;
            let mut batches = txn.open_table(BATCHES)?;
            let mut index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;

            let mut record_ids = Vec::new();
            for entry in records.iter()? {
                let (id, bytes) = entry?;
                let record = decode_record(&bytes.value())?;
                if &record.tenant_id == tenant {
                    record_ids.push((id.value(), record.state));
                }
            }
            for (id, state) in &record_ids {
                records.remove(*id)?;
                index.remove(index_key(tenant, *state).as_str(), *id)?;
            }

            let mut batch_ids = Vec::new();
            for entry in batches.iter()? {
                let (id, bytes) = entry?;
                let batch = decode_batch(&bytes.value())?;
                if &batch.tenant_id == tenant {
                    batch_ids.push(id.value());
                }
            }
            for id in &batch_ids {
                batches.remove(*id)?;
            }
            record_ids.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Reads a single record by id, if present.
    pub fn get(&self, record_id: RecordId) -> Result<Option<Record>, StoreError> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(RECORDS)?;
        match records.get(record_id.0)? {
            Some(bytes) => Ok(Some(decode_record(&bytes.value())?)),
            None => Ok(None),
        }
    }

    /// All record ids currently in `(tenant, state)`, in ascending order.
    pub(crate) fn ids_in_partition(
        &self,
        tenant: &TenantId,
        state: RecordState,
    ) -> Result<Vec<u64>, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
        let key = index_key(tenant, state);
        let mut ids = Vec::new();
        for entry in index.get(key.as_str())? {
            ids.push(entry?.value());
        }
        Ok(ids)
    }

    pub(crate) fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

fn claim_blocking(
    db: &Database,
    tenant: &TenantId,
    source: RecordState,
    processing: RecordState,
) -> Result<Option<Record>, StoreError> {
    let txn = db.begin_write()?;
    let key = index_key(tenant, source);

    let record_id = {
        let index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
        let mut iter = index.get(key.as_str())?;
        match iter.next() {
            Some(entry) => Some(entry?.value()),
            None => None,
        }
    };
    let Some(record_id) = record_id else {
        return Ok(None);
    };

    let claimed = {
        let mut records = txn.open_table(RECORDS)?;
        let mut index = txn.open_multimap_table(RECORDS_BY_TENANT_STATE)?;
        let bytes = records
            .get(record_id)?
            .map(|v| v.value())
            .ok_or(StoreError::RecordNotFound(record_id))?;
        let mut record = decode_record(&bytes)?;
        index.remove(key.as_str(), record_id)?;
        record.state = processing;
        record.updated_at = now_millis();
        records.insert(record_id, encode_record(&record)?)?;
        index.insert(index_key(tenant, processing).as_str(), record_id)?;
        record
    };
    txn.commit()?;
    Ok(Some(claimed))
}

fn next_id(counters: &mut redb::Table<&str, u64>, key: &str) -> Result<u64, StoreError> {
    let current = counters.get(key)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    counters.insert(key, next)?;
    Ok(next)
}
