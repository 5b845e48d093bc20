//! redb table definitions and row codecs (spec §4.1, §6.6).
//!
//! Two main tables keyed by monotonic `u64` id, plus a secondary index
//! multimap keyed by an encoded `(tenant, state)` partition so `claim` can
//! scan a single partition in ascending record-id order instead of a full
//! table scan.

use pipeline_core::{Batch, Record, RecordState, TenantId};
use redb::{MultimapTableDefinition, TableDefinition};

use super::error::StoreError;

pub const RECORDS: TableDefinition<u64, Vec<u8>> = TableDefinition::new("records");
pub const BATCHES: TableDefinition<u64, Vec<u8>> = TableDefinition::new("batches");
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// `(tenant_id, state_tag)` -> `record_id`, values kept in ascending order by
/// redb's multimap implementation -- this is what gives `claim` its FIFO
/// ordering within a partition (invariant 5).
pub const RECORDS_BY_TENANT_STATE: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("records_by_tenant_state");

pub const NEXT_RECORD_ID: &str = "next_record_id";
pub const NEXT_BATCH_ID: &str = "next_batch_id";

/// Encodes the `(tenant, state)` secondary-index key. `\0` cannot appear in a
/// tenant id that passed the boundary length/charset check (§6.1), so this
/// never collides across tenants.
#[must_use]
pub fn index_key(tenant: &TenantId, state: RecordState) -> String {
    format!("{}\0{:03}", tenant.as_str(), state.tag())
}

pub fn encode_record(record: &Record) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(record)?)
}

pub fn decode_record(bytes: &[u8]) -> Result<Record, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_batch(batch: &Batch) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(batch)?)
}

pub fn decode_batch(bytes: &[u8]) -> Result<Batch, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Milliseconds since the Unix epoch, used for `created_at`/`updated_at`.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
