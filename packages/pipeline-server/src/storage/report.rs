//! Read-only report projections (spec §4.9, §6.3 `list-records`/`counts`).
//!
//! Every query opens a redb read transaction, which never blocks and is
//! never blocked by the single writer (redb's MVCC model) -- reports never
//! contend with claim/settle traffic.

use pipeline_core::{Batch, BatchId, Record, RecordId, RecordState, TenantId};
use redb::ReadableTable;
use serde::Serialize;

use super::error::StoreError;
use super::store::RecordStore;
use super::tables::{decode_batch, decode_record, BATCHES, RECORDS};

/// One row of the flattened export shape (§6.5): exactly these columns, in
/// order. `A-`/`B-` columns are sourced from `payload_a`/`payload_b` if
/// present, else empty strings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportRow {
    pub key: String,
    pub state: String,
    pub message: String,
    #[serde(rename = "A-name")]
    pub a_name: String,
    #[serde(rename = "A-grade")]
    pub a_grade: String,
    #[serde(rename = "A-institution")]
    pub a_institution: String,
    #[serde(rename = "A-date")]
    pub a_date: String,
    #[serde(rename = "B-name")]
    pub b_name: String,
    #[serde(rename = "B-title")]
    pub b_title: String,
    #[serde(rename = "B-institution")]
    pub b_institution: String,
    #[serde(rename = "B-date")]
    pub b_date: String,
}

fn payload_field(payload: &Option<serde_json::Value>, field: &str) -> String {
    payload
        .as_ref()
        .and_then(|v| v.get(field))
        .and_then(|v| v.as_str().map(std::string::ToString::to_string).or_else(|| Some(v.to_string())))
        .unwrap_or_default()
}

impl From<&Record> for ExportRow {
    fn from(r: &Record) -> Self {
        Self {
            key: r.key.clone(),
            state: r.state.as_str().to_string(),
            message: r.last_error_message.clone().unwrap_or_default(),
            a_name: payload_field(&r.payload_a, "name"),
            a_grade: payload_field(&r.payload_a, "grade"),
            a_institution: payload_field(&r.payload_a, "institution"),
            a_date: payload_field(&r.payload_a, "date"),
            b_name: payload_field(&r.payload_b, "name"),
            b_title: payload_field(&r.payload_b, "title"),
            b_institution: payload_field(&r.payload_b, "institution"),
            b_date: payload_field(&r.payload_b, "date"),
        }
    }
}

/// Optional filters for [`list_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub state: Option<RecordState>,
    pub batch_id: Option<BatchId>,
}

impl RecordStore {
    /// Count of records per state for `tenant` (§4.9 `counts_by_state`).
    pub fn counts_by_state(
        &self,
        tenant: &TenantId,
    ) -> Result<std::collections::BTreeMap<RecordState, u64>, StoreError> {
        let txn = self.database().begin_read()?;
        let records = txn.open_table(RECORDS)?;
        let mut counts = std::collections::BTreeMap::new();
        for state in RecordState::ALL {
            counts.insert(state, 0u64);
        }
        for entry in records.iter()? {
            let (_, bytes) = entry?;
            let record = decode_record(&bytes.value())?;
            if &record.tenant_id == tenant {
                *counts.entry(record.state).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Total record count for `tenant`, across all states.
    pub fn total(&self, tenant: &TenantId) -> Result<u64, StoreError> {
        Ok(self.counts_by_state(tenant)?.values().sum())
    }

    /// Records for `tenant` matching `filter`, ordered by ascending id.
    pub fn list_records(
        &self,
        tenant: &TenantId,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let txn = self.database().begin_read()?;
        let records = txn.open_table(RECORDS)?;
        let mut out = Vec::new();
        for entry in records.iter()? {
            let (_, bytes) = entry?;
            let record = decode_record(&bytes.value())?;
            if &record.tenant_id != tenant {
                continue;
            }
            if let Some(state) = filter.state {
                if record.state != state {
                    continue;
                }
            }
            if let Some(batch_id) = filter.batch_id {
                if record.batch_id != batch_id {
                    continue;
                }
            }
            out.push(record);
        }
        Ok(out)
    }

    /// Batches for `tenant`, most-recently-created first.
    pub fn list_batches(&self, tenant: &TenantId) -> Result<Vec<Batch>, StoreError> {
        let txn = self.database().begin_read()?;
        let batches = txn.open_table(BATCHES)?;
        let mut out = Vec::new();
        for entry in batches.iter()? {
            let (_, bytes) = entry?;
            let batch = decode_batch(&bytes.value())?;
            if &batch.tenant_id == tenant {
                out.push(batch);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(out)
    }

    /// Flattened export rows for `tenant` (§6.5), in ascending record-id order.
    pub fn export_rows(&self, tenant: &TenantId) -> Result<Vec<ExportRow>, StoreError> {
        let filter = RecordFilter::default();
        Ok(self
            .list_records(tenant, &filter)?
            .iter()
            .map(ExportRow::from)
            .collect())
    }
}
