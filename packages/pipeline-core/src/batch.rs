//! The `Batch` domain type (spec §3).

use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, TenantId};

/// A group of records created from a single ingestion (spec §3).
///
/// Read-only after creation; destroyed only by a tenant-scoped clean
/// (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub tenant_id: TenantId,
    pub source_filename: String,
    pub declared_record_count: u32,
    pub created_at: i64,
}
