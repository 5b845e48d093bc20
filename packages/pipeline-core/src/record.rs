//! The `Record` domain type (spec §3).

use serde::{Deserialize, Serialize};

use crate::ids::{BatchId, RecordId, TenantId};
use crate::state::RecordState;

/// One national-identification-number job instance.
///
/// Field-for-field the `Record` of spec §3. `payload_a`/`payload_b` are
/// opaque structured data from the two external stages (spec Design Notes,
/// "dynamic payloads") -- callers must tolerate missing fields within them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub batch_id: BatchId,
    pub tenant_id: TenantId,
    pub key: String,
    pub state: RecordState,
    pub retry_count: u32,
    pub payload_a: Option<serde_json::Value>,
    pub payload_b: Option<serde_json::Value>,
    pub last_error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Record {
    /// Constructs a freshly-ingested `Pending` record (spec §3 "Lifecycle").
    #[must_use]
    pub fn new_pending(
        id: RecordId,
        batch_id: BatchId,
        tenant_id: TenantId,
        key: String,
        now: i64,
    ) -> Self {
        Self {
            id,
            batch_id,
            tenant_id,
            key,
            state: RecordState::Pending,
            retry_count: 0,
            payload_a: None,
            payload_b: None,
            last_error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Invariant 2 (spec §3): `Found-A` implies `payload_a` present, `Found-B`
    /// implies `payload_b` present, every other state implies both absent.
    #[must_use]
    pub fn satisfies_payload_invariant(&self) -> bool {
        match self.state {
            RecordState::FoundA => self.payload_a.is_some() && self.payload_b.is_none(),
            RecordState::FoundB => self.payload_b.is_some() && self.payload_a.is_none(),
            _ => self.payload_a.is_none() && self.payload_b.is_none(),
        }
    }
}
