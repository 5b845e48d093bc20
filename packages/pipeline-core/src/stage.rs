//! The `StageProcessor` capability (spec §1, §4.3).
//!
//! A stage processor drives one external government portal for a single
//! record and reports back a [`StageOutcome`]. The two production
//! implementations (portal A, portal B) are external collaborators and do
//! not live in this crate -- only the trait boundary and an in-memory,
//! scripted test double ship here.

use async_trait::async_trait;
use serde_json::Value;

use crate::driver::Driver;
use crate::ids::RecordId;

/// Result of submitting one record to a stage's external portal.
///
/// Mirrors the three-way branch every worker loop takes after a stage
/// call (spec §4.1, §5): found, definitively not found, or a transient
/// failure that should be recorded and surfaced as an error state.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The portal returned a match; carries the payload to store on the record.
    Found(Value),
    /// The portal was queried successfully and reported no match; `reason`
    /// is a short human-readable string persisted as `last_error_message`.
    NotFound { reason: String },
    /// The call failed (timeout, portal error, parse failure); `reason` is
    /// persisted as the record's `last_error_message`.
    Failed { reason: String },
}

/// Error a [`StageProcessor`] raises when it cannot even attempt the call
/// (e.g. the driver has been closed). Distinct from [`StageOutcome::Failed`],
/// which is a well-formed negative result of attempting the call.
#[derive(Debug, thiserror::Error)]
#[error("stage exhausted: {reason}")]
pub struct StageError {
    pub reason: String,
}

/// Drives one external portal for one record.
///
/// Object-safe by construction (`Box<dyn StageProcessor>`): the worker
/// loop holds a processor behind a trait object so stage A and stage B
/// share one generic loop body (spec §4.9).
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Submits `key` to the portal using `driver`, returning the outcome.
    ///
    /// Implementations must not retain the driver past this call; ownership
    /// stays with the worker loop for the lifetime of the worker.
    async fn process(
        &self,
        record_id: RecordId,
        key: &str,
        driver: &mut dyn Driver,
    ) -> Result<StageOutcome, StageError>;
}

/// Scripted in-memory [`StageProcessor`] for tests: returns the next outcome
/// from a fixed script, keyed by call order, and records every `key` it was
/// invoked with for assertions.
pub struct ScriptedStageProcessor {
    script: parking_lot::Mutex<std::collections::VecDeque<StageOutcome>>,
    calls: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedStageProcessor {
    /// Builds a processor that yields `outcomes` in order, one per call.
    /// A call made after the script is exhausted returns `StageOutcome::Failed`.
    #[must_use]
    pub fn new(outcomes: impl IntoIterator<Item = StageOutcome>) -> Self {
        Self {
            script: parking_lot::Mutex::new(outcomes.into_iter().collect()),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Keys passed to [`StageProcessor::process`], in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl StageProcessor for ScriptedStageProcessor {
    async fn process(
        &self,
        record_id: RecordId,
        key: &str,
        _driver: &mut dyn Driver,
    ) -> Result<StageOutcome, StageError> {
        self.calls.lock().push(key.to_string());
        let next = self.script.lock().pop_front();
        if next.is_none() {
            tracing::warn!(record_id = record_id.0, key, "scripted processor exhausted");
        }
        Ok(next.unwrap_or(StageOutcome::Failed {
            reason: "scripted processor exhausted".to_string(),
        }))
    }
}
