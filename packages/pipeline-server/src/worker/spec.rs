//! `StageSpec`: the single generic shape both worker loops are parameterized
//! by (spec §4.4, §9 "polymorphism over stages" -- one function, not a class
//! hierarchy per stage).

use std::time::Duration;

use pipeline_core::{Record, RecordState};
use serde_json::Value;

/// One stage's slice of the state machine plus its timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    pub source: RecordState,
    pub processing: RecordState,
    pub success: RecordState,
    pub forward_or_terminal: RecordState,
    pub error: RecordState,
    pub poll_interval: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Additional sleep applied after settling a record that has already
    /// been retried at least once (`retry-extra-sleep`, §6.7) -- backs off
    /// a worker that keeps re-hitting a record stuck in a retry loop.
    pub retry_extra_sleep: Duration,
    /// Writes a `Found` payload onto the correct field (`payload_a` for
    /// Stage A, `payload_b` for Stage B) -- avoids a stage-specific branch
    /// inside the shared loop body.
    pub set_payload: fn(&mut Record, Value),
}

fn set_payload_a(record: &mut Record, payload: Value) {
    record.payload_a = Some(payload);
}

fn set_payload_b(record: &mut Record, payload: Value) {
    record.payload_b = Some(payload);
}

/// `Pending` -> `Processing-A`; success `Found-A`; forward `Check-B`; error `Error-A`.
pub const STAGE_A: StageSpec = StageSpec {
    name: "stage-a",
    source: RecordState::Pending,
    processing: RecordState::ProcessingA,
    success: RecordState::FoundA,
    forward_or_terminal: RecordState::CheckB,
    error: RecordState::ErrorA,
    poll_interval: Duration::from_secs(2),
    jitter_min: Duration::from_millis(200),
    jitter_max: Duration::from_millis(800),
    retry_extra_sleep: Duration::from_secs(0),
    set_payload: set_payload_a,
};

/// `Check-B` -> `Processing-B`; success `Found-B`; forward-or-terminal `Not-Found`; error `Error-B`.
pub const STAGE_B: StageSpec = StageSpec {
    name: "stage-b",
    source: RecordState::CheckB,
    processing: RecordState::ProcessingB,
    success: RecordState::FoundB,
    forward_or_terminal: RecordState::NotFound,
    error: RecordState::ErrorB,
    poll_interval: Duration::from_secs(2),
    jitter_min: Duration::from_millis(200),
    jitter_max: Duration::from_millis(800),
    retry_extra_sleep: Duration::from_secs(0),
    set_payload: set_payload_b,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_specs_match_spec_transition_table() {
        assert_eq!(STAGE_A.source, RecordState::Pending);
        assert_eq!(STAGE_A.processing, RecordState::ProcessingA);
        assert_eq!(STAGE_A.success, RecordState::FoundA);
        assert_eq!(STAGE_A.forward_or_terminal, RecordState::CheckB);
        assert_eq!(STAGE_A.error, RecordState::ErrorA);

        assert_eq!(STAGE_B.source, RecordState::CheckB);
        assert_eq!(STAGE_B.processing, RecordState::ProcessingB);
        assert_eq!(STAGE_B.success, RecordState::FoundB);
        assert_eq!(STAGE_B.forward_or_terminal, RecordState::NotFound);
        assert_eq!(STAGE_B.error, RecordState::ErrorB);
    }
}
