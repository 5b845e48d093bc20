//! Session-layer configuration (spec §4.6, §6.7).

use std::time::Duration;

use crate::worker::StageSpec;

/// Tunable knobs for the Session Manager and the two per-tenant worker specs.
///
/// One struct per concern, with a sensible `Default`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `MAX_GLOBAL_WORKERS` (§4.6, §6.7). Typically 10.
    pub max_global_workers: u32,
    /// `SESSION_IDLE_TIMEOUT` (§4.6, §6.7). Typically 1800s.
    pub session_idle_timeout: Duration,
    /// Bounded busy-wait applied to a contended claim (§5, §6.6). Typically 5s.
    pub claim_timeout: Duration,
    /// Bounded join timeout applied when stopping an orchestrator (§4.5). Typically 15s.
    pub stop_join_timeout: Duration,
    pub stage_a: StageSpec,
    pub stage_b: StageSpec,
    /// Per-stage `max-retries` knobs (§6.7), applied by `retry-failed`. `None` is unlimited.
    pub max_retries_a: Option<u32>,
    pub max_retries_b: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_global_workers: 10,
            session_idle_timeout: Duration::from_secs(1800),
            claim_timeout: Duration::from_secs(5),
            stop_join_timeout: Duration::from_secs(15),
            stage_a: crate::worker::STAGE_A,
            stage_b: crate::worker::STAGE_B,
            max_retries_a: None,
            max_retries_b: None,
        }
    }
}
