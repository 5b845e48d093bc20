//! Errors raised by the session/orchestration layer.

/// Errors the Session Manager / Orchestrator surface to callers (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("capacity exceeded: {current} + {requested} workers would exceed limit {limit}")]
    CapacityExceeded {
        current: u32,
        requested: u32,
        limit: u32,
    },

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),
}
