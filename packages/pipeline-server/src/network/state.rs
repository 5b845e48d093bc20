//! Shared application state for the HTTP control plane.

use std::sync::Arc;
use std::time::Instant;

use pipeline_core::{DriverFactory, StageProcessor};

use crate::session::{SessionConfig, SessionManager};
use crate::storage::RecordStore;

use super::shutdown::ShutdownController;

/// Cloned into every handler via axum's `State` extractor. Every field is
/// cheap to clone (`Arc` or a `redb`-backed handle that is itself an `Arc`
/// internally).
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub sessions: Arc<SessionManager>,
    pub stage_a_processor: Arc<dyn StageProcessor>,
    pub stage_b_processor: Arc<dyn StageProcessor>,
    pub driver_factory: Arc<dyn DriverFactory>,
    pub session_config: Arc<SessionConfig>,
    pub shutdown: Arc<ShutdownController>,
    pub start_time: Instant,
}
