//! Pipeline server: tokio worker pool, redb-backed record store, axum
//! control plane for the two-stage national ID validation pipeline.

pub mod config;
pub mod network;
pub mod session;
pub mod storage;
pub mod worker;

pub use config::PipelineConfig;
pub use network::{ControlError, HttpConfig, NetworkModule};
pub use session::{SessionConfig, SessionError, SessionManager};
pub use storage::{RecordStore, StoreError};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {}
}
