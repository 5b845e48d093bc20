//! HTTP control-plane module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener,
//! `serve()` accepts connections until shutdown is signalled. This lets the
//! binary wire the Session Manager and Record Store into `AppState` between
//! construction and serving.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use pipeline_core::{DriverFactory, StageProcessor};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::session::{SessionConfig, SessionManager};
use crate::storage::RecordStore;

use super::config::HttpConfig;
use super::handlers::{
    clean_handler, export_handler, health_handler, ingest_handler, list_batches_handler,
    list_records_handler, liveness_handler, readiness_handler, recover_handler,
    retry_failed_handler, server_stats_handler, start_workers_handler, status_handler,
    stop_workers_handler,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use super::state::AppState;

/// Manages the control plane's HTTP server lifecycle (spec §4.10).
pub struct NetworkModule {
    config: HttpConfig,
    listener: Option<TcpListener>,
    store: RecordStore,
    sessions: Arc<SessionManager>,
    stage_a_processor: Arc<dyn StageProcessor>,
    stage_b_processor: Arc<dyn StageProcessor>,
    driver_factory: Arc<dyn DriverFactory>,
    session_config: Arc<SessionConfig>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new control-plane module without binding any port.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: HttpConfig,
        store: RecordStore,
        sessions: Arc<SessionManager>,
        stage_a_processor: Arc<dyn StageProcessor>,
        stage_b_processor: Arc<dyn StageProcessor>,
        driver_factory: Arc<dyn DriverFactory>,
        session_config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            config,
            listener: None,
            store,
            sessions,
            stage_a_processor,
            stage_b_processor,
            driver_factory,
            session_config,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            sessions: Arc::clone(&self.sessions),
            stage_a_processor: Arc::clone(&self.stage_a_processor),
            stage_b_processor: Arc::clone(&self.stage_b_processor),
            driver_factory: Arc::clone(&self.driver_factory),
            session_config: Arc::clone(&self.session_config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        }
    }

    /// Assembles the axum router: health probes plus every operation of
    /// spec §6.3.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = self.app_state();
        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/ingest", post(ingest_handler))
            .route("/status", get(status_handler))
            .route("/records", get(list_records_handler))
            .route("/batches", get(list_batches_handler))
            .route("/export", get(export_handler))
            .route("/start-workers", post(start_workers_handler))
            .route("/stop-workers", post(stop_workers_handler))
            .route("/retry-failed", post(retry_failed_handler))
            .route("/recover", post(recover_handler))
            .route("/clean", post(clean_handler))
            .route("/server-stats", get(server_stats_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!("control plane listening on {}:{}", self.config.host, port);
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains in-flight
    /// requests up to 30 seconds before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let shutdown_ctrl = Arc::clone(&self.shutdown);

        shutdown_ctrl.set_ready();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        shutdown_ctrl.trigger_shutdown();
        let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
        if !drained {
            warn!("drain timeout expired with in-flight requests remaining");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::{NullDriverFactory, ScriptedStageProcessor};

    fn test_module() -> (NetworkModule, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("db.redb"), Duration::from_secs(1)).unwrap();
        let module = NetworkModule::new(
            HttpConfig::default(),
            store,
            Arc::new(SessionManager::new(10, Duration::from_secs(1800))),
            Arc::new(ScriptedStageProcessor::new([])),
            Arc::new(ScriptedStageProcessor::new([])),
            Arc::new(NullDriverFactory),
            Arc::new(SessionConfig::default()),
        );
        (module, dir)
    }

    #[test]
    fn new_creates_module_without_binding() {
        let (module, _dir) = test_module();
        assert!(module.listener.is_none());
    }

    #[test]
    fn build_router_creates_router() {
        let (module, _dir) = test_module();
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let (mut module, _dir) = test_module();
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let (module, _dir) = test_module();
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
