//! Binary entrypoint: parses [`PipelineConfig`], opens the record store,
//! wires the session manager and HTTP control plane, and serves until
//! Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use pipeline_core::{
    Driver, NullDriverFactory, RecordId, StageError, StageOutcome, StageProcessor,
};
use pipeline_server::network::NetworkModule;
use pipeline_server::{PipelineConfig, RecordStore, SessionManager};
use tracing::{info, warn};

/// Placeholder [`StageProcessor`] wired in until a real portal driver is
/// supplied: infra wiring is real, the business call always reports the
/// same well-formed failure.
struct UnwiredStageProcessor {
    stage: &'static str,
}

#[async_trait]
impl StageProcessor for UnwiredStageProcessor {
    async fn process(
        &self,
        _record_id: RecordId,
        _key: &str,
        _driver: &mut dyn Driver,
    ) -> Result<StageOutcome, StageError> {
        Err(StageError {
            reason: format!("{} has no portal driver configured", self.stage),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PipelineConfig::parse();

    if let Some(parent) = config.data_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = RecordStore::open(&config.data_dir, Duration::from_secs(5))?;

    let session_config = Arc::new(config.session_config());
    let sessions = Arc::new(SessionManager::new(
        session_config.max_global_workers,
        session_config.session_idle_timeout,
    ));

    let stage_a_processor: Arc<dyn StageProcessor> = Arc::new(UnwiredStageProcessor { stage: "stage-a" });
    let stage_b_processor: Arc<dyn StageProcessor> = Arc::new(UnwiredStageProcessor { stage: "stage-b" });
    let driver_factory = Arc::new(NullDriverFactory);

    let cleanup_sessions = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            let evicted = cleanup_sessions.cleanup_idle_sessions().await;
            if evicted > 0 {
                info!(evicted, "periodic idle-session cleanup");
            }
        }
    });

    let mut module = NetworkModule::new(
        config.http_config(),
        store,
        sessions,
        stage_a_processor,
        stage_b_processor,
        driver_factory,
        session_config,
    );

    let port = module.start().await?;
    info!(port, "pipeline server ready");

    if let Err(err) = module.serve(shutdown_signal()).await {
        warn!(%err, "server exited with error");
        return Err(err);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
