//! Per-tenant `Orchestrator` (spec §4.5): owns the tenant's two worker
//! tasks, a pause flag, and a stop flag.
//!
//! `pause` is modeled as a `tokio::sync::watch::Sender<bool>` so a worker can
//! `.await` a state change instead of busy-polling; `stop` is a monotonic
//! `Arc<AtomicBool>` -- the same flag-plus-watch-channel idiom used by the
//! `network::shutdown::ShutdownController`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline_core::{DriverFactory, StageProcessor, TenantId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::storage::RecordStore;
use crate::worker::{run_worker, StageSpec};

struct RunningWorkers {
    stage_a: JoinHandle<()>,
    stage_b: JoinHandle<()>,
}

/// One per tenant. See module docs.
pub struct Orchestrator {
    tenant: TenantId,
    store: RecordStore,
    stage_a_spec: StageSpec,
    stage_b_spec: StageSpec,
    stage_a_processor: Arc<dyn StageProcessor>,
    stage_b_processor: Arc<dyn StageProcessor>,
    driver_factory: Arc<dyn DriverFactory>,
    stop_join_timeout: Duration,
    pause_tx: watch::Sender<bool>,
    stop: Arc<AtomicBool>,
    running: Mutex<Option<RunningWorkers>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        tenant: TenantId,
        store: RecordStore,
        stage_a_spec: StageSpec,
        stage_b_spec: StageSpec,
        stage_a_processor: Arc<dyn StageProcessor>,
        stage_b_processor: Arc<dyn StageProcessor>,
        driver_factory: Arc<dyn DriverFactory>,
        stop_join_timeout: Duration,
    ) -> Self {
        let (pause_tx, _pause_rx) = watch::channel(false);
        Self {
            tenant,
            store,
            stage_a_spec,
            stage_b_spec,
            stage_a_processor,
            stage_b_processor,
            driver_factory,
            stop_join_timeout,
            pause_tx,
            stop: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Recovers stranded processing-state records for this tenant (§4.7),
    /// then starts both worker tasks if none are alive; otherwise a no-op
    /// with a warning (§4.5 "otherwise no-op with warning").
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!(tenant = self.tenant.as_str(), "start requested while already running");
            return;
        }

        match self.store.recover(&self.tenant) {
            Ok(demoted) if demoted > 0 => {
                info!(tenant = self.tenant.as_str(), demoted, "recovered stranded records on start");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(tenant = self.tenant.as_str(), %err, "recovery on start failed");
            }
        }

        self.stop.store(false, Ordering::Release);
        let _ = self.pause_tx.send(false);

        let stage_a = tokio::spawn(run_worker(
            self.tenant.clone(),
            self.stage_a_spec,
            self.store.clone(),
            self.stage_a_processor.clone(),
            self.driver_factory.clone(),
            self.pause_tx.subscribe(),
            self.stop.clone(),
        ));
        let stage_b = tokio::spawn(run_worker(
            self.tenant.clone(),
            self.stage_b_spec,
            self.store.clone(),
            self.stage_b_processor.clone(),
            self.driver_factory.clone(),
            self.pause_tx.subscribe(),
            self.stop.clone(),
        ));

        *running = Some(RunningWorkers { stage_a, stage_b });
        info!(tenant = self.tenant.as_str(), "orchestrator started");
    }

    /// Asserts the pause flag; workers suspend before their next claim.
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    /// Clears the pause flag, waking any suspended workers.
    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    /// Asserts stop, clears pause, and joins both workers with a bounded
    /// timeout, force-aborting (and so force-releasing their driver) any
    /// that overruns it (§4.5). A no-op success if nothing is running.
    pub async fn stop(&self) {
        let workers = self.running.lock().take();
        let Some(workers) = workers else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        let _ = self.pause_tx.send(false);

        join_with_timeout(&self.tenant, "stage-a", workers.stage_a, self.stop_join_timeout).await;
        join_with_timeout(&self.tenant, "stage-b", workers.stage_b, self.stop_join_timeout).await;

        info!(tenant = self.tenant.as_str(), "orchestrator stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }
}

async fn join_with_timeout(tenant: &TenantId, stage: &'static str, handle: JoinHandle<()>, timeout: Duration) {
    let abort_handle = handle.abort_handle();
    tokio::select! {
        result = handle => {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    warn!(tenant = tenant.as_str(), stage, %err, "worker task panicked");
                }
            }
        }
        () = tokio::time::sleep(timeout) => {
            warn!(tenant = tenant.as_str(), stage, "worker join timed out, aborting task");
            abort_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_core::{NullDriverFactory, ScriptedStageProcessor, StageOutcome};

    fn test_orchestrator(store: RecordStore, tenant: TenantId) -> Orchestrator {
        let fast_spec = |mut s: StageSpec| {
            s.poll_interval = Duration::from_millis(5);
            s.jitter_min = Duration::from_millis(1);
            s.jitter_max = Duration::from_millis(2);
            s
        };
        Orchestrator::new(
            tenant,
            store,
            fast_spec(crate::worker::STAGE_A),
            fast_spec(crate::worker::STAGE_B),
            Arc::new(ScriptedStageProcessor::new([])),
            Arc::new(ScriptedStageProcessor::new([])),
            Arc::new(NullDriverFactory),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn start_is_noop_when_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("db.redb"), Duration::from_secs(1)).unwrap();
        let orch = test_orchestrator(store, "tenant-a".into());

        orch.start();
        assert!(orch.is_running());
        orch.start(); // no-op, should not panic or double-spawn
        assert!(orch.is_running());

        orch.stop().await;
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn stop_on_non_running_tenant_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("db.redb"), Duration::from_secs(1)).unwrap();
        let orch = test_orchestrator(store, "tenant-a".into());
        assert!(!orch.is_running());
        orch.stop().await; // must not panic
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("db.redb"), Duration::from_secs(1)).unwrap();
        let orch = test_orchestrator(store, "tenant-a".into());
        assert!(!orch.is_paused());
        orch.pause();
        assert!(orch.is_paused());
        orch.resume();
        assert!(!orch.is_paused());
    }

    #[tokio::test]
    async fn stop_claims_nothing_further_once_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("db.redb"), Duration::from_secs(1)).unwrap();
        let tenant: TenantId = "tenant-a".into();
        store
            .create_batch(&tenant, "in.csv".to_string(), vec!["10000001".to_string()])
            .unwrap();

        let fast_spec = |mut s: StageSpec| {
            s.poll_interval = Duration::from_millis(5);
            s
        };
        let orch = Orchestrator::new(
            tenant.clone(),
            store.clone(),
            fast_spec(crate::worker::STAGE_A),
            fast_spec(crate::worker::STAGE_B),
            Arc::new(ScriptedStageProcessor::new([StageOutcome::Found(
                serde_json::json!({"name": "Alice"}),
            )])),
            Arc::new(ScriptedStageProcessor::new([])),
            Arc::new(NullDriverFactory),
            Duration::from_secs(2),
        );

        orch.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.stop().await;

        let record = store.get(pipeline_core::RecordId(1)).unwrap().unwrap();
        assert_eq!(record.state, pipeline_core::RecordState::FoundA);
    }
}
