//! The generic worker loop body (spec §4.4, §5): claim -> process -> settle,
//! shared by Stage A and Stage B via [`StageSpec`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pipeline_core::{DriverFactory, StageError, StageOutcome, StageProcessor, TenantId};
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::storage::RecordStore;

use super::spec::StageSpec;

/// Runs one stage's claim/process/settle loop for `tenant` until `stop` is
/// observed. Acquires one driver on entry and holds it for the whole
/// lifetime of the loop (spec §4.5, §9 "scoped driver acquisition") --
/// dropping it on every exit path via the handle's own `Drop`.
pub async fn run_worker(
    tenant: TenantId,
    spec: StageSpec,
    store: RecordStore,
    processor: Arc<dyn StageProcessor>,
    driver_factory: Arc<dyn DriverFactory>,
    mut pause_rx: watch::Receiver<bool>,
    stop: Arc<AtomicBool>,
) {
    let mut driver = match driver_factory.acquire().await {
        Ok(driver) => driver,
        Err(err) => {
            error!(tenant = tenant.as_str(), stage = spec.name, %err, "failed to acquire driver, worker exiting");
            return;
        }
    };

    info!(tenant = tenant.as_str(), stage = spec.name, "worker started");

    loop {
        if !wait_while_paused(&mut pause_rx, &stop).await {
            break;
        }
        if stop.load(Ordering::Acquire) {
            break;
        }

        let claimed = match store.claim(&tenant, spec.source, spec.processing).await {
            Ok(claimed) => claimed,
            Err(err) => {
                warn!(tenant = tenant.as_str(), stage = spec.name, %err, "claim failed, retrying after poll interval");
                tokio::time::sleep(spec.poll_interval).await;
                continue;
            }
        };

        let Some(record) = claimed else {
            tokio::time::sleep(spec.poll_interval).await;
            continue;
        };

        debug!(tenant = tenant.as_str(), stage = spec.name, record_id = record.id.0, "claimed record");

        let is_retry = record.retry_count > 0;
        let outcome = processor.process(record.id, &record.key, driver.as_mut()).await;
        if let Err(err) = apply_outcome(&store, &spec, record.id, outcome) {
            warn!(tenant = tenant.as_str(), stage = spec.name, record_id = record.id.0, %err, "failed to settle claimed record");
        }

        let mut sleep_for = jitter_sleep(spec.jitter_min, spec.jitter_max);
        if is_retry {
            sleep_for += spec.retry_extra_sleep;
        }
        tokio::time::sleep(sleep_for).await;
    }

    info!(tenant = tenant.as_str(), stage = spec.name, "worker stopped");
}

/// Blocks while the pause flag is set, waking on either a pause-state change
/// or the stop flag. Returns `false` if the worker should exit outright.
async fn wait_while_paused(pause_rx: &mut watch::Receiver<bool>, stop: &Arc<AtomicBool>) -> bool {
    while *pause_rx.borrow() {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        if pause_rx.changed().await.is_err() {
            // Orchestrator dropped: treat as a stop request.
            return false;
        }
    }
    true
}

fn apply_outcome(
    store: &RecordStore,
    spec: &StageSpec,
    record_id: pipeline_core::RecordId,
    outcome: Result<StageOutcome, StageError>,
) -> Result<(), crate::storage::StoreError> {
    match outcome {
        Ok(StageOutcome::Found(payload)) => {
            store
                .settle(record_id, spec.processing, spec.success, |record| {
                    (spec.set_payload)(record, payload);
                })
                .map(|_| ())
        }
        Ok(StageOutcome::NotFound { reason }) => store
            .settle(record_id, spec.processing, spec.forward_or_terminal, |record| {
                record.last_error_message = Some(reason);
            })
            .map(|_| ()),
        Ok(StageOutcome::Failed { reason }) => store
            .settle(record_id, spec.processing, spec.error, |record| {
                record.last_error_message = Some(reason);
            })
            .map(|_| ()),
        Err(StageError { reason }) => store
            .settle(record_id, spec.processing, spec.error, |record| {
                record.last_error_message = Some(format!("worker: {reason}"));
            })
            .map(|_| ()),
    }
}

fn jitter_sleep(min: std::time::Duration, max: std::time::Duration) -> std::time::Duration {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..max)
}
