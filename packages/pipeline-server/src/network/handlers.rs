//! Route handlers for the control plane (spec §6.3).
//!
//! Every handler starts by turning the `X-Session-ID` header into a
//! [`TenantId`] and touching the session's last-activity clock (§6.1)
//! before doing anything tenant-scoped.

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use pipeline_core::{BatchId, RecordState, TenantId};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::session::Orchestrator;
use crate::storage::RecordFilter;

use super::error::ControlError;
use super::ingest::{extract_raw_entries, validate_entries};
use super::state::AppState;
use super::HealthState;

const MIN_TENANT_LEN: usize = 8;
const WORKERS_PER_TENANT: u32 = 2;

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, ControlError> {
    let value = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(ControlError::MissingTenant)?;
    if value.len() < MIN_TENANT_LEN {
        return Err(ControlError::MissingTenant);
    }
    Ok(TenantId::from(value))
}

/// `GET /health` -- always 200, body carries the actual state (§4.10 idiom
/// carried over from the server process's own health reporting).
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    let in_flight = state.shutdown.in_flight_count();
    let uptime_secs = state.start_time.elapsed().as_secs();
    Json(json!({
        "state": health.as_str(),
        "in_flight": in_flight,
        "uptime_secs": uptime_secs,
    }))
}

pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// `POST /ingest` (§6.2, §6.3 `ingest`): accepts a single multipart file
/// field, extracts raw entries by extension, cleans/validates/de-dupes them,
/// and creates the batch and its Pending records.
pub async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ControlError::UnsupportedFileType(e.to_string()))?
    else {
        return Err(ControlError::EmptyUpload);
    };
    let filename = field.file_name().unwrap_or("upload.txt").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ControlError::UnsupportedFileType(e.to_string()))?;

    let raw_entries = extract_raw_entries(&filename, &bytes)?;
    let validated = validate_entries(raw_entries);
    if validated.accepted.is_empty() {
        return Err(ControlError::EmptyUpload);
    }

    let batch = state
        .store
        .create_batch(&tenant, filename, validated.accepted)?;
    info!(
        tenant = tenant.as_str(),
        batch_id = batch.id.0,
        accepted = batch.declared_record_count,
        rejected = validated.rejected.len(),
        "ingested batch"
    );

    Ok(Json(json!({
        "batch_id": batch.id.0,
        "accepted": batch.declared_record_count,
        "rejected": validated.rejected,
    })))
}

/// `GET /status` (§6.3 `status`).
pub async fn status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    let counts = state.store.counts_by_state(&tenant)?;
    let total: u64 = counts.values().sum();
    let completed: u64 = counts
        .iter()
        .filter(|(state, _)| state.is_terminal())
        .map(|(_, n)| *n)
        .sum();
    let in_progress: u64 = counts
        .iter()
        .filter(|(state, _)| state.is_processing())
        .map(|(_, n)| *n)
        .sum();
    let progress_percent = if total == 0 {
        0.0
    } else {
        (completed as f64 / total as f64) * 100.0
    };

    let by_state: serde_json::Map<String, serde_json::Value> = counts
        .iter()
        .map(|(state, n)| (state.as_str().to_string(), json!(n)))
        .collect();

    Ok(Json(json!({
        "counts_by_state": by_state,
        "total": total,
        "completed": completed,
        "in_progress": in_progress,
        "progress_percent": progress_percent,
        "stage_a": {
            "pending": counts.get(&RecordState::Pending).copied().unwrap_or(0),
            "processing": counts.get(&RecordState::ProcessingA).copied().unwrap_or(0),
            "found": counts.get(&RecordState::FoundA).copied().unwrap_or(0),
            "error": counts.get(&RecordState::ErrorA).copied().unwrap_or(0),
        },
        "stage_b": {
            "pending": counts.get(&RecordState::CheckB).copied().unwrap_or(0),
            "processing": counts.get(&RecordState::ProcessingB).copied().unwrap_or(0),
            "found": counts.get(&RecordState::FoundB).copied().unwrap_or(0),
            "not_found": counts.get(&RecordState::NotFound).copied().unwrap_or(0),
            "error": counts.get(&RecordState::ErrorB).copied().unwrap_or(0),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    pub state: Option<String>,
    pub batch_id: Option<u64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

/// `GET /records` (§6.3 `list-records`).
pub async fn list_records_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    let filter = RecordFilter {
        state: query.state.as_deref().and_then(RecordState::parse),
        batch_id: query.batch_id.map(BatchId),
    };
    let mut records = state.store.list_records(&tenant, &filter)?;
    records.sort_by_key(|r| r.id);
    let total = records.len();
    let page: Vec<_> = records.into_iter().skip(query.offset).take(query.limit).collect();

    Ok(Json(json!({ "total": total, "records": page })))
}

/// `GET /batches` (§6.3 `list-batches`).
pub async fn list_batches_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<pipeline_core::Batch>>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);
    Ok(Json(state.store.list_batches(&tenant)?))
}

/// `GET /export` (§6.3 `export`, §6.5).
pub async fn export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    let rows = state.store.export_rows(&tenant)?;
    if rows.is_empty() {
        return Err(ControlError::EmptyExport);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| ControlError::UnsupportedFileType(e.to_string()))?;
    }
    let csv_bytes = writer
        .into_inner()
        .map_err(|e| ControlError::UnsupportedFileType(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/csv")],
        csv_bytes,
    ))
}

fn get_or_create_orchestrator(state: &AppState, tenant: &TenantId) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        tenant.clone(),
        state.store.clone(),
        state.session_config.stage_a,
        state.session_config.stage_b,
        state.stage_a_processor.clone(),
        state.stage_b_processor.clone(),
        state.driver_factory.clone(),
        state.session_config.stop_join_timeout,
    ))
}

/// `POST /start-workers` (§6.3 `start-workers`): starts if not running, else
/// resumes; rejected with a capacity error if the global budget would be
/// exceeded for a brand-new orchestrator.
pub async fn start_workers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    match state.sessions.get_orchestrator(&tenant) {
        Some(orchestrator) if orchestrator.is_running() => {
            orchestrator.resume();
            Ok(Json(json!({ "status": "resumed" })))
        }
        Some(orchestrator) => {
            state
                .sessions
                .register_workers(&tenant, WORKERS_PER_TENANT)?;
            orchestrator.start();
            Ok(Json(json!({ "status": "started" })))
        }
        None => {
            state
                .sessions
                .register_workers(&tenant, WORKERS_PER_TENANT)?;
            let orchestrator = get_or_create_orchestrator(&state, &tenant);
            state.sessions.set_orchestrator(&tenant, orchestrator.clone());
            orchestrator.start();
            Ok(Json(json!({ "status": "started" })))
        }
    }
}

/// `POST /stop-workers` (§6.3 `stop-workers`).
pub async fn stop_workers_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    if let Some(orchestrator) = state.sessions.get_orchestrator(&tenant) {
        orchestrator.stop().await;
        state.sessions.unregister_workers(&tenant);
    }
    Ok(Json(json!({ "status": "stopped" })))
}

/// `POST /retry-failed` (§6.3 `retry-failed`).
pub async fn retry_failed_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);
    let requeued = state.store.retry_failed(
        &tenant,
        state.session_config.max_retries_a,
        state.session_config.max_retries_b,
    )?;
    Ok(Json(json!({ "requeued": requeued })))
}

/// `POST /recover` (§6.3 `recover`, §4.7).
pub async fn recover_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);
    let recovered = state.store.recover(&tenant)?;
    Ok(Json(json!({ "recovered": recovered })))
}

/// `POST /clean` (§6.3 `clean`).
pub async fn clean_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ControlError> {
    let tenant = extract_tenant(&headers)?;
    state.sessions.touch(&tenant);

    if let Some(orchestrator) = state.sessions.get_orchestrator(&tenant) {
        orchestrator.stop().await;
        state.sessions.unregister_workers(&tenant);
    }
    let removed = state.store.clean(&tenant)?;
    Ok(Json(json!({ "removed": removed })))
}

/// `GET /server-stats` (§6.3 `server-stats`): not tenant-scoped.
pub async fn server_stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.sessions.stats();
    Json(json!({
        "active_sessions": stats.active_sessions,
        "total_workers": stats.total_workers,
        "max_workers": stats.max_workers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tenant_rejects_short_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", "short".parse().unwrap());
        assert!(matches!(
            extract_tenant(&headers),
            Err(ControlError::MissingTenant)
        ));
    }

    #[test]
    fn extract_tenant_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_tenant(&headers),
            Err(ControlError::MissingTenant)
        ));
    }

    #[test]
    fn extract_tenant_accepts_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", "tenant-one".parse().unwrap());
        assert_eq!(extract_tenant(&headers).unwrap().as_str(), "tenant-one");
    }
}
