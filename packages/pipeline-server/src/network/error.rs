//! Control-plane error type, mapped to HTTP status codes per spec §6.4.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::session::SessionError;
use crate::storage::StoreError;

/// Errors surfaced by the HTTP control plane (spec §6.4).
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("missing or invalid X-Session-ID header")]
    MissingTenant,

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("upload contained no valid entries")]
    EmptyUpload,

    #[error("no data to export")]
    EmptyExport,

    #[error(transparent)]
    Capacity(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControlError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::MissingTenant
            | ControlError::UnsupportedFileType(_)
            | ControlError::EmptyUpload => StatusCode::BAD_REQUEST,
            ControlError::EmptyExport => StatusCode::NOT_FOUND,
            ControlError::Capacity(SessionError::CapacityExceeded { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ControlError::Capacity(SessionError::Store(_)) | ControlError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tenant_is_bad_request() {
        assert_eq!(ControlError::MissingTenant.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_export_is_not_found() {
        assert_eq!(ControlError::EmptyExport.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn capacity_exceeded_is_service_unavailable() {
        let err = ControlError::Capacity(SessionError::CapacityExceeded {
            current: 10,
            requested: 2,
            limit: 10,
        });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
