//! HTTP middleware stack for the control plane.
//!
//! Transport-level only: tracing, CORS, and a request timeout. Operation-
//! level concerns (tenant extraction, capacity checks) live in the handlers.

use axum::http::{Method, StatusCode};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::HttpConfig;

type HttpLayers = tower::layer::util::Stack<
    TimeoutLayer,
    tower::layer::util::Stack<
        CorsLayer,
        tower::layer::util::Stack<
            TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>,
            tower::layer::util::Identity,
        >,
    >,
>;

/// Builds the Tower middleware stack: tracing (outermost), then CORS, then
/// a request timeout (innermost).
#[must_use]
pub fn build_http_layers(config: &HttpConfig) -> HttpLayers {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_http_layers_does_not_panic_with_defaults() {
        let config = HttpConfig::default();
        let _layers = build_http_layers(&config);
    }
}
