//! HTTP routing configuration

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{handlers, metrics::Registry, state};

/// Creates the Axum router with all routes configured.
pub fn app(state: state::AppState, metrics: Arc<Registry>) -> Router {
    let vars = Router::new()
        .route("/debug/vars", get(handlers::metrics_handlers::debug_vars))
        .with_state(metrics);

    Router::new()
        .route(
            "/v1/healthcheck",
            get(handlers::health_handlers::healthcheck),
        )
        .route("/ready", get(handlers::health_handlers::ready))
        .fallback(handlers::health_handlers::not_found)
        .with_state(state)
        .merge(vars)
        .layer(TraceLayer::new_for_http())
}
