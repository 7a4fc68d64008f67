//! Runtime metrics exposition

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;

use crate::metrics::Registry;

/// Evaluates every registered entry at request time.
pub async fn debug_vars(State(registry): State<Arc<Registry>>) -> Json<Value> {
    Json(registry.snapshot())
}
