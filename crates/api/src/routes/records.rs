//! Record query endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use store::Page;

use crate::AppState;
use crate::error::ApiError;
use crate::query::{EntityKind, Record};

async fn run(
    state: &AppState,
    kind: EntityKind,
    params: &HashMap<String, String>,
) -> Result<Json<Page<Record>>, ApiError> {
    let result = state.query.query(kind, params).await;

    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!("api_queries_total", "kind" => kind.as_str(), "outcome" => outcome)
        .increment(1);

    Ok(Json(result?))
}

/// GET /locked: page through locked records.
#[tracing::instrument(skip(state))]
pub async fn locked(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Record>>, ApiError> {
    run(&state, EntityKind::Locked, &params).await
}

/// GET /escrows: page through escrow records.
#[tracing::instrument(skip(state))]
pub async fn escrows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Record>>, ApiError> {
    run(&state, EntityKind::Escrows, &params).await
}
