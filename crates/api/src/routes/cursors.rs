//! Indexer status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use store::{Cursor, CursorStore};

use crate::AppState;
use crate::error::ApiError;

/// GET /cursors: the persisted position of every stream.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Cursor>>, ApiError> {
    Ok(Json(state.cursors.list().await?))
}
