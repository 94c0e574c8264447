use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use chrono::Utc;
use tracing::warn;

use crate::engine::feed::enqueue_position;
use crate::engine::store::{self, PositionAck};
use crate::error::AppError;
use crate::models::courier::CourierPositionReport;
use crate::models::tracking::OrderView;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers/:id/position", patch(update_position))
        .route("/couriers/:id/estimates", get(list_estimates))
}

async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CourierPositionReport>,
) -> Result<Json<PositionAck>, AppError> {
    let position = payload.into_position(Utc::now()).map_err(|err| {
        warn!(courier_id = %id, error = %err, "rejected courier position");
        AppError::from(err)
    })?;

    let ack = store::record_position(&state, &id, position)?;
    enqueue_position(&state, &id)?;

    Ok(Json(ack))
}

async fn list_estimates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<OrderView>> {
    Json(store::courier_orders(&state, &id, Utc::now()))
}
