use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::store;
use crate::error::AppError;
use crate::models::raw::RawOrder;
use crate::models::tracking::{CloseReason, OrderPhase, OrderView};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(ingest_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/accept", post(accept_order))
        .route("/orders/:id/phase", patch(update_phase))
        .route("/orders/:id/close", post(close_order))
}

#[derive(Deserialize)]
pub struct AcceptOrderRequest {
    pub courier_id: String,
    pub order: Value,
    #[serde(default)]
    pub candidates: Vec<Value>,
}

#[derive(Deserialize)]
pub struct UpdatePhaseRequest {
    pub phase: OrderPhase,
}

#[derive(Deserialize)]
pub struct CloseOrderRequest {
    pub reason: CloseReason,
}

fn decode(value: Value) -> Result<RawOrder, AppError> {
    RawOrder::from_value(value)
        .map_err(|err| AppError::BadRequest(format!("invalid order payload: {err}")))
}

fn ensure_same_order(id: &str, raw: &RawOrder, what: &str) -> Result<(), AppError> {
    match raw.order_id() {
        Some(payload_id) if payload_id != id => Err(AppError::BadRequest(format!(
            "{what} id {payload_id} does not match order {id}"
        ))),
        _ => Ok(()),
    }
}

async fn ingest_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<OrderView>, AppError> {
    let raw = decode(payload)?;
    let view = store::ingest(&state, &raw, Utc::now())?;
    Ok(Json(view))
}

async fn list_orders(State(state): State<Arc<AppState>>) -> Json<Vec<OrderView>> {
    Json(store::list(&state, Utc::now()))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    store::get(&state, &id, Utc::now())
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AcceptOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    if payload.courier_id.trim().is_empty() {
        return Err(AppError::BadRequest("courier_id cannot be empty".to_string()));
    }

    let raw = decode(payload.order)?;
    ensure_same_order(&id, &raw, "payload")?;

    let candidates = payload
        .candidates
        .into_iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()?;
    for candidate in &candidates {
        ensure_same_order(&id, candidate, "candidate")?;
    }

    let view = store::accept(&state, &id, &payload.courier_id, &raw, &candidates, Utc::now());
    Ok(Json(view))
}

async fn update_phase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePhaseRequest>,
) -> Result<Json<OrderView>, AppError> {
    let view = store::set_phase(&state, &id, payload.phase, Utc::now())?;
    Ok(Json(view))
}

async fn close_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CloseOrderRequest>,
) -> Result<Json<OrderView>, AppError> {
    let view = store::close(&state, &id, payload.reason, Utc::now())?;
    Ok(Json(view))
}
