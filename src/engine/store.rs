//! Operations on the keyed order/courier store.
//!
//! Lock order is always `orders` entry first, then `couriers`; courier entries
//! are released before any order entry is taken.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::normalizer::normalize;
use crate::engine::reconciler::reconcile;
use crate::engine::tracker::EstimateUpdate;
use crate::error::AppError;
use crate::models::courier::{CourierPosition, CourierSlot};
use crate::models::location::OrderLocationSet;
use crate::models::raw::RawOrder;
use crate::models::tracking::{CloseReason, OrderPhase, OrderView, TrackedOrder};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct PositionAck {
    pub courier_id: String,
    pub position: CourierPosition,
    /// Courier moved far enough that the nearby-orders list should be re-fetched.
    pub refetch_nearby: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierEstimate {
    pub order_id: String,
    pub outcome: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub orders: usize,
    pub couriers: usize,
}

/// Normalizes a fresh payload and supersedes the stored location set.
pub fn ingest(state: &AppState, raw: &RawOrder, now: DateTime<Utc>) -> Result<OrderView, AppError> {
    let order_id = raw
        .order_id()
        .ok_or_else(|| AppError::BadRequest("order payload has no id".to_string()))?
        .to_string();

    let locations = normalize(&order_id, raw, now);
    state.metrics.record_normalization(&locations);
    let phase = phase_of(&order_id, raw);

    let (mut slot, was_open) = match state.orders.entry(order_id) {
        Entry::Occupied(entry) => {
            let open = entry.get().is_open();
            (entry.into_ref(), open)
        }
        Entry::Vacant(entry) => {
            let order = TrackedOrder::new(locations.clone(), phase.unwrap_or(OrderPhase::Pending));
            (entry.insert(order), false)
        }
    };

    let order = slot.value_mut();
    order.locations = locations;
    if let Some(phase) = phase {
        order.phase = phase;
    }
    settle(state, order, now);
    track_open_delta(state, was_open, order.is_open());

    Ok(view(state, order, now))
}

/// Reconciles the accept-call payload with every known view of the order and
/// starts tracking it for `courier_id`.
///
/// Candidate views are the stored location set, if any, followed by
/// `candidates` in the order supplied. Candidates carrying another order's id
/// are skipped.
pub fn accept(
    state: &AppState,
    order_id: &str,
    courier_id: &str,
    raw: &RawOrder,
    candidates: &[RawOrder],
    now: DateTime<Utc>,
) -> OrderView {
    let accepted = normalize(order_id, raw, now);
    let supplied: Vec<OrderLocationSet> = candidates
        .iter()
        .filter(|candidate| match candidate.order_id() {
            Some(candidate_id) if candidate_id != order_id => {
                warn!(order_id, candidate_id, "candidate view belongs to another order; skipped");
                false
            }
            _ => true,
        })
        .map(|candidate| normalize(order_id, candidate, now))
        .collect();

    let phase = match phase_of(order_id, raw) {
        None | Some(OrderPhase::Pending) => OrderPhase::Confirmed,
        Some(phase) => phase,
    };

    let (mut slot, was_open) = match state.orders.entry(order_id.to_string()) {
        Entry::Occupied(entry) => {
            let open = entry.get().is_open();
            (entry.into_ref(), open)
        }
        Entry::Vacant(entry) => (entry.insert(TrackedOrder::new(accepted.clone(), phase)), false),
    };

    let order = slot.value_mut();
    let mut views = Vec::with_capacity(supplied.len() + 1);
    views.push(order.locations.clone());
    views.extend(supplied);
    let reconciled = reconcile(accepted, &views);
    state.metrics.record_normalization(&reconciled);

    if let Some(previous) = order.courier_id.as_deref().filter(|previous| *previous != courier_id) {
        info!(order_id, previous_courier = previous, courier_id, "order reassigned");
    }

    order.locations = reconciled;
    order.phase = phase;
    order.courier_id = Some(courier_id.to_string());
    order.reopen();
    order.clear_estimate();
    settle(state, order, now);
    track_open_delta(state, was_open, order.is_open());

    info!(
        order_id,
        courier_id,
        pickup_source = order.locations.pickup.source.as_str(),
        delivery_source = order.locations.delivery.source.as_str(),
        "order accepted"
    );

    view(state, order, now)
}

pub fn set_phase(
    state: &AppState,
    order_id: &str,
    phase: OrderPhase,
    now: DateTime<Utc>,
) -> Result<OrderView, AppError> {
    let mut slot = state
        .orders
        .get_mut(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let order = slot.value_mut();
    if !order.is_open() {
        return Err(AppError::BadRequest(format!("order {order_id} is closed")));
    }

    order.phase = phase;
    settle(state, order, now);
    track_open_delta(state, true, order.is_open());

    Ok(view(state, order, now))
}

pub fn close(
    state: &AppState,
    order_id: &str,
    reason: CloseReason,
    now: DateTime<Utc>,
) -> Result<OrderView, AppError> {
    let mut slot = state
        .orders
        .get_mut(order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let order = slot.value_mut();
    let was_open = order.is_open();
    order.close(reason, now);
    track_open_delta(state, was_open, false);

    info!(order_id, reason = ?reason, "order closed");
    Ok(view(state, order, now))
}

pub fn get(state: &AppState, order_id: &str, now: DateTime<Utc>) -> Option<OrderView> {
    state
        .orders
        .get(order_id)
        .map(|entry| view(state, entry.value(), now))
}

pub fn list(state: &AppState, now: DateTime<Utc>) -> Vec<OrderView> {
    state
        .orders
        .iter()
        .map(|entry| view(state, entry.value(), now))
        .collect()
}

pub fn courier_orders(state: &AppState, courier_id: &str, now: DateTime<Utc>) -> Vec<OrderView> {
    state
        .orders
        .iter()
        .filter(|entry| entry.value().courier_id.as_deref() == Some(courier_id))
        .map(|entry| view(state, entry.value(), now))
        .collect()
}

/// Evicts orders closed longer than `retention` ago and couriers whose latest
/// reading is older than `retention`.
pub fn prune(state: &AppState, now: DateTime<Utc>, retention: Duration) -> PruneReport {
    let orders_before = state.orders.len();
    state
        .orders
        .retain(|_, order| order.closed_at.is_none_or(|closed_at| now - closed_at <= retention));

    let couriers_before = state.couriers.len();
    state
        .couriers
        .retain(|_, slot| now - slot.position.observed_at <= retention);

    PruneReport {
        orders: orders_before.saturating_sub(state.orders.len()),
        couriers: couriers_before.saturating_sub(state.couriers.len()),
    }
}

/// Replaces the courier's current position (latest value wins).
pub fn record_position(
    state: &AppState,
    courier_id: &str,
    position: CourierPosition,
) -> Result<PositionAck, AppError> {
    let refetch_nearby = match state.couriers.entry(courier_id.to_string()) {
        Entry::Occupied(mut entry) => {
            let slot = entry.get_mut();
            slot.position = position;
            let moved = state
                .tracker
                .gate()
                .has_moved(&slot.refetch_anchor, &position.point)?;
            if moved {
                slot.refetch_anchor = position.point;
            }
            moved
        }
        Entry::Vacant(entry) => {
            entry.insert(CourierSlot {
                position,
                refetch_anchor: position.point,
            });
            true
        }
    };

    Ok(PositionAck {
        courier_id: courier_id.to_string(),
        position,
        refetch_nearby,
    })
}

/// Feeds the courier's latest stored position to every open order it carries.
pub fn apply_courier_position(
    state: &AppState,
    courier_id: &str,
    now: DateTime<Utc>,
) -> Vec<CourierEstimate> {
    let Some(position) = state.couriers.get(courier_id).map(|slot| slot.position) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for mut entry in state.orders.iter_mut() {
        let order = entry.value_mut();
        if !order.is_open() || order.courier_id.as_deref() != Some(courier_id) {
            continue;
        }

        let outcome = run_update(state, order, &position, now);
        results.push(CourierEstimate {
            order_id: order.locations.order_id.clone(),
            outcome,
        });
    }

    results
}

/// Closes terminal orders and refreshes derived distances and estimates.
fn settle(state: &AppState, order: &mut TrackedOrder, now: DateTime<Utc>) {
    if order.is_open() {
        match order.phase {
            OrderPhase::Delivered => order.close(CloseReason::Delivered, now),
            OrderPhase::Cancelled => order.close(CloseReason::Cancelled, now),
            _ => {}
        }
    }

    if let Err(err) = state.tracker.refresh_trip(order) {
        error!(order_id = %order.locations.order_id, error = %err, "failed to refresh trip distance");
    }

    if !order.is_open() {
        return;
    }

    let position = order
        .courier_id
        .as_deref()
        .and_then(|courier_id| state.couriers.get(courier_id).map(|slot| slot.position));
    if let Some(position) = position {
        run_update(state, order, &position, now);
    }
}

/// Projects a slot for readers, with the stale flag taken against `now`.
fn view(state: &AppState, order: &TrackedOrder, now: DateTime<Utc>) -> OrderView {
    let mut view = OrderView::from(order);
    if let Some(estimate) = view.estimate.as_mut() {
        estimate.refresh_staleness(now, state.tracker.stale_after());
    }
    view
}

fn run_update(
    state: &AppState,
    order: &mut TrackedOrder,
    position: &CourierPosition,
    now: DateTime<Utc>,
) -> &'static str {
    let outcome = match state.tracker.update(order, position, now) {
        Ok(update) => {
            if let EstimateUpdate::NoOp(reason) = &update {
                warn!(order_id = %order.locations.order_id, reason = ?reason, "no estimate available");
            }
            update.outcome()
        }
        Err(err) => {
            error!(order_id = %order.locations.order_id, error = %err, "estimate computation failed");
            "error"
        }
    };

    state
        .metrics
        .estimate_updates_total
        .with_label_values(&[outcome])
        .inc();
    outcome
}

fn phase_of(order_id: &str, raw: &RawOrder) -> Option<OrderPhase> {
    let status = raw.status.as_deref()?;
    let phase = OrderPhase::parse(status);
    if phase.is_none() {
        warn!(order_id, status, "unknown order status");
    }
    phase
}

fn track_open_delta(state: &AppState, was_open: bool, is_open: bool) {
    match (was_open, is_open) {
        (false, true) => state.metrics.tracked_orders.inc(),
        (true, false) => state.metrics.tracked_orders.dec(),
        _ => {}
    }
}
