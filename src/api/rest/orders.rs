use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::assignment::{assign_order, batch_assign};
use crate::engine::lifecycle::{accept_order, cancel_order, manual_assign, update_status};
use crate::engine::ratings::{rate_delivery, RatingReceipt};
use crate::engine::recommend::{recommend, Recommendations, DEFAULT_LIMIT};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::assignment::{AssignmentOutcome, BatchReport, Strategy};
use crate::models::courier::GeoPoint;
use crate::models::order::{Order, OrderStatus, Refund};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/batch-assign", post(batch_assign_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/assign", post(assign))
        .route("/orders/:id/manual-assign", post(assign_manually))
        .route("/orders/:id/accept", post(accept))
        .route("/orders/:id/status", post(change_status))
        .route("/orders/:id/cancel", post(cancel))
        .route("/orders/:id/rating", post(rate))
        .route("/orders/:id/recommendations", get(recommendations))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub merchant_id: Option<Uuid>,
    pub fleet_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub price: f64,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct StrategyQuery {
    pub strategy: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendationsQuery {
    pub strategy: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct BatchAssignRequest {
    pub order_ids: Vec<Uuid>,
    pub strategy: Option<String>,
}

#[derive(Deserialize)]
pub struct ManualAssignRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub order: Order,
    pub refund: Refund,
}

fn parse_status(raw: &str) -> Result<OrderStatus, AppError> {
    raw.parse::<OrderStatus>().map_err(AppError::Validation)
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    for point in [&payload.pickup, &payload.dropoff] {
        if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
            return Err(AppError::Validation(format!(
                "coordinates out of range: ({}, {})",
                point.lat, point.lng
            )));
        }
    }
    if !payload.price.is_finite() || payload.price < 0.0 {
        return Err(AppError::Validation(
            "price must be a non-negative amount".to_string(),
        ));
    }

    let order = Order::new(
        payload.merchant_id,
        payload.fleet_id,
        payload.pickup,
        payload.dropoff,
        payload.price,
        Utc::now(),
    );

    state.orders.insert(order.id, order.clone());
    tracing::info!(order_id = %order.id, "order placed");

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;

    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| status.is_none_or(|status| entry.value().status == status))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by_key(|order| order.created_at);

    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.order(id)?))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StrategyQuery>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let strategy = Strategy::parse_optional(query.strategy.as_deref())?;
    Ok(Json(assign_order(&state, id, strategy, Utc::now())?))
}

async fn batch_assign_orders(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchAssignRequest>,
) -> Result<Json<BatchReport>, AppError> {
    let strategy = Strategy::parse_optional(payload.strategy.as_deref())?;
    Ok(Json(batch_assign(
        &state,
        &payload.order_ids,
        strategy,
        Utc::now(),
    )?))
}

async fn assign_manually(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<ManualAssignRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(manual_assign(
        &state,
        id,
        payload.courier_id,
        actor,
        Utc::now(),
    )?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Order>, AppError> {
    let Actor::Courier(courier_id) = actor else {
        return Err(AppError::Forbidden(
            "only the offered courier can accept an order".to_string(),
        ));
    };
    Ok(Json(accept_order(&state, id, courier_id, Utc::now())?))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Order>, AppError> {
    let to = parse_status(&payload.status)?;
    Ok(Json(update_status(&state, id, actor, to, Utc::now())?))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<CancelResponse>, AppError> {
    let reason = payload
        .and_then(|Json(body)| body.reason)
        .unwrap_or_else(|| "cancelled by request".to_string());
    let (order, refund) = cancel_order(&state, id, actor, &reason, Utc::now())?;
    Ok(Json(CancelResponse { order, refund }))
}

async fn rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<RatingReceipt>, AppError> {
    Ok(Json(rate_delivery(
        &state,
        id,
        actor,
        payload.rating,
        Utc::now(),
    )?))
}

async fn recommendations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<Recommendations>, AppError> {
    let strategy = Strategy::parse_optional(query.strategy.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(recommend(&state, id, strategy, limit)?))
}
