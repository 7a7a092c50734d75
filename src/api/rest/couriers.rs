use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::availability::Availability;
use crate::error::AppError;
use crate::models::courier::{Courier, CourierStats, GeoPoint, Presence};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id", get(get_courier))
        .route("/couriers/:id/presence", patch(update_presence))
        .route("/couriers/:id/location", patch(update_location))
        .route("/couriers/:id/availability", get(check_availability))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub fleet_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_presence")]
    pub presence: Presence,
    #[serde(default)]
    pub avg_rating: f64,
    #[serde(default)]
    pub rating_count: u32,
}

fn default_presence() -> Presence {
    Presence::Offline
}

#[derive(Deserialize)]
pub struct UpdatePresenceRequest {
    pub presence: Presence,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub courier_id: Uuid,
    pub available: bool,
    #[serde(flatten)]
    pub verdict: Availability,
    pub rating: f64,
    pub rating_count: u32,
    pub active_orders: u32,
    pub avg_delivery_min: Option<f64>,
}

fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::Validation(format!(
            "coordinates out of range: ({}, {})",
            point.lat, point.lng
        )));
    }
    Ok(())
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        validate_point(location)?;
    }
    if !(0.0..=5.0).contains(&payload.avg_rating) {
        return Err(AppError::Validation(
            "avg_rating must be between 0 and 5".to_string(),
        ));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        fleet_id: payload.fleet_id,
        location: payload.location,
        presence: payload.presence,
        stats: CourierStats {
            avg_rating: payload.avg_rating,
            rating_count: payload.rating_count,
            ..CourierStats::default()
        },
        miss_count: 0,
        updated_at: Utc::now(),
    };

    state.couriers.insert(courier.id, courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let mut couriers: Vec<Courier> = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    couriers.sort_by_key(|courier| courier.id);
    Json(couriers)
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(state.courier(id)?))
}

async fn update_presence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePresenceRequest>,
) -> Result<Json<Courier>, AppError> {
    let mut courier = state
        .couriers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

    courier.presence = payload.presence;
    courier.updated_at = Utc::now();

    Ok(Json(courier.clone()))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Courier>, AppError> {
    validate_point(&payload.location)?;

    let mut courier = state
        .couriers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

    courier.location = Some(payload.location);
    courier.updated_at = Utc::now();

    Ok(Json(courier.clone()))
}

async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let courier = state.courier(id)?;
    let activity = state.courier_activity().remove(&id).unwrap_or_default();
    let verdict = state.availability.check(&courier, activity.active_orders);

    Ok(Json(AvailabilityResponse {
        courier_id: id,
        available: verdict.is_available(),
        verdict,
        rating: courier.stats.avg_rating,
        rating_count: courier.stats.rating_count,
        active_orders: activity.active_orders,
        avg_delivery_min: activity.avg_delivery_min(),
    }))
}
