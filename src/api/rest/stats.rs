use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::stats::{assignment_stats, fleet_stats, AssignmentStats, FleetStats};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats/assignment", get(get_assignment_stats))
        .route("/stats/fleets/:fleet_id", get(get_fleet_stats))
}

async fn get_assignment_stats(State(state): State<Arc<AppState>>) -> Json<AssignmentStats> {
    Json(assignment_stats(&state))
}

async fn get_fleet_stats(
    State(state): State<Arc<AppState>>,
    Path(fleet_id): Path<Uuid>,
) -> Json<FleetStats> {
    Json(fleet_stats(&state, fleet_id))
}
