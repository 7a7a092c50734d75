use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::availability::AvailabilityChecker;
use crate::engine::lifecycle::transition;
use crate::engine::scoring::{ScoringEngine, ScoringInputs};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::assignment::{
    AssignmentOutcome, BatchEntry, BatchReport, OfferDetail, ScoredCandidate, Strategy,
};
use crate::models::courier::{Courier, GeoPoint};
use crate::models::event::DispatchEvent;
use crate::models::order::{Order, OrderStatus};
use crate::state::{AppState, CourierActivity};

pub const MAX_BATCH_SIZE: usize = 100;

/// Rating assumed for couriers nobody has rated yet.
const NEUTRAL_RATING: f64 = 3.5;

/// Couriers plus their derived activity, captured once per selection.
pub struct CandidatePool {
    couriers: Vec<Courier>,
    activity: HashMap<Uuid, CourierActivity>,
}

impl CandidatePool {
    pub fn new(couriers: Vec<Courier>, activity: HashMap<Uuid, CourierActivity>) -> Self {
        Self { couriers, activity }
    }

    pub fn snapshot(state: &AppState, fleet_id: Option<Uuid>) -> Self {
        let couriers = state
            .couriers
            .iter()
            .filter(|entry| fleet_id.is_none() || entry.value().fleet_id == fleet_id)
            .map(|entry| entry.value().clone())
            .collect();

        Self::new(couriers, state.courier_activity())
    }

    /// Available couriers not in `exclude`, best first.
    ///
    /// Equal scores are ordered by ascending courier id so the result never
    /// depends on store iteration order.
    pub fn rank(
        &self,
        scoring: &ScoringEngine,
        checker: &AvailabilityChecker,
        pickup: &GeoPoint,
        strategy: Strategy,
        exclude: &[Uuid],
    ) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> = self
            .couriers
            .iter()
            .filter(|courier| !exclude.contains(&courier.id))
            .filter_map(|courier| {
                let activity = self.activity.get(&courier.id).copied().unwrap_or_default();
                if !checker.is_available(courier, activity.active_orders) {
                    return None;
                }

                let distance_km = courier
                    .location
                    .as_ref()
                    .map(|location| haversine_km(pickup, location));
                let avg_rating = if courier.stats.rating_count > 0 {
                    courier.stats.avg_rating
                } else {
                    NEUTRAL_RATING
                };
                let inputs = ScoringInputs {
                    distance_km,
                    avg_rating,
                    active_orders: activity.active_orders,
                    avg_delivery_min: activity.avg_delivery_min(),
                };
                let (score, breakdown) = scoring.score(strategy, &inputs);

                Some(ScoredCandidate {
                    courier_id: courier.id,
                    courier_name: courier.name.clone(),
                    distance_km,
                    score,
                    breakdown,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.courier_id.cmp(&b.courier_id))
        });
        ranked
    }
}

pub fn find_best(
    state: &AppState,
    pickup: &GeoPoint,
    strategy: Strategy,
    fleet_id: Option<Uuid>,
    exclude: &[Uuid],
) -> Option<ScoredCandidate> {
    CandidatePool::snapshot(state, fleet_id)
        .rank(
            &state.scoring,
            &state.availability,
            pickup,
            strategy,
            exclude,
        )
        .into_iter()
        .next()
}

/// Picks the best courier for a PENDING order and commits the offer.
///
/// `order` is the snapshot the caller decided on; the commit fails with
/// `InvalidState` if the stored order moved on since.
pub(crate) fn offer_to_best(
    state: &AppState,
    order: &Order,
    strategy: Strategy,
    exclude: &[Uuid],
    now: DateTime<Utc>,
) -> Result<Option<OfferDetail>, AppError> {
    let mut excluded = exclude.to_vec();

    loop {
        let Some(best) = find_best(state, &order.pickup, strategy, order.fleet_id, &excluded)
        else {
            return Ok(None);
        };

        if let Some(detail) = commit_offer(state, order, &best, now)? {
            return Ok(Some(detail));
        }
        // Lost the load gate to a concurrent offer; try the next one.
        excluded.push(best.courier_id);
    }
}

fn commit_offer(
    state: &AppState,
    snapshot: &Order,
    candidate: &ScoredCandidate,
    now: DateTime<Utc>,
) -> Result<Option<OfferDetail>, AppError> {
    let lock = state.courier_lock(candidate.courier_id);
    let _guard = lock
        .lock()
        .map_err(|_| AppError::Internal("courier lock poisoned".to_string()))?;

    let Ok(courier) = state.courier(candidate.courier_id) else {
        return Ok(None);
    };
    let load = state.active_load(candidate.courier_id);
    if !state.availability.is_available(&courier, load) {
        debug!(
            courier_id = %candidate.courier_id,
            active_orders = load,
            "candidate became unavailable before offer commit"
        );
        return Ok(None);
    }

    let deadline = Duration::try_seconds(state.settings.acceptance_window_secs)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| {
            AppError::Internal(format!(
                "acceptance window of {}s overflows the offer deadline",
                state.settings.acceptance_window_secs
            ))
        })?;
    let offered = {
        let mut entry = state
            .orders
            .get_mut(&snapshot.id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", snapshot.id)))?;
        let order = entry.value_mut();

        if order.version != snapshot.version || order.status != OrderStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "order {} changed while assigning (status: {})",
                order.id, order.status
            )));
        }

        transition(order, OrderStatus::Offered, now)?;
        order.assigned_courier = Some(candidate.courier_id);
        order.offer_deadline = Some(deadline);
        order.attempt_count += 1;
        order.clone()
    };

    let utilization = f64::from(load + 1) / f64::from(state.settings.max_active_orders.max(1));
    state
        .metrics
        .courier_utilization
        .with_label_values(&[&candidate.courier_id.to_string()])
        .set(utilization.min(1.0));

    info!(
        order_id = %offered.id,
        courier_id = %candidate.courier_id,
        score = candidate.score,
        attempt = offered.attempt_count,
        "order offered"
    );
    state.publish(DispatchEvent::Offered {
        order_id: offered.id,
        courier_id: candidate.courier_id,
        merchant_id: offered.merchant_id,
        deadline,
        attempt: offered.attempt_count,
        score: candidate.score,
    });

    Ok(Some(OfferDetail {
        courier_id: candidate.courier_id,
        courier_name: candidate.courier_name.clone(),
        distance_km: candidate.distance_km,
        score: candidate.score,
        breakdown: candidate.breakdown.clone(),
        deadline,
        attempt: offered.attempt_count,
    }))
}

pub fn assign_order(
    state: &AppState,
    order_id: Uuid,
    strategy: Strategy,
    now: DateTime<Utc>,
) -> Result<AssignmentOutcome, AppError> {
    let order = state.order(order_id)?;
    if order.status != OrderStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "order status is {}, only PENDING orders can be assigned",
            order.status
        )));
    }

    let start = Instant::now();
    let result = offer_to_best(state, &order, strategy, &[], now);
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(Some(detail)) => {
            state.metrics.record_assignment("offered", elapsed);
            Ok(AssignmentOutcome {
                order_id,
                success: true,
                message: format!(
                    "order sent to courier {}, awaiting acceptance ({}s)",
                    detail.courier_name, state.settings.acceptance_window_secs
                ),
                detail: Some(detail),
            })
        }
        Ok(None) => {
            state.metrics.record_assignment("no_candidates", elapsed);
            warn!(order_id = %order_id, strategy = %strategy, "no available couriers");
            Ok(AssignmentOutcome {
                order_id,
                success: false,
                message: "no available couriers found".to_string(),
                detail: None,
            })
        }
        Err(err) => {
            state.metrics.record_assignment("error", elapsed);
            Err(err)
        }
    }
}

/// Assigns each order independently; one failure never stops the batch.
pub fn batch_assign(
    state: &AppState,
    order_ids: &[Uuid],
    strategy: Strategy,
    now: DateTime<Utc>,
) -> Result<BatchReport, AppError> {
    if order_ids.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "maximum {MAX_BATCH_SIZE} orders per batch, got {}",
            order_ids.len()
        )));
    }

    let results: Vec<BatchEntry> = order_ids
        .iter()
        .map(|&order_id| match assign_order(state, order_id, strategy, now) {
            Ok(outcome) => BatchEntry {
                order_id,
                success: outcome.success,
                message: outcome.message,
                courier_id: outcome.detail.map(|detail| detail.courier_id),
            },
            Err(err) => BatchEntry {
                order_id,
                success: false,
                message: err.to_string(),
                courier_id: None,
            },
        })
        .collect();

    let successful = results.iter().filter(|entry| entry.success).count();
    Ok(BatchReport {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        results,
    })
}
