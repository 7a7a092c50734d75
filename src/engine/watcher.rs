use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::assignment::offer_to_best;
use crate::engine::lifecycle::transition;
use crate::error::AppError;
use crate::models::assignment::Strategy;
use crate::models::event::DispatchEvent;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpiryOutcome {
    Reoffered { courier_id: Uuid },
    ReturnedPending,
    Exhausted,
    /// Accepted or cancelled before the watcher got to it.
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub expired: usize,
    pub reoffered: usize,
    pub returned_pending: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn run_acceptance_watcher(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let interval_secs = state.settings.watcher_interval_secs.max(1);
    info!(interval_secs, "acceptance watcher started");

    loop {
        tokio::select! {
            _ = sleep(Duration::from_secs(interval_secs)) => {
                let report = run_watch_pass(&state, Utc::now());
                if report.expired > 0 {
                    info!(
                        expired = report.expired,
                        reoffered = report.reoffered,
                        returned_pending = report.returned_pending,
                        exhausted = report.exhausted,
                        failed = report.failed,
                        "acceptance watcher pass complete"
                    );
                }
            }
            _ = shutdown.recv() => {
                info!("acceptance watcher received shutdown signal");
                break;
            }
        }
    }
}

/// Reaps every offer whose deadline is at or before `now`.
pub fn run_watch_pass(state: &AppState, now: DateTime<Utc>) -> PassReport {
    let mut expired: Vec<(DateTime<Utc>, Uuid)> = state
        .orders
        .iter()
        .filter_map(|entry| {
            let order = entry.value();
            match (order.status, order.offer_deadline) {
                (OrderStatus::Offered, Some(deadline)) if deadline <= now => {
                    Some((deadline, order.id))
                }
                _ => None,
            }
        })
        .collect();
    expired.sort();

    let mut report = PassReport {
        expired: expired.len(),
        ..PassReport::default()
    };

    for (_, order_id) in expired {
        match expire_offer(state, order_id, now) {
            Ok(ExpiryOutcome::Reoffered { .. }) => report.reoffered += 1,
            Ok(ExpiryOutcome::ReturnedPending) => report.returned_pending += 1,
            Ok(ExpiryOutcome::Exhausted) => report.exhausted += 1,
            Ok(ExpiryOutcome::Skipped) => report.skipped += 1,
            Err(err) => {
                report.failed += 1;
                state.metrics.watcher_failures_total.inc();
                error!(order_id = %order_id, error = %err, "failed to process expired offer");
            }
        }
    }

    report
}

pub fn expire_offer(
    state: &AppState,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ExpiryOutcome, AppError> {
    let (missed_courier, snapshot) = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        let still_expired = order.status == OrderStatus::Offered
            && order.offer_deadline.is_some_and(|deadline| deadline <= now);
        if !still_expired {
            return Ok(ExpiryOutcome::Skipped);
        }

        let missed = order.assigned_courier;
        transition(order, OrderStatus::Pending, now)?;
        (missed, order.clone())
    };
    state.metrics.offer_timeouts_total.inc();

    if let Some(courier_id) = missed_courier {
        match state.couriers.get_mut(&courier_id) {
            Some(mut courier) => {
                courier.miss_count += 1;
                let miss_count = courier.miss_count;
                drop(courier);

                info!(
                    order_id = %order_id,
                    courier_id = %courier_id,
                    miss_count,
                    "courier missed offer"
                );
                state.publish(DispatchEvent::OfferExpired {
                    order_id,
                    courier_id,
                    miss_count,
                });
            }
            None => warn!(courier_id = %courier_id, "missed offer by unknown courier"),
        }
    }

    if snapshot.attempt_count >= state.settings.max_assignment_attempts {
        warn!(
            order_id = %order_id,
            attempts = snapshot.attempt_count,
            "assignment attempts exhausted; order returned to PENDING"
        );
        return Ok(ExpiryOutcome::Exhausted);
    }

    let exclude: Vec<Uuid> = missed_courier.into_iter().collect();
    match offer_to_best(state, &snapshot, Strategy::Hybrid, &exclude, now)? {
        Some(detail) => Ok(ExpiryOutcome::Reoffered {
            courier_id: detail.courier_id,
        }),
        // A cascade with nobody to offer to does not consume an attempt.
        None => {
            warn!(
                order_id = %order_id,
                attempts = snapshot.attempt_count,
                "no couriers available for cascade; order left PENDING"
            );
            Ok(ExpiryOutcome::ReturnedPending)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, Utc};
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{ExpiryOutcome, expire_offer, run_acceptance_watcher, run_watch_pass};
    use crate::engine::assignment::assign_order;
    use crate::engine::assignment::tests::{add_courier, add_pending_order, state};
    use crate::engine::lifecycle::accept_order;
    use crate::models::assignment::Strategy;
    use crate::models::order::OrderStatus;

    #[test]
    fn expired_offer_cascades_to_next_courier() {
        let state = state();
        let first = add_courier(&state, 1, 1.0);
        let second = add_courier(&state, 2, 5.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();
        assert_eq!(state.order(order_id).unwrap().assigned_courier, Some(first));

        let later = placed + Duration::seconds(91);
        let report = run_watch_pass(&state, later);

        assert_eq!(report.expired, 1);
        assert_eq!(report.reoffered, 1);
        let order = state.order(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Offered);
        assert_eq!(order.assigned_courier, Some(second));
        assert_eq!(order.offer_deadline, Some(later + Duration::seconds(90)));
        assert_eq!(order.attempt_count, 2);
        assert_eq!(state.courier(first).unwrap().miss_count, 1);
        assert_eq!(state.courier(second).unwrap().miss_count, 0);
    }

    #[test]
    fn expired_offer_without_candidates_returns_to_pending() {
        let state = state();
        let only = add_courier(&state, 1, 1.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();

        let report = run_watch_pass(&state, placed + Duration::seconds(120));

        assert_eq!(report.returned_pending, 1);
        let order = state.order(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.assigned_courier.is_none());
        assert!(order.offer_deadline.is_none());
        assert_eq!(order.attempt_count, 1);
        assert_eq!(state.courier(only).unwrap().miss_count, 1);
    }

    #[test]
    fn exhausted_order_is_parked_in_pending() {
        let state = state();
        let courier = add_courier(&state, 1, 1.0);
        add_courier(&state, 2, 2.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();
        state.orders.get_mut(&order_id).unwrap().attempt_count = 3;

        let report = run_watch_pass(&state, placed + Duration::seconds(91));

        assert_eq!(report.exhausted, 1);
        let order = state.order(order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.assigned_courier.is_none());
        assert!(order.offer_deadline.is_none());
        assert_eq!(state.courier(courier).unwrap().miss_count, 1);

        // Nothing left for later passes to pick up.
        let next = run_watch_pass(&state, placed + Duration::seconds(300));
        assert_eq!(next.expired, 0);
        assert_eq!(state.order(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn live_offers_are_left_alone() {
        let state = state();
        let courier = add_courier(&state, 1, 1.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();

        let report = run_watch_pass(&state, placed + Duration::seconds(30));

        assert_eq!(report.expired, 0);
        assert_eq!(state.order(order_id).unwrap().status, OrderStatus::Offered);
        assert_eq!(state.courier(courier).unwrap().miss_count, 0);
    }

    #[test]
    fn accepted_offer_is_skipped_by_the_watcher() {
        let state = state();
        let courier = add_courier(&state, 1, 1.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();
        accept_order(&state, order_id, courier, placed + Duration::seconds(89)).unwrap();

        let outcome = expire_offer(&state, order_id, placed + Duration::seconds(91)).unwrap();

        assert_eq!(outcome, ExpiryOutcome::Skipped);
        assert_eq!(state.order(order_id).unwrap().status, OrderStatus::Accepted);
        assert_eq!(state.courier(courier).unwrap().miss_count, 0);
    }

    #[test]
    fn expired_offer_cannot_be_accepted_after_the_watcher_reset_it() {
        let state = state();
        let courier = add_courier(&state, 1, 1.0);
        let order_id = add_pending_order(&state);
        let placed = Utc::now();
        assign_order(&state, order_id, Strategy::Hybrid, placed).unwrap();

        run_watch_pass(&state, placed + Duration::seconds(90));

        let err = accept_order(&state, order_id, courier, placed + Duration::seconds(90));
        assert!(matches!(err, Err(crate::error::AppError::InvalidState(_))));
    }

    #[test]
    fn one_failing_order_does_not_stop_the_pass() {
        let state = state();
        let fleet_a = Uuid::from_u128(0xA);
        let fleet_b = Uuid::from_u128(0xB);
        let a1 = add_courier(&state, 1, 1.0);
        let a2 = add_courier(&state, 2, 2.0);
        let b1 = add_courier(&state, 3, 1.0);
        let b2 = add_courier(&state, 4, 2.0);
        for (courier, fleet) in [(a1, fleet_a), (a2, fleet_a), (b1, fleet_b), (b2, fleet_b)] {
            state.couriers.get_mut(&courier).unwrap().fleet_id = Some(fleet);
        }

        let order_a = add_pending_order(&state);
        let order_b = add_pending_order(&state);
        state.orders.get_mut(&order_a).unwrap().fleet_id = Some(fleet_a);
        state.orders.get_mut(&order_b).unwrap().fleet_id = Some(fleet_b);

        let placed = Utc::now();
        assign_order(&state, order_a, Strategy::Hybrid, placed).unwrap();
        assign_order(&state, order_b, Strategy::Hybrid, placed).unwrap();

        // Poison the only cascade target for order A.
        let lock = state.courier_lock(a2);
        let _ = thread::spawn(move || {
            let _guard = lock.lock().unwrap();
            panic!("poisoning courier lock");
        })
        .join();

        let report = run_watch_pass(&state, placed + Duration::seconds(91));

        assert_eq!(report.expired, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.reoffered, 1);
        assert_eq!(state.order(order_b).unwrap().assigned_courier, Some(b2));
        assert_eq!(state.courier(a1).unwrap().miss_count, 1);
        assert_eq!(state.courier(b1).unwrap().miss_count, 1);
    }

    #[tokio::test]
    async fn watcher_stops_on_shutdown() {
        let state = Arc::new(state());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_acceptance_watcher(state, shutdown_rx));

        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop promptly")
            .unwrap();
    }
}
