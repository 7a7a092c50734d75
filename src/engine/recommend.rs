use serde::Serialize;
use uuid::Uuid;

use crate::engine::assignment::CandidatePool;
use crate::error::AppError;
use crate::models::assignment::{ScoredCandidate, Strategy};
use crate::models::courier::GeoPoint;
use crate::state::AppState;

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub order_id: Uuid,
    pub pickup: GeoPoint,
    pub strategy: Strategy,
    pub recommendations: Vec<ScoredCandidate>,
    pub top: Option<ScoredCandidate>,
}

/// Ranked suggestions for manual dispatch. Never mutates anything.
pub fn recommend(
    state: &AppState,
    order_id: Uuid,
    strategy: Strategy,
    limit: usize,
) -> Result<Recommendations, AppError> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }

    let order = state.order(order_id)?;
    let mut ranked = CandidatePool::snapshot(state, order.fleet_id).rank(
        &state.scoring,
        &state.availability,
        &order.pickup,
        strategy,
        &[],
    );
    ranked.truncate(limit);

    Ok(Recommendations {
        order_id,
        pickup: order.pickup,
        strategy,
        top: ranked.first().cloned(),
        recommendations: ranked,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::recommend;
    use crate::engine::assignment::tests::{PICKUP, add_courier, add_pending_order, state};
    use crate::engine::assignment::{assign_order, find_best};
    use crate::error::AppError;
    use crate::models::assignment::Strategy;
    use crate::models::courier::Presence;

    #[test]
    fn top_recommendation_matches_automatic_pick() {
        let state = state();
        for (seed, km) in [(1, 12.0), (2, 3.0), (3, 7.5), (4, 0.8), (5, 25.0), (6, 2.2)] {
            add_courier(&state, seed, km);
        }
        let order_id = add_pending_order(&state);

        for strategy in [Strategy::Hybrid, Strategy::Proximity, Strategy::HighestRating] {
            let recs = recommend(&state, order_id, strategy, 5).unwrap();
            let best = find_best(&state, &PICKUP, strategy, None, &[]).unwrap();
            assert_eq!(recs.top.unwrap().courier_id, best.courier_id);
            assert_eq!(recs.recommendations.len(), 5);
        }
    }

    #[test]
    fn recommendations_leave_the_order_untouched() {
        let state = state();
        add_courier(&state, 1, 1.0);
        let order_id = add_pending_order(&state);
        let before = state.order(order_id).unwrap();

        recommend(&state, order_id, Strategy::Hybrid, 3).unwrap();

        let after = state.order(order_id).unwrap();
        assert_eq!(after.version, before.version);
        assert!(after.assigned_courier.is_none());

        // The order is still assignable to the recommended courier.
        assert!(assign_order(&state, order_id, Strategy::Hybrid, Utc::now()).unwrap().success);
    }

    #[test]
    fn unavailable_couriers_are_not_recommended() {
        let state = state();
        let on_break = add_courier(&state, 1, 0.5);
        state.couriers.get_mut(&on_break).unwrap().presence = Presence::Break;
        let order_id = add_pending_order(&state);

        let recs = recommend(&state, order_id, Strategy::Hybrid, 5).unwrap();
        assert!(recs.recommendations.is_empty());
        assert!(recs.top.is_none());
    }

    #[test]
    fn limit_out_of_range_is_rejected() {
        let state = state();
        let order_id = add_pending_order(&state);
        assert!(matches!(
            recommend(&state, order_id, Strategy::Hybrid, 0),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            recommend(&state, order_id, Strategy::Hybrid, 11),
            Err(AppError::Validation(_))
        ));
    }
}
