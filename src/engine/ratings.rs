use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RatingReceipt {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub rating: u8,
    pub avg_rating: f64,
    pub rating_count: u32,
}

/// Folds one 1-5 rating into a running average.
pub fn fold_rating(avg: f64, count: u32, rating: u8) -> (f64, u32) {
    let count = count + 1;
    let avg = avg + (f64::from(rating) - avg) / f64::from(count);
    (avg, count)
}

/// Records the merchant's rating of a delivered order against its courier.
///
/// Each order can be rated once; the courier's average and count feed the
/// rating gate and the rating score from the next evaluation on.
pub fn rate_delivery(
    state: &AppState,
    order_id: Uuid,
    actor: Actor,
    rating: u8,
    now: DateTime<Utc>,
) -> Result<RatingReceipt, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }

    let courier_id = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        let owner = order
            .merchant_id
            .is_some_and(|merchant_id| actor.is_merchant(merchant_id));
        if !(owner || actor.is_admin()) {
            return Err(AppError::Forbidden(
                "only the order's merchant or an admin can rate a delivery".to_string(),
            ));
        }
        if order.status != OrderStatus::Delivered {
            return Err(AppError::InvalidState(format!(
                "only DELIVERED orders can be rated (status: {})",
                order.status
            )));
        }
        if order.rating.is_some() {
            return Err(AppError::InvalidState(format!(
                "order {order_id} has already been rated"
            )));
        }
        let Some(courier_id) = order.assigned_courier else {
            return Err(AppError::InvalidState(format!(
                "order {order_id} has no courier to rate"
            )));
        };

        order.rating = Some(rating);
        order.version += 1;
        courier_id
    };

    let Some(mut courier) = state.couriers.get_mut(&courier_id) else {
        warn!(order_id = %order_id, courier_id = %courier_id, "rating for unknown courier");
        return Err(AppError::NotFound(format!("courier {courier_id} not found")));
    };
    let (avg_rating, rating_count) =
        fold_rating(courier.stats.avg_rating, courier.stats.rating_count, rating);
    courier.stats.avg_rating = avg_rating;
    courier.stats.rating_count = rating_count;
    courier.updated_at = now;
    drop(courier);

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        rating,
        avg_rating,
        rating_count,
        "delivery rated"
    );

    Ok(RatingReceipt {
        order_id,
        courier_id,
        rating,
        avg_rating,
        rating_count,
    })
}
