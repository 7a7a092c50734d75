use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::event::DispatchEvent;
use crate::models::order::{Order, OrderStatus, Refund};
use crate::state::AppState;

/// Pure table lookup.
pub fn is_valid(from: OrderStatus, to: OrderStatus) -> bool {
    from.can_transition_to(to)
}

/// Moves `order` to `to` if the table allows it. Every status write goes through here.
pub(crate) fn transition(
    order: &mut Order,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<OrderStatus, AppError> {
    let from = order.status;
    if !is_valid(from, to) {
        return Err(AppError::InvalidTransition { from, to });
    }

    order.status = to;
    order.version += 1;

    match to {
        OrderStatus::Pending => {
            order.assigned_courier = None;
            order.offer_deadline = None;
        }
        OrderStatus::Offered => order.offered_at = Some(now),
        OrderStatus::Accepted => {
            order.offer_deadline = None;
            order.accepted_at = Some(now);
        }
        OrderStatus::PickedUp => order.picked_up_at = Some(now),
        OrderStatus::InTransit => {}
        OrderStatus::Delivered => order.delivered_at = Some(now),
        OrderStatus::Cancelled => {
            order.assigned_courier = None;
            order.offer_deadline = None;
            order.cancelled_at = Some(now);
        }
    }

    Ok(from)
}

/// Share of the price kept when cancelling from `status`. None for terminal states.
pub fn penalty_percent(status: OrderStatus) -> Option<u8> {
    match status {
        OrderStatus::Pending | OrderStatus::Offered | OrderStatus::Accepted => Some(0),
        OrderStatus::PickedUp => Some(10),
        OrderStatus::InTransit => Some(25),
        OrderStatus::Delivered | OrderStatus::Cancelled => None,
    }
}

pub fn refund_for(status: OrderStatus, price: f64) -> Result<Refund, AppError> {
    let penalty = penalty_percent(status).ok_or(AppError::InvalidTransition {
        from: status,
        to: OrderStatus::Cancelled,
    })?;

    Ok(Refund {
        previous_status: status,
        penalty_percent: penalty,
        refund_amount: price * f64::from(100 - penalty) / 100.0,
    })
}

/// The offered courier takes the job inside the acceptance window.
pub fn accept_order(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let accepted = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        if order.status != OrderStatus::Offered {
            return Err(AppError::InvalidState(format!(
                "order {order_id} is not awaiting acceptance (status: {})",
                order.status
            )));
        }
        if order.assigned_courier != Some(courier_id) {
            return Err(AppError::Forbidden(format!(
                "courier {courier_id} is not the offered courier for order {order_id}"
            )));
        }
        if order.offer_deadline.is_some_and(|deadline| now > deadline) {
            return Err(AppError::Expired(format!(
                "acceptance window for order {order_id} has closed"
            )));
        }

        transition(order, OrderStatus::Accepted, now)?;
        order.clone()
    };

    info!(order_id = %order_id, courier_id = %courier_id, "offer accepted");
    state.publish(DispatchEvent::Accepted {
        order_id,
        courier_id,
        merchant_id: accepted.merchant_id,
    });

    Ok(accepted)
}

/// Admin hands a pending order straight to a courier, skipping the offer window.
pub fn manual_assign(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only an admin can assign a courier directly".to_string(),
        ));
    }
    state.courier(courier_id)?;

    let assigned = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        if order.status != OrderStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "cannot assign order with status {}, only PENDING orders can be assigned",
                order.status
            )));
        }

        transition(order, OrderStatus::Accepted, now)?;
        order.assigned_courier = Some(courier_id);
        order.clone()
    };

    info!(order_id = %order_id, courier_id = %courier_id, "order assigned manually");
    state.publish(DispatchEvent::StatusChanged {
        order_id,
        courier_id: Some(courier_id),
        merchant_id: assigned.merchant_id,
        from: OrderStatus::Pending,
        to: OrderStatus::Accepted,
    });

    Ok(assigned)
}

/// Courier progress: PICKED_UP, IN_TRANSIT, DELIVERED.
pub fn update_status(
    state: &AppState,
    order_id: Uuid,
    actor: Actor,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let dedicated = match to {
        OrderStatus::Offered | OrderStatus::Pending => Some("assign"),
        OrderStatus::Accepted => Some("accept"),
        OrderStatus::Cancelled => Some("cancel"),
        OrderStatus::PickedUp | OrderStatus::InTransit | OrderStatus::Delivered => None,
    };
    if let Some(operation) = dedicated {
        return Err(AppError::Validation(format!(
            "status {to} is set through the {operation} operation"
        )));
    }

    let (from, updated) = {
        let mut entry = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let order = entry.value_mut();

        if !is_valid(order.status, to) {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to,
            });
        }
        let allowed = actor.is_admin()
            || order
                .assigned_courier
                .is_some_and(|courier_id| actor.is_courier(courier_id));
        if !allowed {
            return Err(AppError::Forbidden(
                "only the assigned courier or an admin can update order status".to_string(),
            ));
        }

        let from = transition(order, to, now)?;
        (from, order.clone())
    };

    if to == OrderStatus::Delivered {
        if let Some(courier_id) = updated.assigned_courier {
            match state.couriers.get_mut(&courier_id) {
                Some(mut courier) => {
                    courier.stats.completed_jobs += 1;
                    courier.stats.total_earnings += updated.price;
                    courier.updated_at = now;
                }
                None => warn!(courier_id = %courier_id, "delivered by unknown courier"),
            }
        }
    }

    info!(order_id = %order_id, from = %from, to = %to, "order status updated");
    state.publish(DispatchEvent::StatusChanged {
        order_id,
        courier_id: updated.assigned_courier,
        merchant_id: updated.merchant_id,
        from,
        to,
    });

    Ok(updated)
}

/// Cancels by the owning merchant or an admin and records the refund owed.
pub fn cancel_order(
    state: &AppState,
    order_id: Uuid,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(Order, Refund), AppError> {
    let (courier_id, refund, cancelled) = {
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
                "only the order's merchant or an admin can cancel".to_string(),
            ));
        }

        let refund = refund_for(order.status, order.price)?;
        let courier_id = order.assigned_courier;

        transition(order, OrderStatus::Cancelled, now)?;
        order.cancellation_reason = Some(reason.to_string());
        order.refund_amount = Some(refund.refund_amount);

        (courier_id, refund, order.clone())
    };

    info!(
        order_id = %order_id,
        from = %refund.previous_status,
        refund = refund.refund_amount,
        reason,
        "order cancelled"
    );
    state.publish(DispatchEvent::Cancelled {
        order_id,
        courier_id,
        merchant_id: cancelled.merchant_id,
        from: refund.previous_status,
        refund_amount: refund.refund_amount,
    });

    Ok((cancelled, refund))
}
