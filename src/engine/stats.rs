use serde::Serialize;
use uuid::Uuid;

use crate::models::courier::Presence;
use crate::models::order::OrderStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AssignmentStats {
    pub pending: usize,
    pub offered: usize,
    pub accepted: usize,
    pub picked_up: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub cancelled: usize,
    pub online_couriers: usize,
    /// Share of live orders a courier has taken, as a percentage with one decimal.
    pub assignment_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FleetStats {
    pub fleet_id: Uuid,
    pub couriers: usize,
    pub online_couriers: usize,
    pub active_orders: usize,
    pub total_misses: u64,
}

pub fn assignment_stats(state: &AppState) -> AssignmentStats {
    let mut stats = AssignmentStats::default();

    for entry in state.orders.iter() {
        let counter = match entry.value().status {
            OrderStatus::Pending => &mut stats.pending,
            OrderStatus::Offered => &mut stats.offered,
            OrderStatus::Accepted => &mut stats.accepted,
            OrderStatus::PickedUp => &mut stats.picked_up,
            OrderStatus::InTransit => &mut stats.in_transit,
            OrderStatus::Delivered => &mut stats.delivered,
            OrderStatus::Cancelled => &mut stats.cancelled,
        };
        *counter += 1;
    }

    stats.online_couriers = state
        .couriers
        .iter()
        .filter(|entry| entry.value().presence == Presence::Online)
        .count();

    let taken = stats.accepted + stats.picked_up + stats.in_transit + stats.delivered;
    let live = taken + stats.pending;
    if live > 0 {
        stats.assignment_rate = (taken as f64 / live as f64 * 1000.0).round() / 10.0;
    }

    stats
}

pub fn fleet_stats(state: &AppState, fleet_id: Uuid) -> FleetStats {
    let mut stats = FleetStats {
        fleet_id,
        ..FleetStats::default()
    };
    let mut members = Vec::new();

    for entry in state.couriers.iter() {
        let courier = entry.value();
        if courier.fleet_id != Some(fleet_id) {
            continue;
        }
        stats.couriers += 1;
        stats.total_misses += u64::from(courier.miss_count);
        if courier.presence == Presence::Online {
            stats.online_couriers += 1;
        }
        members.push(courier.id);
    }

    stats.active_orders = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.status.is_active()
                && order
                    .assigned_courier
                    .is_some_and(|courier_id| members.contains(&courier_id))
        })
        .count();

    stats
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{assignment_stats, fleet_stats};
    use crate::engine::assignment::assign_order;
    use crate::engine::assignment::tests::{add_courier, add_pending_order, state};
    use crate::engine::lifecycle::accept_order;
    use crate::models::assignment::Strategy;
    use crate::models::courier::Presence;

    #[test]
    fn counts_orders_by_status_and_rate() {
        let state = state();
        let courier = add_courier(&state, 1, 1.0);
        let offline = add_courier(&state, 2, 1.0);
        state.couriers.get_mut(&offline).unwrap().presence = Presence::Offline;

        let accepted = add_pending_order(&state);
        add_pending_order(&state);
        add_pending_order(&state);
        assign_order(&state, accepted, Strategy::Hybrid, Utc::now()).unwrap();
        accept_order(&state, accepted, courier, Utc::now()).unwrap();

        let stats = assignment_stats(&state);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.online_couriers, 1);
        assert_eq!(stats.assignment_rate, 33.3);
    }

    #[test]
    fn empty_store_has_zero_rate() {
        let stats = assignment_stats(&state());
        assert_eq!(stats.assignment_rate, 0.0);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn fleet_stats_only_count_members() {
        let state = state();
        let fleet = Uuid::from_u128(0xF);
        let member = add_courier(&state, 1, 1.0);
        add_courier(&state, 2, 0.5);
        {
            let mut courier = state.couriers.get_mut(&member).unwrap();
            courier.fleet_id = Some(fleet);
            courier.miss_count = 4;
        }
        let order_id = add_pending_order(&state);
        state.orders.get_mut(&order_id).unwrap().fleet_id = Some(fleet);
        assign_order(&state, order_id, Strategy::Hybrid, Utc::now()).unwrap();

        let stats = fleet_stats(&state, fleet);
        assert_eq!(stats.couriers, 1);
        assert_eq!(stats.online_couriers, 1);
        assert_eq!(stats.active_orders, 1);
        assert_eq!(stats.total_misses, 4);
    }
}
