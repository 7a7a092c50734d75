use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::engine::availability::AvailabilityChecker;
use crate::engine::scoring::ScoringEngine;
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::event::DispatchEvent;
use crate::models::order::{Order, OrderStatus};
use crate::observability::metrics::Metrics;

/// Per-courier figures derived from the order store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CourierActivity {
    pub active_orders: u32,
    delivered: u32,
    delivery_minutes_total: f64,
}

impl CourierActivity {
    pub fn avg_delivery_min(&self) -> Option<f64> {
        (self.delivered > 0).then(|| self.delivery_minutes_total / self.delivered as f64)
    }
}

pub struct AppState {
    pub couriers: DashMap<Uuid, Courier>,
    pub orders: DashMap<Uuid, Order>,
    courier_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
    pub settings: DispatchSettings,
    pub scoring: ScoringEngine,
    pub availability: AvailabilityChecker,
}

impl AppState {
    pub fn new(settings: DispatchSettings, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            couriers: DashMap::new(),
            orders: DashMap::new(),
            courier_locks: DashMap::new(),
            events_tx,
            metrics: Metrics::new(),
            scoring: ScoringEngine::new(&settings),
            availability: AvailabilityChecker::new(&settings),
            settings,
        }
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn courier(&self, id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    /// Serialises offer commits for one courier so the load gate cannot be raced.
    pub fn courier_lock(&self, courier_id: Uuid) -> Arc<Mutex<()>> {
        self.courier_locks.entry(courier_id).or_default().value().clone()
    }

    pub fn publish(&self, event: DispatchEvent) {
        // No subscribers is not an error.
        let _ = self.events_tx.send(event);
    }

    pub fn active_load(&self, courier_id: Uuid) -> u32 {
        self.orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.assigned_courier == Some(courier_id) && order.status.is_active()
            })
            .count() as u32
    }

    /// One pass over the order store, grouped by assigned courier.
    pub fn courier_activity(&self) -> HashMap<Uuid, CourierActivity> {
        let mut activity: HashMap<Uuid, CourierActivity> = HashMap::new();

        for entry in self.orders.iter() {
            let order = entry.value();
            let Some(courier_id) = order.assigned_courier else {
                continue;
            };
            let stats = activity.entry(courier_id).or_default();

            if order.status.is_active() {
                stats.active_orders += 1;
            }
            if order.status == OrderStatus::Delivered {
                if let Some(minutes) = order.delivery_minutes() {
                    stats.delivered += 1;
                    stats.delivery_minutes_total += minutes;
                }
            }
        }

        activity
    }
}
