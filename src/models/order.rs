use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Offered,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Offered,
        OrderStatus::Accepted,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Adjacency list of the order lifecycle.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Pending => &[Offered, Accepted, Cancelled],
            Offered => &[Accepted, Pending, Cancelled],
            Accepted => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Statuses that count against a courier's concurrency cap.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Offered
                | OrderStatus::Accepted
                | OrderStatus::PickedUp
                | OrderStatus::InTransit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Offered => "OFFERED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                let allowed: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown order status: {raw}, expected one of {allowed:?}")
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub previous_status: OrderStatus,
    pub penalty_percent: u8,
    pub refund_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub merchant_id: Option<Uuid>,
    pub fleet_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub price: f64,
    pub status: OrderStatus,
    pub assigned_courier: Option<Uuid>,
    pub offer_deadline: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    /// Bumped on every committed mutation; used as an optimistic guard.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub offered_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub refund_amount: Option<f64>,
    /// Merchant's 1-5 rating of the delivery, at most one per order.
    pub rating: Option<u8>,
}

impl Order {
    pub fn new(
        merchant_id: Option<Uuid>,
        fleet_id: Option<Uuid>,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        price: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            merchant_id,
            fleet_id,
            pickup,
            dropoff,
            price,
            status: OrderStatus::Pending,
            assigned_courier: None,
            offer_deadline: None,
            attempt_count: 0,
            version: 0,
            created_at: now,
            offered_at: None,
            accepted_at: None,
            picked_up_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            refund_amount: None,
            rating: None,
        }
    }

    /// Minutes between pickup and delivery, when both happened.
    pub fn delivery_minutes(&self) -> Option<f64> {
        match (self.picked_up_at, self.delivered_at) {
            (Some(picked), Some(delivered)) if delivered >= picked => {
                Some((delivered - picked).num_seconds() as f64 / 60.0)
            }
            _ => None,
        }
    }
}
