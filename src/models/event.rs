use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// Committed state changes, fanned out to the outbound relay and websocket clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    Offered {
        order_id: Uuid,
        courier_id: Uuid,
        merchant_id: Option<Uuid>,
        deadline: DateTime<Utc>,
        attempt: u32,
        score: f64,
    },
    Accepted {
        order_id: Uuid,
        courier_id: Uuid,
        merchant_id: Option<Uuid>,
    },
    OfferExpired {
        order_id: Uuid,
        courier_id: Uuid,
        miss_count: u32,
    },
    StatusChanged {
        order_id: Uuid,
        courier_id: Option<Uuid>,
        merchant_id: Option<Uuid>,
        from: OrderStatus,
        to: OrderStatus,
    },
    Cancelled {
        order_id: Uuid,
        courier_id: Option<Uuid>,
        merchant_id: Option<Uuid>,
        from: OrderStatus,
        refund_amount: f64,
    },
}

impl DispatchEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            DispatchEvent::Offered { order_id, .. }
            | DispatchEvent::Accepted { order_id, .. }
            | DispatchEvent::OfferExpired { order_id, .. }
            | DispatchEvent::StatusChanged { order_id, .. }
            | DispatchEvent::Cancelled { order_id, .. } => *order_id,
        }
    }
}
