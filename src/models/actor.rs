use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is asking for a lifecycle change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Admin,
    Merchant(Uuid),
    Courier(Uuid),
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin)
    }

    pub fn is_courier(&self, courier_id: Uuid) -> bool {
        matches!(self, Actor::Courier(id) if *id == courier_id)
    }

    pub fn is_merchant(&self, merchant_id: Uuid) -> bool {
        matches!(self, Actor::Merchant(id) if *id == merchant_id)
    }
}
