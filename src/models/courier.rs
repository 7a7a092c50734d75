use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presence {
    Online,
    Offline,
    Break,
    Busy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierStats {
    pub completed_jobs: u32,
    pub avg_rating: f64,
    pub rating_count: u32,
    pub total_earnings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    /// None means an independent courier.
    pub fleet_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
    pub presence: Presence,
    pub stats: CourierStats,
    pub miss_count: u32,
    pub updated_at: DateTime<Utc>,
}
