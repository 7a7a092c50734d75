use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Proximity,
    HighestRating,
    BalancedLoad,
    FastestDelivery,
    #[default]
    Hybrid,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Proximity => "proximity",
            Strategy::HighestRating => "highest_rating",
            Strategy::BalancedLoad => "balanced_load",
            Strategy::FastestDelivery => "fastest_delivery",
            Strategy::Hybrid => "hybrid",
        }
    }

    /// Parses an optional strategy name, defaulting to hybrid when absent.
    pub fn parse_optional(raw: Option<&str>) -> Result<Self, AppError> {
        match raw {
            Some(name) => name.parse(),
            None => Ok(Strategy::Hybrid),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proximity" => Ok(Strategy::Proximity),
            "highest_rating" => Ok(Strategy::HighestRating),
            "balanced_load" => Ok(Strategy::BalancedLoad),
            "fastest_delivery" => Ok(Strategy::FastestDelivery),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(AppError::Validation(format!(
                "unknown strategy: {other}, expected proximity/highest_rating/balanced_load/fastest_delivery/hybrid"
            ))),
        }
    }
}

/// Per-factor scores. Single-factor strategies only fill their own factor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proximity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub courier_id: Uuid,
    pub courier_name: String,
    pub distance_km: Option<f64>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferDetail {
    pub courier_id: Uuid,
    pub courier_name: String,
    pub distance_km: Option<f64>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub deadline: DateTime<Utc>,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub order_id: Uuid,
    pub success: bool,
    pub message: String,
    pub detail: Option<OfferDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub order_id: Uuid,
    pub success: bool,
    pub message: String,
    pub courier_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchEntry>,
}
