use crate::config::DispatchSettings;
use crate::models::assignment::{ScoreBreakdown, Strategy};

const PROXIMITY_WEIGHT: f64 = 0.40;
const RATING_WEIGHT: f64 = 0.30;
const LOAD_WEIGHT: f64 = 0.20;
const SPEED_WEIGHT: f64 = 0.10;

const NEUTRAL_SPEED_SCORE: f64 = 0.5;
const MIN_SPEED_SCORE: f64 = 0.1;

/// Everything the scorer needs to know about one courier relative to one job.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInputs {
    /// None when the courier has never reported a position.
    pub distance_km: Option<f64>,
    pub avg_rating: f64,
    pub active_orders: u32,
    pub avg_delivery_min: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    max_distance_km: f64,
    max_orders: u32,
    target_delivery_min: f64,
}

impl ScoringEngine {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            max_distance_km: settings.max_distance_km,
            max_orders: settings.max_active_orders,
            target_delivery_min: settings.target_delivery_min,
        }
    }

    /// Exponential decay: 1.0 at the pickup, 0.1 at `max_distance_km`.
    pub fn proximity_score(&self, distance_km: f64) -> f64 {
        if distance_km <= 0.0 {
            return 1.0;
        }

        let k = std::f64::consts::LN_10 / self.max_distance_km;
        (-k * distance_km).exp().clamp(0.0, 1.0)
    }

    pub fn rating_score(&self, avg_rating: f64) -> f64 {
        if avg_rating < 0.0 {
            return 0.0;
        }
        (avg_rating / 5.0).min(1.0)
    }

    pub fn load_score(&self, active_orders: u32) -> f64 {
        if self.max_orders == 0 || active_orders >= self.max_orders {
            return 0.0;
        }
        1.0 - (active_orders as f64 / self.max_orders as f64)
    }

    pub fn speed_score(&self, avg_delivery_min: Option<f64>) -> f64 {
        match avg_delivery_min {
            Some(avg) if avg > 0.0 => {
                if avg <= self.target_delivery_min {
                    1.0
                } else {
                    (self.target_delivery_min / avg).max(MIN_SPEED_SCORE)
                }
            }
            _ => NEUTRAL_SPEED_SCORE,
        }
    }

    pub fn score(&self, strategy: Strategy, inputs: &ScoringInputs) -> (f64, ScoreBreakdown) {
        let proximity = || {
            inputs
                .distance_km
                .map(|distance| self.proximity_score(distance))
                .unwrap_or(0.0)
        };

        match strategy {
            Strategy::Proximity => {
                let score = proximity();
                (
                    score,
                    ScoreBreakdown {
                        proximity: Some(score),
                        ..ScoreBreakdown::default()
                    },
                )
            }
            Strategy::HighestRating => {
                let score = self.rating_score(inputs.avg_rating);
                (
                    score,
                    ScoreBreakdown {
                        rating: Some(score),
                        ..ScoreBreakdown::default()
                    },
                )
            }
            Strategy::BalancedLoad => {
                let score = self.load_score(inputs.active_orders);
                (
                    score,
                    ScoreBreakdown {
                        load_balance: Some(score),
                        ..ScoreBreakdown::default()
                    },
                )
            }
            Strategy::FastestDelivery => {
                let score = self.speed_score(inputs.avg_delivery_min);
                (
                    score,
                    ScoreBreakdown {
                        speed: Some(score),
                        ..ScoreBreakdown::default()
                    },
                )
            }
            Strategy::Hybrid => {
                let breakdown = ScoreBreakdown {
                    proximity: Some(proximity()),
                    rating: Some(self.rating_score(inputs.avg_rating)),
                    load_balance: Some(self.load_score(inputs.active_orders)),
                    speed: Some(self.speed_score(inputs.avg_delivery_min)),
                };
                (weighted_score(&breakdown), breakdown)
            }
        }
    }
}

/// Hybrid combination. Missing factors contribute nothing.
pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.proximity.unwrap_or(0.0) * PROXIMITY_WEIGHT)
        + (breakdown.rating.unwrap_or(0.0) * RATING_WEIGHT)
        + (breakdown.load_balance.unwrap_or(0.0) * LOAD_WEIGHT)
        + (breakdown.speed.unwrap_or(0.0) * SPEED_WEIGHT)
}
