use serde::Serialize;

use crate::config::DispatchSettings;
use crate::models::courier::{Courier, Presence};

/// Why a courier may not receive a new job, or that they may.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Availability {
    Available,
    NotOnline { presence: Presence },
    LowRating { avg_rating: f64 },
    AtCapacity { active_orders: u32 },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityChecker {
    min_rating: f64,
    min_rating_samples: u32,
    max_active_orders: u32,
}

impl AvailabilityChecker {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            min_rating: settings.min_rating,
            min_rating_samples: settings.min_rating_samples,
            max_active_orders: settings.max_active_orders,
        }
    }

    /// Gates are evaluated in order and the first failing one wins.
    pub fn check(&self, courier: &Courier, active_orders: u32) -> Availability {
        if courier.presence != Presence::Online {
            return Availability::NotOnline {
                presence: courier.presence,
            };
        }

        // Too few ratings to judge.
        if courier.stats.rating_count > self.min_rating_samples
            && courier.stats.avg_rating < self.min_rating
        {
            return Availability::LowRating {
                avg_rating: courier.stats.avg_rating,
            };
        }

        if active_orders >= self.max_active_orders {
            return Availability::AtCapacity { active_orders };
        }

        Availability::Available
    }

    pub fn is_available(&self, courier: &Courier, active_orders: u32) -> bool {
        self.check(courier, active_orders).is_available()
    }
}
