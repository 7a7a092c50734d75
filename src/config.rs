use std::env;

use crate::error::AppError;

/// One day; an offer nobody answers for longer is abandoned.
pub const MAX_ACCEPTANCE_WINDOW_SECS: i64 = 86_400;

/// Tunables for scoring, availability and the offer protocol.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub acceptance_window_secs: i64,
    pub watcher_interval_secs: u64,
    pub max_assignment_attempts: u32,
    pub max_active_orders: u32,
    pub min_rating: f64,
    pub min_rating_samples: u32,
    pub max_distance_km: f64,
    pub target_delivery_min: f64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            acceptance_window_secs: 90,
            watcher_interval_secs: 10,
            max_assignment_attempts: 3,
            max_active_orders: 3,
            min_rating: 3.5,
            min_rating_samples: 5,
            max_distance_km: 50.0,
            target_delivery_min: 60.0,
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_ACCEPTANCE_WINDOW_SECS).contains(&self.acceptance_window_secs) {
            return Err(AppError::Internal(format!(
                "ACCEPTANCE_WINDOW_SECS must be between 1 and {MAX_ACCEPTANCE_WINDOW_SECS}"
            )));
        }
        if self.max_active_orders == 0 {
            return Err(AppError::Internal("MAX_ACTIVE_ORDERS must be > 0".to_string()));
        }
        if self.max_distance_km <= 0.0 || self.target_delivery_min <= 0.0 {
            return Err(AppError::Internal(
                "MAX_DISTANCE_KM and TARGET_DELIVERY_MIN must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub tracking_service_url: Option<String>,
    pub notification_service_url: Option<String>,
    pub side_call_timeout_ms: u64,
    pub dispatch: DispatchSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = DispatchSettings::default();

        let dispatch = DispatchSettings {
            acceptance_window_secs: parse_or_default(
                "ACCEPTANCE_WINDOW_SECS",
                defaults.acceptance_window_secs,
            )?,
            watcher_interval_secs: parse_or_default(
                "WATCHER_INTERVAL_SECS",
                defaults.watcher_interval_secs,
            )?,
            max_assignment_attempts: parse_or_default(
                "MAX_ASSIGNMENT_ATTEMPTS",
                defaults.max_assignment_attempts,
            )?,
            max_active_orders: parse_or_default("MAX_ACTIVE_ORDERS", defaults.max_active_orders)?,
            min_rating: parse_or_default("MIN_COURIER_RATING", defaults.min_rating)?,
            min_rating_samples: parse_or_default("MIN_RATING_SAMPLES", defaults.min_rating_samples)?,
            max_distance_km: parse_or_default("MAX_DISTANCE_KM", defaults.max_distance_km)?,
            target_delivery_min: parse_or_default(
                "TARGET_DELIVERY_MIN",
                defaults.target_delivery_min,
            )?,
        };

        dispatch.validate()?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            tracking_service_url: optional_url("TRACKING_SERVICE_URL"),
            notification_service_url: optional_url("NOTIFICATION_SERVICE_URL"),
            side_call_timeout_ms: parse_or_default("SIDE_CALL_TIMEOUT_MS", 5000)?,
            dispatch,
        })
    }
}

fn optional_url(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchSettings, MAX_ACCEPTANCE_WINDOW_SECS};

    #[test]
    fn defaults_are_valid() {
        assert!(DispatchSettings::default().validate().is_ok());
    }

    #[test]
    fn acceptance_window_is_bounded() {
        for window in [0, -5, MAX_ACCEPTANCE_WINDOW_SECS + 1, 10_000_000_000_000] {
            let settings = DispatchSettings {
                acceptance_window_secs: window,
                ..DispatchSettings::default()
            };
            assert!(settings.validate().is_err(), "window {window} accepted");
        }
    }

    #[test]
    fn zero_load_cap_is_rejected() {
        let settings = DispatchSettings {
            max_active_orders: 0,
            ..DispatchSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
