use std::env;

use chrono::Duration;

use crate::error::AppError;
use crate::geo::TravelSpeeds;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub position_queue_size: usize,
    /// How long closed orders and silent couriers stay in the store.
    pub retention: Duration,
    pub sweep_interval: std::time::Duration,
    pub engine: EngineConfig,
}

/// Knobs of the pure estimate engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Courier movement that triggers a recompute or a nearby-orders re-fetch.
    pub movement_threshold_km: f64,
    /// Positions older than this still produce estimates, flagged stale.
    pub stale_after: Duration,
    pub speeds: TravelSpeeds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            movement_threshold_km: 0.1,
            stale_after: Duration::seconds(120),
            speeds: TravelSpeeds::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            movement_threshold_km: non_negative(
                "MOVEMENT_THRESHOLD_KM",
                parse_or_default("MOVEMENT_THRESHOLD_KM", defaults.movement_threshold_km)?,
            )?,
            stale_after: seconds(
                "STALE_POSITION_SECS",
                parse_or_default("STALE_POSITION_SECS", defaults.stale_after.num_seconds())?,
            )?,
            speeds: TravelSpeeds {
                walking_kmh: positive(
                    "WALKING_SPEED_KMH",
                    parse_or_default("WALKING_SPEED_KMH", defaults.speeds.walking_kmh)?,
                )?,
                driving_kmh: positive(
                    "DRIVING_SPEED_KMH",
                    parse_or_default("DRIVING_SPEED_KMH", defaults.speeds.driving_kmh)?,
                )?,
            },
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            position_queue_size: parse_or_default("POSITION_QUEUE_SIZE", 1024)?,
            retention: seconds("RETENTION_SECS", parse_or_default("RETENTION_SECS", 3600)?)?,
            sweep_interval: std::time::Duration::from_secs(
                parse_or_default::<u64>("SWEEP_INTERVAL_SECS", 60)?.max(1),
            ),
            engine,
        })
    }
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

fn positive(key: &str, value: f64) -> Result<f64, AppError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AppError::Internal(format!("invalid {key}: must be > 0")))
    }
}

fn non_negative(key: &str, value: f64) -> Result<f64, AppError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AppError::Internal(format!("invalid {key}: must be >= 0")))
    }
}

fn seconds(key: &str, value: i64) -> Result<Duration, AppError> {
    if value < 0 {
        return Err(AppError::Internal(format!("invalid {key}: must be >= 0")));
    }
    Duration::try_seconds(value)
        .ok_or_else(|| AppError::Internal(format!("invalid {key}: {value} seconds is out of range")))
}

#[cfg(test)]
mod tests {
    use super::{non_negative, positive, seconds, EngineConfig};

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.movement_threshold_km, 0.1);
        assert_eq!(config.stale_after.num_seconds(), 120);
        assert_eq!(config.speeds.walking_kmh, 5.0);
        assert_eq!(config.speeds.driving_kmh, 30.0);
    }

    #[test]
    fn rejects_unusable_speeds_and_thresholds() {
        assert!(positive("DRIVING_SPEED_KMH", 0.0).is_err());
        assert!(positive("DRIVING_SPEED_KMH", f64::NAN).is_err());
        assert!(positive("DRIVING_SPEED_KMH", 25.0).is_ok());
        assert!(non_negative("MOVEMENT_THRESHOLD_KM", -0.1).is_err());
        assert!(non_negative("MOVEMENT_THRESHOLD_KM", 0.0).is_ok());
    }

    #[test]
    fn durations_must_be_non_negative_and_in_range() {
        assert_eq!(seconds("STALE_POSITION_SECS", 90).unwrap().num_seconds(), 90);
        assert!(seconds("STALE_POSITION_SECS", 0).is_ok());
        assert!(seconds("STALE_POSITION_SECS", -1).is_err());
        assert!(seconds("STALE_POSITION_SECS", i64::MAX).is_err());
    }
}
