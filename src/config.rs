use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

/// Connection settings for the PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Cadence and limits of the recurrence scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between two scheduler runs
    pub interval: Duration,
    /// Upper bound on occurrences one template may generate in a single run
    pub max_catch_up: u32,
    /// Run both cohorts immediately on start instead of waiting one interval
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            max_catch_up: 31,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Reads configuration from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, AppError> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| AppError::ValidationError("DATABASE_URL must be set".to_string()))?;

        let database = DatabaseConfig {
            url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,
            min_connections: parse_var("DATABASE_MIN_CONNECTIONS", 5)?,
            acquire_timeout: Duration::from_secs(parse_var("DATABASE_ACQUIRE_TIMEOUT_SECS", 3)?),
            idle_timeout: Duration::from_secs(parse_var("DATABASE_IDLE_TIMEOUT_SECS", 600)?),
            max_lifetime: Duration::from_secs(parse_var("DATABASE_MAX_LIFETIME_SECS", 1800)?),
        };

        let defaults = SchedulerConfig::default();
        let interval_secs: u64 =
            parse_var("SCHEDULER_INTERVAL_SECS", defaults.interval.as_secs())?;
        if interval_secs == 0 {
            return Err(AppError::ValidationError(
                "SCHEDULER_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        let scheduler = SchedulerConfig {
            interval: Duration::from_secs(interval_secs),
            max_catch_up: parse_var("SCHEDULER_MAX_CATCH_UP", defaults.max_catch_up)?,
            run_on_start: parse_var("SCHEDULER_RUN_ON_START", defaults.run_on_start)?,
        };

        Ok(Self {
            database,
            scheduler,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ValidationError(format!("{name} has an invalid value '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}
