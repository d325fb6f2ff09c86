//! Minimal runtime configuration helpers.
//! Defaults target a local file database next to the working directory.

use std::time::Duration;

use crate::services::export::DEFAULT_EXPORT_DAYS;
use crate::services::seed::SeedPlan;

pub const DEFAULT_DATABASE_URL: &str = "database/smart_home.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SEED_DAYS: i64 = 7;
pub const DEFAULT_SEED_STEP_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file path, or `:memory:`.
    pub database_url: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Window of the CSV export, in days.
    pub export_days: i64,
    pub seed: SeedPlan,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => DEFAULT_DATABASE_URL.to_string(),
        };

        let busy_timeout_ms = positive_var("DATABASE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS as i64)?;
        let export_days = positive_var("EXPORT_DAYS", DEFAULT_EXPORT_DAYS)?;
        let seed_days = positive_var("SEED_DAYS", DEFAULT_SEED_DAYS)?;
        let seed_step_minutes = positive_var("SEED_STEP_MINUTES", DEFAULT_SEED_STEP_MINUTES)?;

        Ok(Config {
            database_url,
            busy_timeout: Duration::from_millis(busy_timeout_ms as u64),
            export_days,
            seed: SeedPlan {
                days: seed_days,
                step_minutes: seed_step_minutes,
            },
        })
    }
}

fn positive_var(name: &str, default: i64) -> Result<i64, String> {
    match std::env::var(name) {
        Ok(s) if !s.trim().is_empty() => parse_positive(name, &s),
        _ => Ok(default),
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<i64, String> {
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(format!("{} must be a positive integer (got {:?})", name, raw)),
    }
}
