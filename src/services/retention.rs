//! Rolling retention for the high-volume tables.
//!
//! The sweep is not scheduled: `services::ingest` calls the table-scoped
//! sweep inside the same transaction as every insert, so the horizon holds
//! continuously. Both sweeps are indexed range deletes and idempotent.

use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};

use crate::db::constraints;
use crate::error::StoreError;
use crate::schema;

pub const RETENTION_DAYS: i64 = 30;

pub fn retention_horizon() -> Duration {
    Duration::days(RETENTION_DAYS)
}

pub fn cutoff(now: NaiveDateTime) -> NaiveDateTime {
    now - retention_horizon()
}

pub fn sweep_sensor_readings(conn: &mut SqliteConnection, now: NaiveDateTime) -> QueryResult<usize> {
    use schema::sensor_readings::dsl as R;

    let deleted = diesel::delete(R::sensor_readings.filter(R::timestamp.lt(cutoff(now)))).execute(conn)?;
    log_sweep("sensor_readings", deleted);
    Ok(deleted)
}

pub fn sweep_actuator_events(conn: &mut SqliteConnection, now: NaiveDateTime) -> QueryResult<usize> {
    use schema::actuator_events::dsl as A;

    let deleted = diesel::delete(A::actuator_events.filter(A::timestamp.lt(cutoff(now)))).execute(conn)?;
    log_sweep("actuator_events", deleted);
    Ok(deleted)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupSummary {
    pub sensor_readings: usize,
    pub actuator_events: usize,
}

/// Manual sweep of both bounded tables with a caller-chosen horizon.
pub fn cleanup_older_than(
    conn: &mut SqliteConnection,
    days: i64,
    now: NaiveDateTime,
) -> Result<CleanupSummary, StoreError> {
    use schema::actuator_events::dsl as A;
    use schema::sensor_readings::dsl as R;

    if days < 0 {
        return Err(StoreError::InvalidParameter(format!(
            "cleanup horizon must not be negative (got {} days)",
            days
        )));
    }
    let cutoff = constraints::checked_since("cleanup horizon", now, constraints::days_span("cleanup horizon", days)?)?;

    let summary = conn.immediate_transaction::<_, StoreError, _>(|conn| {
        let sensor_readings = diesel::delete(R::sensor_readings.filter(R::timestamp.lt(cutoff))).execute(conn)?;
        let actuator_events = diesel::delete(A::actuator_events.filter(A::timestamp.lt(cutoff))).execute(conn)?;
        Ok(CleanupSummary {
            sensor_readings,
            actuator_events,
        })
    })?;

    info!(
        "Cleanup: removed {} reading(s) and {} actuator event(s) older than {} day(s)",
        summary.sensor_readings, summary.actuator_events, days
    );
    Ok(summary)
}

fn log_sweep(table: &str, deleted: usize) {
    if deleted > 0 {
        info!("Retention: pruned {} expired row(s) from {}", deleted, table);
    } else {
        debug!("Retention: nothing to prune in {}", table);
    }
}
