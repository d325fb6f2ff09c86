//! Read-time projections over the base tables.
//!
//! Nothing here is cached: each call re-reads the live table, with the clock
//! passed in by the caller. The SQL views of the same names in the migration
//! serve readers outside this process.

use chrono::{Duration, NaiveDateTime, Timelike};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::models::{ActuatorKind, Alert, Origin, SensorReading};
use crate::error::StoreError;
use crate::schema;

pub const RECENT_WINDOW_HOURS: i64 = 24;
pub const RECENT_ACTUATOR_LIMIT: i64 = 100;

pub fn recent_window_start(now: NaiveDateTime) -> NaiveDateTime {
    now - Duration::hours(RECENT_WINDOW_HOURS)
}

/// All readings of the last 24 hours, newest first. Rows stamped after `now`
/// are not part of the window.
pub fn recent_readings(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<Vec<SensorReading>, StoreError> {
    use schema::sensor_readings::dsl as R;

    Ok(R::sensor_readings
        .filter(R::timestamp.ge(recent_window_start(now)).and(R::timestamp.le(now)))
        .order((R::timestamp.desc(), R::id.desc()))
        .select(SensorReading::as_select())
        .load(conn)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub hour: NaiveDateTime,
    pub readings: i64,
    pub avg_temperature: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub avg_humidity: f64,
    pub avg_light: f64,
}

#[derive(Default)]
struct BucketAcc {
    count: i64,
    temp_sum: f64,
    temp_min: f64,
    temp_max: f64,
    humidity_sum: f64,
    light_sum: f64,
}

impl BucketAcc {
    fn push(&mut self, r: &SensorReading) {
        if self.count == 0 {
            self.temp_min = r.temperature;
            self.temp_max = r.temperature;
        } else {
            self.temp_min = self.temp_min.min(r.temperature);
            self.temp_max = self.temp_max.max(r.temperature);
        }
        self.count += 1;
        self.temp_sum += r.temperature;
        self.humidity_sum += r.humidity;
        self.light_sum += r.light_level;
    }

    fn finish(self, hour: NaiveDateTime) -> HourlyBucket {
        let n = self.count as f64;
        HourlyBucket {
            hour,
            readings: self.count,
            avg_temperature: self.temp_sum / n,
            min_temperature: self.temp_min,
            max_temperature: self.temp_max,
            avg_humidity: self.humidity_sum / n,
            avg_light: self.light_sum / n,
        }
    }
}

/// Truncate a timestamp to the start of its hour.
pub fn hour_bucket(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(ts.hour(), 0, 0).unwrap_or(ts)
}

/// Per-hour rollup of the last 24 hours, newest bucket first.
pub fn hourly_rollup(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<Vec<HourlyBucket>, StoreError> {
    let readings = recent_readings(conn, now)?;

    let mut buckets: BTreeMap<NaiveDateTime, BucketAcc> = BTreeMap::new();
    for r in &readings {
        buckets.entry(hour_bucket(r.timestamp)).or_default().push(r);
    }

    Ok(buckets
        .into_iter()
        .rev()
        .map(|(hour, acc)| acc.finish(hour))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorFeedEntry {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub actuator_type: ActuatorKind,
    pub action: String,
    pub value: Option<String>,
    pub origin: Origin,
}

/// The 100 most recent actuator events, newest first.
pub fn recent_actuator_events(conn: &mut SqliteConnection) -> Result<Vec<ActuatorFeedEntry>, StoreError> {
    use schema::actuator_events::dsl as A;

    let rows: Vec<(i64, NaiveDateTime, String, String, Option<String>, bool)> = A::actuator_events
        .order((A::timestamp.desc(), A::id.desc()))
        .limit(RECENT_ACTUATOR_LIMIT)
        .select((A::id, A::timestamp, A::actuator_type, A::action, A::value, A::auto_triggered))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, timestamp, raw_type, action, value, auto)| match raw_type.parse::<ActuatorKind>() {
            Ok(actuator_type) => Some(ActuatorFeedEntry {
                id,
                timestamp,
                actuator_type,
                action,
                value,
                origin: Origin::from_auto_triggered(auto),
            }),
            Err(e) => {
                warn!("Actuator feed: skipping event {}: {}", id, e);
                None
            }
        })
        .collect())
}

/// Every unacknowledged alert, newest first.
pub fn active_alerts(conn: &mut SqliteConnection) -> Result<Vec<Alert>, StoreError> {
    use schema::alerts::dsl as AL;

    Ok(AL::alerts
        .filter(AL::acknowledged.eq(false))
        .order((AL::timestamp.desc(), AL::id.desc()))
        .select(Alert::as_select())
        .load(conn)?)
}
