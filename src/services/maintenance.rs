//! Operator-invoked maintenance: explicit purge, space reclamation, sizes.

use chrono::{Duration, NaiveDateTime};
use diesel::dsl::{max, min};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::db::constraints;
use crate::error::StoreError;
use crate::schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    SensorReadings,
    ActuatorEvents,
    Alerts,
    SystemLogs,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::SensorReadings, Table::ActuatorEvents, Table::Alerts, Table::SystemLogs];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::SensorReadings => "sensor_readings",
            Table::ActuatorEvents => "actuator_events",
            Table::Alerts => "alerts",
            Table::SystemLogs => "system_logs",
        }
    }

    /// Tables swept by the write path on every insert.
    pub fn is_retention_bounded(self) -> bool {
        matches!(self, Table::SensorReadings | Table::ActuatorEvents)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sensor_readings" | "readings" => Ok(Table::SensorReadings),
            "actuator_events" | "actuators" => Ok(Table::ActuatorEvents),
            "alerts" => Ok(Table::Alerts),
            "system_logs" | "logs" => Ok(Table::SystemLogs),
            other => Err(StoreError::InvalidParameter(format!("unknown table {:?}", other))),
        }
    }
}

/// Delete every row of `table` older than `now - horizon`. This is the only
/// way alerts and system logs ever leave the store.
pub fn purge_older_than(
    conn: &mut SqliteConnection,
    table: Table,
    horizon: Duration,
    now: NaiveDateTime,
) -> Result<usize, StoreError> {
    if horizon < Duration::zero() {
        return Err(StoreError::InvalidParameter(format!(
            "purge horizon must not be negative (got {}s)",
            horizon.num_seconds()
        )));
    }
    let cutoff = constraints::checked_since("purge horizon", now, horizon)?;

    let deleted = match table {
        Table::SensorReadings => {
            use schema::sensor_readings::dsl as R;
            diesel::delete(R::sensor_readings.filter(R::timestamp.lt(cutoff))).execute(conn)?
        }
        Table::ActuatorEvents => {
            use schema::actuator_events::dsl as A;
            diesel::delete(A::actuator_events.filter(A::timestamp.lt(cutoff))).execute(conn)?
        }
        Table::Alerts => {
            use schema::alerts::dsl as AL;
            diesel::delete(AL::alerts.filter(AL::timestamp.lt(cutoff))).execute(conn)?
        }
        Table::SystemLogs => {
            use schema::system_logs::dsl as S;
            diesel::delete(S::system_logs.filter(S::timestamp.lt(cutoff))).execute(conn)?
        }
    };

    info!("Purged {} row(s) from {} older than {}", deleted, table, cutoff);
    Ok(deleted)
}

/// Rebuild the database file to return freed pages to the filesystem.
pub fn reclaim_space(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    diesel::sql_query("VACUUM").execute(conn)?;
    info!("Database vacuumed");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSize {
    pub table: Table,
    pub rows: i64,
    pub oldest: Option<NaiveDateTime>,
    pub newest: Option<NaiveDateTime>,
}

pub fn table_sizes(conn: &mut SqliteConnection) -> Result<Vec<TableSize>, StoreError> {
    use schema::actuator_events::dsl as A;
    use schema::alerts::dsl as AL;
    use schema::sensor_readings::dsl as R;
    use schema::system_logs::dsl as S;

    let mut sizes = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let (rows, oldest, newest): (i64, Option<NaiveDateTime>, Option<NaiveDateTime>) = match table {
            Table::SensorReadings => (
                R::sensor_readings.count().get_result(conn)?,
                R::sensor_readings.select(min(R::timestamp)).first(conn)?,
                R::sensor_readings.select(max(R::timestamp)).first(conn)?,
            ),
            Table::ActuatorEvents => (
                A::actuator_events.count().get_result(conn)?,
                A::actuator_events.select(min(A::timestamp)).first(conn)?,
                A::actuator_events.select(max(A::timestamp)).first(conn)?,
            ),
            Table::Alerts => (
                AL::alerts.count().get_result(conn)?,
                AL::alerts.select(min(AL::timestamp)).first(conn)?,
                AL::alerts.select(max(AL::timestamp)).first(conn)?,
            ),
            Table::SystemLogs => (
                S::system_logs.count().get_result(conn)?,
                S::system_logs.select(min(S::timestamp)).first(conn)?,
                S::system_logs.select(max(S::timestamp)).first(conn)?,
            ),
        };
        sizes.push(TableSize {
            table,
            rows,
            oldest,
            newest,
        });
    }
    Ok(sizes)
}
