//! `TelemetryStore`: the one entry point collaborators use.
//!
//! Wraps a single SQLite connection and a clock. Services take the clock
//! value explicitly; the store reads it once per call.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::sqlite::SqliteConnection;
use std::io::Write;

use crate::config::Config;
use crate::db::connection;
use crate::db::models::{ActuatorCommand, AlertDraft, LogEntry, SensorSample};
use crate::error::StoreError;
use crate::services::alerts::{self, AckTarget};
use crate::services::maintenance::{self, Table, TableSize};
use crate::services::query::{self, Report, ReportParams, ReportRows};
use crate::services::retention::{self, CleanupSummary};
use crate::services::seed::{self, SeedPlan, SeedSummary};
use crate::services::{export, ingest};

pub type Clock = fn() -> NaiveDateTime;

pub fn system_clock() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub struct TelemetryStore {
    conn: SqliteConnection,
    clock: Clock,
}

impl TelemetryStore {
    pub fn open(cfg: &Config) -> Result<Self, StoreError> {
        let conn = connection::open(&cfg.database_url, cfg.busy_timeout)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: SqliteConnection) -> Self {
        TelemetryStore {
            conn,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub fn ingest_reading(&mut self, sample: SensorSample) -> Result<i64, StoreError> {
        let now = self.now();
        ingest::insert_reading(&mut self.conn, sample, now)
    }

    pub fn ingest_actuator_event(&mut self, command: ActuatorCommand) -> Result<i64, StoreError> {
        let now = self.now();
        ingest::insert_actuator_event(&mut self.conn, command, now)
    }

    pub fn raise_alert(&mut self, draft: AlertDraft) -> Result<i64, StoreError> {
        let now = self.now();
        ingest::insert_alert(&mut self.conn, draft, now)
    }

    pub fn write_system_log(&mut self, entry: LogEntry) -> Result<i64, StoreError> {
        let now = self.now();
        ingest::insert_system_log(&mut self.conn, entry, now)
    }

    pub fn query(&mut self, report: &Report) -> Result<ReportRows, StoreError> {
        let now = self.now();
        query::run(&mut self.conn, report, now)
    }

    /// Resolve a report by name and run it.
    pub fn query_named(&mut self, name: &str, params: &ReportParams) -> Result<ReportRows, StoreError> {
        let report = Report::from_name(name, params)?;
        self.query(&report)
    }

    pub fn acknowledge(&mut self, target: AckTarget) -> Result<usize, StoreError> {
        alerts::acknowledge(&mut self.conn, target)
    }

    pub fn cleanup_older_than(&mut self, days: i64) -> Result<CleanupSummary, StoreError> {
        let now = self.now();
        retention::cleanup_older_than(&mut self.conn, days, now)
    }

    pub fn purge_older_than(&mut self, table: Table, horizon: Duration) -> Result<usize, StoreError> {
        let now = self.now();
        maintenance::purge_older_than(&mut self.conn, table, horizon, now)
    }

    pub fn reclaim_space(&mut self) -> Result<(), StoreError> {
        maintenance::reclaim_space(&mut self.conn)
    }

    pub fn table_sizes(&mut self) -> Result<Vec<TableSize>, StoreError> {
        maintenance::table_sizes(&mut self.conn)
    }

    pub fn export_csv<W: Write>(&mut self, out: &mut W, days: i64) -> Result<usize, StoreError> {
        let now = self.now();
        export::export_readings_csv(&mut self.conn, out, days, now)
    }

    pub fn seed(&mut self, plan: SeedPlan) -> Result<SeedSummary, StoreError> {
        let now = self.now();
        seed::run(&mut self.conn, plan, now)
    }
}
