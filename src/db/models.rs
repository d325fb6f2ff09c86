//! Diesel model structs for the telemetry tables plus the validated input
//! types collaborators hand to the ingest path.
//!
//! `sensor_readings` and `actuator_events` are retention-bounded (see
//! `services::retention`); `alerts` and `system_logs` are not.

use chrono::NaiveDateTime;
use core::fmt;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::db::constraints::{self, ACTION_MAX_LEN, ALERT_TYPE_MAX_LEN, COMPONENT_MAX_LEN};
use crate::error::StoreError;
use crate::schema;

// Conventional `actuator_events.action` tokens. The column stays open-ended.
pub mod actions {
    pub const ON: &str = "on";
    pub const OFF: &str = "off";
    pub const TOGGLE: &str = "toggle";
    pub const BEEP: &str = "beep";
}

// Conventional `alerts.alert_type` categories. Severity is encoded in the name.
pub mod alert_types {
    pub const TEMPERATURE_HIGH: &str = "temperature_high";
    pub const TEMPERATURE_LOW: &str = "temperature_low";
    pub const TEMPERATURE_CRITICAL: &str = "temperature_critical";
    pub const HUMIDITY_HIGH: &str = "humidity_high";
    pub const HUMIDITY_LOW: &str = "humidity_low";
    pub const HUMIDITY_CRITICAL: &str = "humidity_critical";
    pub const LIGHT_LOW: &str = "light_low";

    pub const CRITICAL_MARKER: &str = "critical";
}

/// Raised when a text column holds a value outside a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub raw: String,
}

impl Display for UnknownVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} {:?}", self.kind, self.raw)
    }
}

impl Error for UnknownVariant {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, diesel::AsExpression, diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Fan,
    Light,
    Buzzer,
    Led,
}

impl ActuatorKind {
    pub const ALL: [ActuatorKind; 4] = [ActuatorKind::Fan, ActuatorKind::Light, ActuatorKind::Buzzer, ActuatorKind::Led];

    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorKind::Fan => "fan",
            ActuatorKind::Light => "light",
            ActuatorKind::Buzzer => "buzzer",
            ActuatorKind::Led => "led",
        }
    }
}

impl Display for ActuatorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActuatorKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "actuator kind",
                raw: s.to_string(),
            })
    }
}

impl ToSql<Text, Sqlite> for ActuatorKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for ActuatorKind {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(raw.parse()?)
    }
}

/// Who caused an actuator transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Automatic,
    Manual,
}

impl Origin {
    pub fn from_auto_triggered(auto_triggered: bool) -> Self {
        if auto_triggered { Origin::Automatic } else { Origin::Manual }
    }

    pub fn is_automatic(self) -> bool {
        matches!(self, Origin::Automatic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Automatic => "automatic",
            Origin::Manual => "manual",
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, diesel::AsExpression, diesel::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [LogLevel::Info, LogLevel::Warning, LogLevel::Error, LogLevel::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "log level",
                raw: s.to_string(),
            })
    }
}

impl ToSql<Text, Sqlite> for LogLevel {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for LogLevel {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let raw = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(raw.parse()?)
    }
}

// Bounded table: sensor_readings
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
#[diesel(check_for_backend(Sqlite))]
pub struct SensorReading {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sensor_readings)]
pub struct NewSensorReading {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
    pub created_at: NaiveDateTime,
}

/// One poll cycle's worth of telemetry as handed over by the sensing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
    /// Capture time; the write-time clock is used when absent.
    pub timestamp: Option<NaiveDateTime>,
}

impl SensorSample {
    pub fn new(temperature: f64, humidity: f64, light_level: f64) -> Self {
        SensorSample {
            temperature,
            humidity,
            light_level,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        constraints::check_range(
            "temperature",
            self.temperature,
            constraints::TEMPERATURE_MIN_C,
            constraints::TEMPERATURE_MAX_C,
        )?;
        constraints::check_range(
            "humidity",
            self.humidity,
            constraints::HUMIDITY_MIN_PCT,
            constraints::HUMIDITY_MAX_PCT,
        )?;
        constraints::check_at_least("light_level", self.light_level, constraints::LIGHT_MIN_LUX)
    }

    pub fn into_row(self, now: NaiveDateTime) -> NewSensorReading {
        NewSensorReading {
            timestamp: self.timestamp.unwrap_or(now),
            temperature: self.temperature,
            humidity: self.humidity,
            light_level: self.light_level,
            created_at: now,
        }
    }
}

// Bounded table: actuator_events
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::actuator_events)]
#[diesel(check_for_backend(Sqlite))]
pub struct ActuatorEvent {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub actuator_type: ActuatorKind,
    pub action: String,
    pub value: Option<String>,
    pub auto_triggered: bool,
    pub created_at: NaiveDateTime,
}

impl ActuatorEvent {
    pub fn origin(&self) -> Origin {
        Origin::from_auto_triggered(self.auto_triggered)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::actuator_events)]
pub struct NewActuatorEvent {
    pub timestamp: NaiveDateTime,
    pub actuator_type: ActuatorKind,
    pub action: String,
    pub value: Option<String>,
    pub auto_triggered: bool,
    pub created_at: NaiveDateTime,
}

/// An actuator state change reported by the actuation side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub kind: ActuatorKind,
    pub action: String,
    pub value: Option<String>,
    pub origin: Origin,
    pub timestamp: Option<NaiveDateTime>,
}

impl ActuatorCommand {
    pub fn new(kind: ActuatorKind, action: impl Into<String>, origin: Origin) -> Self {
        ActuatorCommand {
            kind,
            action: action.into(),
            value: None,
            origin,
            timestamp: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        constraints::check_token("action", &self.action, ACTION_MAX_LEN)
    }

    pub fn into_row(self, now: NaiveDateTime) -> NewActuatorEvent {
        NewActuatorEvent {
            timestamp: self.timestamp.unwrap_or(now),
            actuator_type: self.kind,
            action: self.action,
            value: self.value,
            auto_triggered: self.origin.is_automatic(),
            created_at: now,
        }
    }
}

// Unbounded table: alerts
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::alerts)]
#[diesel(check_for_backend(Sqlite))]
pub struct Alert {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub alert_type: String,
    pub message: String,
    pub value: Option<f64>,
    pub acknowledged: bool,
    pub created_at: NaiveDateTime,
}

impl Alert {
    pub fn is_critical(&self) -> bool {
        is_critical_type(&self.alert_type)
    }
}

pub fn is_critical_type(alert_type: &str) -> bool {
    alert_type.contains(alert_types::CRITICAL_MARKER)
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::alerts)]
pub struct NewAlert {
    pub timestamp: NaiveDateTime,
    pub alert_type: String,
    pub message: String,
    pub value: Option<f64>,
    pub acknowledged: bool,
    pub created_at: NaiveDateTime,
}

/// A threshold breach reported by the alerting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    pub alert_type: String,
    pub message: String,
    pub value: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
}

impl AlertDraft {
    pub fn new(alert_type: impl Into<String>, message: impl Into<String>) -> Self {
        AlertDraft {
            alert_type: alert_type.into(),
            message: message.into(),
            value: None,
            timestamp: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        constraints::check_token("alert_type", &self.alert_type, ALERT_TYPE_MAX_LEN)?;
        if let Some(v) = self.value {
            constraints::check_finite("value", v)?;
        }
        Ok(())
    }

    pub fn into_row(self, now: NaiveDateTime) -> NewAlert {
        NewAlert {
            timestamp: self.timestamp.unwrap_or(now),
            alert_type: self.alert_type,
            message: self.message,
            value: self.value,
            acknowledged: false,
            created_at: now,
        }
    }
}

// Unbounded table: system_logs
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::system_logs)]
#[diesel(check_for_backend(Sqlite))]
pub struct SystemLog {
    pub id: i64,
    pub timestamp: NaiveDateTime,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    /// JSON document stored as text.
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}

impl SystemLog {
    pub fn details_json(&self) -> Result<Option<serde_json::Value>, StoreError> {
        self.details
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(StoreError::from)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::system_logs)]
pub struct NewSystemLog {
    pub timestamp: NaiveDateTime,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: Option<NaiveDateTime>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        LogEntry {
            level,
            component: component.into(),
            message: message.into(),
            details: None,
            timestamp: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        constraints::check_token("component", &self.component, COMPONENT_MAX_LEN)?;
        constraints::check_non_empty("message", &self.message)
    }

    pub fn into_row(self, now: NaiveDateTime) -> Result<NewSystemLog, StoreError> {
        let details = self.details.as_ref().map(serde_json::to_string).transpose()?;
        Ok(NewSystemLog {
            timestamp: self.timestamp.unwrap_or(now),
            level: self.level,
            component: self.component,
            message: self.message,
            details,
            created_at: now,
        })
    }
}
