//! Named report dispatch: `report-name + key=value params -> rows`.

use chrono::{Duration, NaiveDateTime};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::db::models::{ActuatorKind, Alert, SensorReading};
use crate::error::StoreError;
use crate::services::reports::{self, ExtremeOrder};
use crate::services::{alerts, views};

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_CORRELATION_LIMIT: i64 = 100;

/// Loosely typed parameters as they arrive from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportParams {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
    pub kind: Option<ActuatorKind>,
    pub alert_type: Option<String>,
    pub order: Option<ExtremeOrder>,
    pub acknowledged: Option<bool>,
}

impl ReportParams {
    pub fn parse<I, S>(pairs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = ReportParams::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| StoreError::InvalidParameter(format!("expected key=value, got {:?}", pair)))?;
            let value = value.trim();
            match key.trim() {
                "hours" => params.hours = Some(parse_int("hours", value)?),
                "limit" => params.limit = Some(parse_int("limit", value)?),
                "kind" => {
                    params.kind = Some(
                        value
                            .parse::<ActuatorKind>()
                            .map_err(|e| StoreError::InvalidParameter(e.to_string()))?,
                    )
                }
                "type" => params.alert_type = Some(value.to_string()),
                "order" => params.order = Some(value.parse()?),
                "acknowledged" => {
                    params.acknowledged = Some(match value {
                        "true" | "1" | "yes" => true,
                        "false" | "0" | "no" => false,
                        other => {
                            return Err(StoreError::InvalidParameter(format!(
                                "acknowledged must be true or false, got {:?}",
                                other
                            )));
                        }
                    })
                }
                other => return Err(StoreError::InvalidParameter(format!("unknown parameter {:?}", other))),
            }
        }
        Ok(params)
    }

    fn window(&self) -> Result<Duration, StoreError> {
        let hours = self.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
        if hours <= 0 {
            return Err(StoreError::InvalidParameter(format!("hours must be positive (got {})", hours)));
        }
        Duration::try_hours(hours).ok_or_else(|| StoreError::InvalidParameter(format!("hours out of range: {}", hours)))
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, StoreError> {
    value
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidParameter(format!("{} must be an integer, got {:?}", key, value)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    RecentReadings,
    HourlyAverages,
    RecentActuatorEvents,
    ActiveAlerts,
    LatestReadings { limit: i64 },
    Statistics { window: Duration },
    Extremes { window: Duration, order: ExtremeOrder, limit: i64 },
    ActuatorUsage { window: Duration, kind: Option<ActuatorKind> },
    FanInterArrival { window: Duration },
    FanCorrelation { window: Duration, limit: i64 },
    FanPreconditions { window: Duration },
    AlertSummary { window: Duration, type_contains: Option<String> },
    Alerts { acknowledged: bool, limit: i64 },
    DailyReport,
    IntegrityAudit,
    Liveness,
}

impl Report {
    pub const NAMES: [&'static str; 16] = [
        "recent_readings",
        "hourly_averages",
        "recent_actuator_events",
        "active_alerts",
        "latest_readings",
        "statistics",
        "extremes",
        "actuator_usage",
        "fan_inter_arrival",
        "fan_correlation",
        "fan_preconditions",
        "alert_summary",
        "alerts",
        "daily_report",
        "integrity_audit",
        "liveness",
    ];

    pub fn from_name(name: &str, params: &ReportParams) -> Result<Self, StoreError> {
        let report = match name {
            "recent_readings" => Report::RecentReadings,
            "hourly_averages" => Report::HourlyAverages,
            "recent_actuator_events" => Report::RecentActuatorEvents,
            "active_alerts" => Report::ActiveAlerts,
            "latest_readings" => Report::LatestReadings {
                limit: params.limit.unwrap_or(DEFAULT_LIMIT),
            },
            "statistics" => Report::Statistics {
                window: params.window()?,
            },
            "extremes" => Report::Extremes {
                window: params.window()?,
                order: params.order.unwrap_or(ExtremeOrder::Highest),
                limit: params.limit.unwrap_or(DEFAULT_LIMIT),
            },
            "actuator_usage" => Report::ActuatorUsage {
                window: params.window()?,
                kind: params.kind,
            },
            "fan_inter_arrival" => Report::FanInterArrival {
                window: params.window()?,
            },
            "fan_correlation" => Report::FanCorrelation {
                window: params.window()?,
                limit: params.limit.unwrap_or(DEFAULT_CORRELATION_LIMIT),
            },
            "fan_preconditions" => Report::FanPreconditions {
                window: params.window()?,
            },
            "alert_summary" => Report::AlertSummary {
                window: params.window()?,
                type_contains: params.alert_type.clone(),
            },
            "alerts" => Report::Alerts {
                acknowledged: params.acknowledged.unwrap_or(false),
                limit: params.limit.unwrap_or(DEFAULT_LIMIT),
            },
            "daily_report" => Report::DailyReport,
            "integrity_audit" => Report::IntegrityAudit,
            "liveness" => Report::Liveness,
            other => {
                return Err(StoreError::InvalidParameter(format!(
                    "unknown report {:?} (expected one of: {})",
                    other,
                    Report::NAMES.join(", ")
                )));
            }
        };
        Ok(report)
    }
}

/// Result rows, tagged with the report that produced them when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", content = "rows", rename_all = "snake_case")]
pub enum ReportRows {
    RecentReadings(Vec<SensorReading>),
    HourlyAverages(Vec<views::HourlyBucket>),
    RecentActuatorEvents(Vec<views::ActuatorFeedEntry>),
    ActiveAlerts(Vec<Alert>),
    LatestReadings(Vec<SensorReading>),
    Statistics(reports::ReadingStatistics),
    Extremes(Vec<SensorReading>),
    ActuatorUsage(Vec<reports::ActuatorUsage>),
    FanInterArrival(reports::InterArrival),
    FanCorrelation(Vec<reports::ReadingFanState>),
    FanPreconditions(reports::PreActivationConditions),
    AlertSummary(Vec<reports::AlertTypeSummary>),
    Alerts(Vec<Alert>),
    DailyReport(reports::DailyReport),
    IntegrityAudit(Vec<reports::IntegrityIssue>),
    Liveness(reports::Liveness),
}

pub fn run(conn: &mut SqliteConnection, report: &Report, now: NaiveDateTime) -> Result<ReportRows, StoreError> {
    let rows = match report {
        Report::RecentReadings => ReportRows::RecentReadings(views::recent_readings(conn, now)?),
        Report::HourlyAverages => ReportRows::HourlyAverages(views::hourly_rollup(conn, now)?),
        Report::RecentActuatorEvents => ReportRows::RecentActuatorEvents(views::recent_actuator_events(conn)?),
        Report::ActiveAlerts => ReportRows::ActiveAlerts(views::active_alerts(conn)?),
        Report::LatestReadings { limit } => ReportRows::LatestReadings(reports::latest_readings(conn, *limit)?),
        Report::Statistics { window } => ReportRows::Statistics(reports::statistics(conn, *window, now)?),
        Report::Extremes { window, order, limit } => {
            ReportRows::Extremes(reports::temperature_extremes(conn, *window, *order, *limit, now)?)
        }
        Report::ActuatorUsage { window, kind } => {
            ReportRows::ActuatorUsage(reports::actuator_usage(conn, *window, *kind, now)?)
        }
        Report::FanInterArrival { window } => {
            ReportRows::FanInterArrival(reports::fan_inter_arrival(conn, *window, now)?)
        }
        Report::FanCorrelation { window, limit } => {
            ReportRows::FanCorrelation(reports::reading_fan_correlation(conn, *window, *limit, now)?)
        }
        Report::FanPreconditions { window } => {
            ReportRows::FanPreconditions(reports::conditions_before_fan_on(conn, *window, now)?)
        }
        Report::AlertSummary { window, type_contains } => {
            ReportRows::AlertSummary(reports::alert_summary(conn, *window, type_contains.as_deref(), now)?)
        }
        Report::Alerts { acknowledged, limit } => {
            ReportRows::Alerts(alerts::alerts_by_state(conn, *acknowledged, *limit)?)
        }
        Report::DailyReport => ReportRows::DailyReport(reports::daily_report(conn, now)?),
        Report::IntegrityAudit => ReportRows::IntegrityAudit(reports::integrity_audit(conn, now)?),
        Report::Liveness => ReportRows::Liveness(reports::liveness(conn)?),
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_connection;
    use crate::db::models::SensorSample;
    use crate::services::ingest;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(23, 0, 0).unwrap()
    }

    #[test]
    fn params_parse_known_keys() {
        let params = ReportParams::parse(["hours=6", "limit=3", "kind=FAN", "type=critical", "order=lowest"]).unwrap();
        assert_eq!(params.hours, Some(6));
        assert_eq!(params.limit, Some(3));
        assert_eq!(params.kind, Some(ActuatorKind::Fan));
        assert_eq!(params.alert_type.as_deref(), Some("critical"));
        assert_eq!(params.order, Some(ExtremeOrder::Lowest));
    }

    #[test]
    fn params_reject_garbage() {
        assert!(ReportParams::parse(["hours"]).is_err());
        assert!(ReportParams::parse(["hours=abc"]).is_err());
        assert!(ReportParams::parse(["colour=red"]).is_err());
        assert!(ReportParams::parse(["kind=heater"]).is_err());
    }

    #[test]
    fn every_listed_name_resolves() {
        let params = ReportParams::default();
        for name in Report::NAMES {
            assert!(Report::from_name(name, &params).is_ok(), "{name}");
        }
        assert!(Report::from_name("everything", &params).is_err());

        let bad_window = ReportParams {
            hours: Some(0),
            ..ReportParams::default()
        };
        assert!(Report::from_name("statistics", &bad_window).is_err());
    }

    #[test]
    fn every_report_runs_on_an_empty_store() {
        let mut conn = test_connection();
        let params = ReportParams::default();
        for name in Report::NAMES {
            let report = Report::from_name(name, &params).unwrap();
            run(&mut conn, &report, now()).unwrap();
        }
    }

    #[test]
    fn windows_past_the_calendar_fail_instead_of_panicking() {
        let mut conn = test_connection();
        let params = ReportParams::parse(["hours=10000000000"]).unwrap();
        for name in ["statistics", "extremes", "actuator_usage", "fan_preconditions"] {
            let report = Report::from_name(name, &params).unwrap();
            assert!(matches!(run(&mut conn, &report, now()), Err(StoreError::InvalidParameter(_))), "{name}");
        }
    }

    #[test]
    fn rows_serialize_with_report_tag() {
        let mut conn = test_connection();
        let sample = SensorSample::new(21.0, 40.0, 500.0).at(now() - Duration::minutes(5));
        ingest::insert_reading(&mut conn, sample, now()).unwrap();

        let report = Report::from_name("statistics", &ReportParams::parse(["hours=1"]).unwrap()).unwrap();
        let rows = run(&mut conn, &report, now()).unwrap();
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json["report"], "statistics");
        assert_eq!(json["rows"]["readings"], 1);
        assert_eq!(json["rows"]["avg_temperature"], 21.0);
    }
}
