//! Parameterized report queries over the telemetry tables.
//!
//! Windowed reports take `now` from the caller and look back over
//! `[now - window, ..)`. Time-proximity joins between readings and actuator
//! events load both ordered sides once and merge them in memory.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use diesel::dsl::{avg, count_star, max, min};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamp};
use diesel::sqlite::SqliteConnection;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::db::constraints;
use crate::db::models::{ActuatorKind, SensorReading, actions, is_critical_type};
use crate::error::StoreError;
use crate::schema;

/// A fan "on" within this long after a reading marks the reading as ON.
pub const FAN_ON_FORWARD_MINUTES: i64 = 5;
/// Readings this long before a fan "on" describe the conditions that caused it.
pub const PRE_ACTIVATION_LOOKBACK_MINUTES: i64 = 1;

pub fn fan_on_forward_window() -> Duration {
    Duration::minutes(FAN_ON_FORWARD_MINUTES)
}

pub fn pre_activation_lookback() -> Duration {
    Duration::minutes(PRE_ACTIVATION_LOOKBACK_MINUTES)
}

fn window_start(now: NaiveDateTime, window: Duration) -> Result<NaiveDateTime, StoreError> {
    if window <= Duration::zero() {
        return Err(StoreError::InvalidParameter(format!(
            "report window must be positive (got {}s)",
            window.num_seconds()
        )));
    }
    constraints::checked_since("report window", now, window)
}

fn check_limit(limit: i64) -> Result<(), StoreError> {
    if limit <= 0 {
        return Err(StoreError::InvalidParameter(format!("limit must be positive (got {})", limit)));
    }
    Ok(())
}

fn minutes_between(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Newest readings regardless of age.
pub fn latest_readings(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<SensorReading>, StoreError> {
    use schema::sensor_readings::dsl as R;

    check_limit(limit)?;
    Ok(R::sensor_readings
        .order((R::timestamp.desc(), R::id.desc()))
        .limit(limit)
        .select(SensorReading::as_select())
        .load(conn)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingStatistics {
    pub readings: i64,
    pub avg_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub avg_light: Option<f64>,
}

type StatsRow = (
    i64,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
);

fn reading_stats_between(
    conn: &mut SqliteConnection,
    from: NaiveDateTime,
    until: Option<NaiveDateTime>,
) -> Result<ReadingStatistics, StoreError> {
    use schema::sensor_readings::dsl as R;

    let mut query = R::sensor_readings
        .filter(R::timestamp.ge(from))
        .select((
            count_star(),
            avg(R::temperature),
            min(R::temperature),
            max(R::temperature),
            avg(R::humidity),
            min(R::humidity),
            max(R::humidity),
            avg(R::light_level),
        ))
        .into_boxed();
    if let Some(until) = until {
        query = query.filter(R::timestamp.lt(until));
    }
    let row: StatsRow = query.first(conn)?;

    Ok(ReadingStatistics {
        readings: row.0,
        avg_temperature: row.1,
        min_temperature: row.2,
        max_temperature: row.3,
        avg_humidity: row.4,
        min_humidity: row.5,
        max_humidity: row.6,
        avg_light: row.7,
    })
}

/// Reading aggregates over a trailing window. An empty window yields a zero
/// count and `None` aggregates.
pub fn statistics(
    conn: &mut SqliteConnection,
    window: Duration,
    now: NaiveDateTime,
) -> Result<ReadingStatistics, StoreError> {
    let since = window_start(now, window)?;
    reading_stats_between(conn, since, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremeOrder {
    Highest,
    Lowest,
}

impl FromStr for ExtremeOrder {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "top" | "desc" | "hot" => Ok(ExtremeOrder::Highest),
            "lowest" | "bottom" | "asc" | "cold" => Ok(ExtremeOrder::Lowest),
            other => Err(StoreError::InvalidParameter(format!("unknown order {:?}", other))),
        }
    }
}

/// Top-N (or bottom-N) readings by temperature. Ties go to the newer reading.
pub fn temperature_extremes(
    conn: &mut SqliteConnection,
    window: Duration,
    order: ExtremeOrder,
    limit: i64,
    now: NaiveDateTime,
) -> Result<Vec<SensorReading>, StoreError> {
    use schema::sensor_readings::dsl as R;

    check_limit(limit)?;
    let since = window_start(now, window)?;
    let query = R::sensor_readings
        .filter(R::timestamp.ge(since))
        .select(SensorReading::as_select())
        .limit(limit)
        .into_boxed();
    let query = match order {
        ExtremeOrder::Highest => query.order((R::temperature.desc(), R::timestamp.desc(), R::id.desc())),
        ExtremeOrder::Lowest => query.order((R::temperature.asc(), R::timestamp.desc(), R::id.desc())),
    };
    Ok(query.load(conn)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorUsage {
    pub actuator_type: ActuatorKind,
    pub action: String,
    pub total: i64,
    pub automatic: i64,
    pub manual: i64,
    pub last_at: NaiveDateTime,
}

/// Event counts per (actuator, action) with the automatic/manual split.
pub fn actuator_usage(
    conn: &mut SqliteConnection,
    window: Duration,
    kind: Option<ActuatorKind>,
    now: NaiveDateTime,
) -> Result<Vec<ActuatorUsage>, StoreError> {
    use schema::actuator_events::dsl as A;

    let since = window_start(now, window)?;
    let mut query = A::actuator_events
        .filter(A::timestamp.ge(since))
        .select((A::actuator_type, A::action, A::auto_triggered, A::timestamp))
        .into_boxed();
    if let Some(kind) = kind {
        query = query.filter(A::actuator_type.eq(kind));
    }
    let rows: Vec<(String, String, bool, NaiveDateTime)> = query.load(conn)?;

    let mut usage: BTreeMap<(ActuatorKind, String), ActuatorUsage> = BTreeMap::new();
    for (raw_type, action, auto, ts) in rows {
        let actuator_type = match raw_type.parse::<ActuatorKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!("Actuator usage: skipping event at {}: {}", ts, e);
                continue;
            }
        };
        let entry = usage
            .entry((actuator_type, action.clone()))
            .or_insert_with(|| ActuatorUsage {
                actuator_type,
                action,
                total: 0,
                automatic: 0,
                manual: 0,
                last_at: ts,
            });
        entry.total += 1;
        if auto {
            entry.automatic += 1;
        } else {
            entry.manual += 1;
        }
        entry.last_at = entry.last_at.max(ts);
    }
    Ok(usage.into_values().collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterArrival {
    pub actuator_type: ActuatorKind,
    pub action: String,
    pub events: usize,
    pub intervals: usize,
    pub avg_minutes: Option<f64>,
    pub min_minutes: Option<f64>,
    pub max_minutes: Option<f64>,
}

/// Gap between each matching event and the one before it, in timestamp order.
pub fn inter_arrival(
    conn: &mut SqliteConnection,
    kind: ActuatorKind,
    action: &str,
    window: Duration,
    now: NaiveDateTime,
) -> Result<InterArrival, StoreError> {
    use schema::actuator_events::dsl as A;

    let since = window_start(now, window)?;
    let times: Vec<NaiveDateTime> = A::actuator_events
        .filter(
            A::actuator_type
                .eq(kind)
                .and(A::action.eq(action))
                .and(A::timestamp.ge(since)),
        )
        .order((A::timestamp.asc(), A::id.asc()))
        .select(A::timestamp)
        .load(conn)?;

    let mut gaps = Vec::with_capacity(times.len().saturating_sub(1));
    let mut prev: Option<NaiveDateTime> = None;
    for ts in &times {
        if let Some(p) = prev {
            gaps.push(minutes_between(p, *ts));
        }
        prev = Some(*ts);
    }

    Ok(InterArrival {
        actuator_type: kind,
        action: action.to_string(),
        events: times.len(),
        intervals: gaps.len(),
        avg_minutes: mean(gaps.iter().copied()),
        min_minutes: gaps.iter().copied().reduce(f64::min),
        max_minutes: gaps.iter().copied().reduce(f64::max),
    })
}

pub fn fan_inter_arrival(
    conn: &mut SqliteConnection,
    window: Duration,
    now: NaiveDateTime,
) -> Result<InterArrival, StoreError> {
    inter_arrival(conn, ActuatorKind::Fan, actions::ON, window, now)
}

fn fan_on_times(
    conn: &mut SqliteConnection,
    from: NaiveDateTime,
    until: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>, StoreError> {
    use schema::actuator_events::dsl as A;

    Ok(A::actuator_events
        .filter(
            A::actuator_type
                .eq(ActuatorKind::Fan)
                .and(A::action.eq(actions::ON))
                .and(A::timestamp.ge(from))
                .and(A::timestamp.le(until)),
        )
        .order(A::timestamp.asc())
        .select(A::timestamp)
        .load(conn)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanState {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingFanState {
    pub reading_id: i64,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
    pub fan: FanState,
}

/// Label each reading ON when a fan "on" event falls within
/// `[reading, reading + 5min]`, OFF otherwise. Newest readings first.
pub fn reading_fan_correlation(
    conn: &mut SqliteConnection,
    window: Duration,
    limit: i64,
    now: NaiveDateTime,
) -> Result<Vec<ReadingFanState>, StoreError> {
    use schema::sensor_readings::dsl as R;

    check_limit(limit)?;
    let since = window_start(now, window)?;
    let readings: Vec<SensorReading> = R::sensor_readings
        .filter(R::timestamp.ge(since))
        .order((R::timestamp.desc(), R::id.desc()))
        .limit(limit)
        .select(SensorReading::as_select())
        .load(conn)?;

    let (Some(newest), Some(oldest)) = (readings.first(), readings.last()) else {
        return Ok(Vec::new());
    };
    let fan_on = fan_on_times(conn, oldest.timestamp, newest.timestamp + fan_on_forward_window())?;

    Ok(readings
        .into_iter()
        .map(|r| {
            let idx = fan_on.partition_point(|t| *t < r.timestamp);
            let on = fan_on
                .get(idx)
                .is_some_and(|t| *t <= r.timestamp + fan_on_forward_window());
            ReadingFanState {
                reading_id: r.id,
                timestamp: r.timestamp,
                temperature: r.temperature,
                humidity: r.humidity,
                light_level: r.light_level,
                fan: if on { FanState::On } else { FanState::Off },
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreActivationConditions {
    /// Fan "on" events in the window.
    pub fan_on_events: usize,
    /// Events with at least one reading in the lookback.
    pub activations: usize,
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_light: Option<f64>,
}

/// Average conditions in `[event - 1min, event]` per fan "on" event, then the
/// mean of those per-event averages.
pub fn conditions_before_fan_on(
    conn: &mut SqliteConnection,
    window: Duration,
    now: NaiveDateTime,
) -> Result<PreActivationConditions, StoreError> {
    use schema::sensor_readings::dsl as R;

    let since = window_start(now, window)?;
    let lookback_from = constraints::checked_since("fan lookback", since, pre_activation_lookback())?;
    let events = fan_on_times(conn, since, now)?;
    let Some(last_event) = events.last().copied() else {
        return Ok(PreActivationConditions {
            fan_on_events: 0,
            activations: 0,
            avg_temperature: None,
            avg_humidity: None,
            avg_light: None,
        });
    };

    let readings: Vec<(NaiveDateTime, f64, f64, f64)> = R::sensor_readings
        .filter(
            R::timestamp
                .ge(lookback_from)
                .and(R::timestamp.le(last_event)),
        )
        .order(R::timestamp.asc())
        .select((R::timestamp, R::temperature, R::humidity, R::light_level))
        .load(conn)?;

    let mut per_event = Vec::with_capacity(events.len());
    for ev in &events {
        let lo = readings.partition_point(|r| r.0 < *ev - pre_activation_lookback());
        let hi = readings.partition_point(|r| r.0 <= *ev);
        let slice = &readings[lo..hi.max(lo)];
        if slice.is_empty() {
            continue;
        }
        per_event.push((
            mean(slice.iter().map(|r| r.1)),
            mean(slice.iter().map(|r| r.2)),
            mean(slice.iter().map(|r| r.3)),
        ));
    }

    Ok(PreActivationConditions {
        fan_on_events: events.len(),
        activations: per_event.len(),
        avg_temperature: mean(per_event.iter().filter_map(|e| e.0)),
        avg_humidity: mean(per_event.iter().filter_map(|e| e.1)),
        avg_light: mean(per_event.iter().filter_map(|e| e.2)),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertTypeSummary {
    pub alert_type: String,
    pub critical: bool,
    pub total: i64,
    pub unacknowledged: i64,
    pub max_value: Option<f64>,
    pub last_at: NaiveDateTime,
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('%');
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// Alert counts per type. `type_contains` is matched literally.
pub fn alert_summary(
    conn: &mut SqliteConnection,
    window: Duration,
    type_contains: Option<&str>,
    now: NaiveDateTime,
) -> Result<Vec<AlertTypeSummary>, StoreError> {
    use schema::alerts::dsl as AL;

    let since = window_start(now, window)?;
    let mut query = AL::alerts
        .filter(AL::timestamp.ge(since))
        .select((AL::alert_type, AL::value, AL::acknowledged, AL::timestamp))
        .into_boxed();
    if let Some(needle) = type_contains.filter(|s| !s.is_empty()) {
        query = query.filter(AL::alert_type.like(escape_like(needle)).escape('\\'));
    }
    let rows: Vec<(String, Option<f64>, bool, NaiveDateTime)> = query.load(conn)?;

    let mut summary: BTreeMap<String, AlertTypeSummary> = BTreeMap::new();
    for (alert_type, value, acknowledged, ts) in rows {
        let entry = summary.entry(alert_type.clone()).or_insert_with(|| AlertTypeSummary {
            critical: is_critical_type(&alert_type),
            alert_type,
            total: 0,
            unacknowledged: 0,
            max_value: None,
            last_at: ts,
        });
        entry.total += 1;
        if !acknowledged {
            entry.unacknowledged += 1;
        }
        if let Some(v) = value {
            entry.max_value = Some(entry.max_value.map_or(v, |m| m.max(v)));
        }
        entry.last_at = entry.last_at.max(ts);
    }
    Ok(summary.into_values().collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub day: chrono::NaiveDate,
    #[serde(flatten)]
    pub readings: ReadingStatistics,
    pub actuator_events: i64,
    pub fan_activations: i64,
    pub alerts: i64,
    pub unacknowledged_alerts: i64,
}

/// Summary of the calendar day containing `now`. Each table is counted by
/// its own query so the reading aggregates cannot be inflated by join fan-out.
pub fn daily_report(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<DailyReport, StoreError> {
    use schema::actuator_events::dsl as A;
    use schema::alerts::dsl as AL;

    let day = now.date();
    let start = day.and_time(NaiveTime::MIN);
    let end = start + Duration::days(1);

    let readings = reading_stats_between(conn, start, Some(end))?;

    let actuator_events: i64 = A::actuator_events
        .filter(A::timestamp.ge(start).and(A::timestamp.lt(end)))
        .count()
        .get_result(conn)?;
    let fan_activations: i64 = A::actuator_events
        .filter(A::timestamp.ge(start).and(A::timestamp.lt(end)))
        .filter(A::actuator_type.eq(ActuatorKind::Fan).and(A::action.eq(actions::ON)))
        .count()
        .get_result(conn)?;

    let alerts: i64 = AL::alerts
        .filter(AL::timestamp.ge(start).and(AL::timestamp.lt(end)))
        .count()
        .get_result(conn)?;
    let unacknowledged_alerts: i64 = AL::alerts
        .filter(AL::timestamp.ge(start).and(AL::timestamp.lt(end)))
        .filter(AL::acknowledged.eq(false))
        .count()
        .get_result(conn)?;

    Ok(DailyReport {
        day,
        readings,
        actuator_events,
        fan_activations,
        alerts,
        unacknowledged_alerts,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    pub category: &'static str,
    pub rows: i64,
}

#[derive(QueryableByName)]
struct IntegrityCounts {
    #[diesel(sql_type = BigInt)]
    null_telemetry: i64,
    #[diesel(sql_type = BigInt)]
    temperature_out_of_range: i64,
    #[diesel(sql_type = BigInt)]
    humidity_out_of_range: i64,
    #[diesel(sql_type = BigInt)]
    negative_light: i64,
    #[diesel(sql_type = BigInt)]
    unknown_actuator_type: i64,
    #[diesel(sql_type = BigInt)]
    future_timestamps: i64,
}

/// Rows that break the data-quality expectations. Writes through this crate
/// cannot produce any of these; non-zero counts mean the file was written
/// around the constraints.
pub fn integrity_audit(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<Vec<IntegrityIssue>, StoreError> {
    let sql = format!(
        "SELECT \
           (SELECT COUNT(*) FROM sensor_readings \
              WHERE temperature IS NULL OR humidity IS NULL OR light_level IS NULL) AS null_telemetry, \
           (SELECT COUNT(*) FROM sensor_readings \
              WHERE temperature < {t_min} OR temperature > {t_max}) AS temperature_out_of_range, \
           (SELECT COUNT(*) FROM sensor_readings \
              WHERE humidity < {h_min} OR humidity > {h_max}) AS humidity_out_of_range, \
           (SELECT COUNT(*) FROM sensor_readings WHERE light_level < {l_min}) AS negative_light, \
           (SELECT COUNT(*) FROM actuator_events \
              WHERE actuator_type NOT IN ('fan', 'light', 'buzzer', 'led')) AS unknown_actuator_type, \
           ((SELECT COUNT(*) FROM sensor_readings WHERE timestamp > ?1) + \
            (SELECT COUNT(*) FROM actuator_events WHERE timestamp > ?1)) AS future_timestamps",
        t_min = constraints::TEMPERATURE_MIN_C,
        t_max = constraints::TEMPERATURE_MAX_C,
        h_min = constraints::HUMIDITY_MIN_PCT,
        h_max = constraints::HUMIDITY_MAX_PCT,
        l_min = constraints::LIGHT_MIN_LUX,
    );
    let counts: IntegrityCounts = diesel::sql_query(sql).bind::<Timestamp, _>(now).get_result(conn)?;

    Ok(vec![
        IntegrityIssue {
            category: "null_telemetry",
            rows: counts.null_telemetry,
        },
        IntegrityIssue {
            category: "temperature_out_of_range",
            rows: counts.temperature_out_of_range,
        },
        IntegrityIssue {
            category: "humidity_out_of_range",
            rows: counts.humidity_out_of_range,
        },
        IntegrityIssue {
            category: "negative_light",
            rows: counts.negative_light,
        },
        IntegrityIssue {
            category: "unknown_actuator_type",
            rows: counts.unknown_actuator_type,
        },
        IntegrityIssue {
            category: "future_timestamps",
            rows: counts.future_timestamps,
        },
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Liveness {
    pub last_reading: Option<NaiveDateTime>,
    pub last_actuator_event: Option<NaiveDateTime>,
    pub last_alert: Option<NaiveDateTime>,
    pub last_system_log: Option<NaiveDateTime>,
}

impl Liveness {
    /// True when no reading arrived within `max_age` of `now`.
    pub fn readings_stalled(&self, now: NaiveDateTime, max_age: Duration) -> bool {
        self.last_reading.is_none_or(|ts| now - ts > max_age)
    }
}

/// Most recent timestamp per table.
pub fn liveness(conn: &mut SqliteConnection) -> Result<Liveness, StoreError> {
    use schema::actuator_events::dsl as A;
    use schema::alerts::dsl as AL;
    use schema::sensor_readings::dsl as R;
    use schema::system_logs::dsl as S;

    Ok(Liveness {
        last_reading: R::sensor_readings.select(max(R::timestamp)).first(conn)?,
        last_actuator_event: A::actuator_events.select(max(A::timestamp)).first(conn)?,
        last_alert: AL::alerts.select(max(AL::timestamp)).first(conn)?,
        last_system_log: S::system_logs.select(max(S::timestamp)).first(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_connection;
    use crate::db::models::{ActuatorCommand, AlertDraft, Origin, SensorSample, alert_types};
    use crate::services::{alerts, ingest};
    use chrono::NaiveDate;
    use diesel::connection::SimpleConnection;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 14).unwrap().and_hms_opt(18, 0, 0).unwrap()
    }

    fn at(minutes_ago: i64) -> NaiveDateTime {
        now() - Duration::minutes(minutes_ago)
    }

    fn reading(conn: &mut SqliteConnection, ts: NaiveDateTime, temp: f64, humidity: f64, light: f64) -> i64 {
        ingest::insert_reading(conn, SensorSample::new(temp, humidity, light).at(ts), now()).unwrap()
    }

    fn fan(conn: &mut SqliteConnection, ts: NaiveDateTime, action: &str) {
        ingest::insert_actuator_event(
            conn,
            ActuatorCommand::new(ActuatorKind::Fan, action, Origin::Automatic).at(ts),
            now(),
        )
        .unwrap();
    }

    #[test]
    fn statistics_over_empty_window_are_null() {
        let mut conn = test_connection();
        let stats = statistics(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(stats.readings, 0);
        assert_eq!(stats.avg_temperature, None);
        assert_eq!(stats.max_humidity, None);
    }

    #[test]
    fn statistics_aggregate_window() {
        let mut conn = test_connection();
        reading(&mut conn, at(10), 20.0, 40.0, 100.0);
        reading(&mut conn, at(20), 26.0, 60.0, 300.0);
        reading(&mut conn, at(60 * 48), 35.0, 90.0, 900.0);

        let stats = statistics(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.avg_temperature, Some(23.0));
        assert_eq!(stats.min_temperature, Some(20.0));
        assert_eq!(stats.max_temperature, Some(26.0));
        assert_eq!(stats.avg_humidity, Some(50.0));
        assert_eq!(stats.avg_light, Some(200.0));

        assert!(statistics(&mut conn, Duration::zero(), now()).is_err());
    }

    #[test]
    fn extremes_break_ties_by_newest() {
        let mut conn = test_connection();
        let older = reading(&mut conn, at(30), 30.0, 50.0, 10.0);
        let newer = reading(&mut conn, at(5), 30.0, 50.0, 10.0);
        reading(&mut conn, at(15), 18.0, 50.0, 10.0);
        reading(&mut conn, at(25), 22.0, 50.0, 10.0);

        let top = temperature_extremes(&mut conn, Duration::hours(1), ExtremeOrder::Highest, 2, now()).unwrap();
        assert_eq!(top.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer, older]);

        let bottom = temperature_extremes(&mut conn, Duration::hours(1), ExtremeOrder::Lowest, 1, now()).unwrap();
        assert_eq!(bottom[0].temperature, 18.0);
    }

    #[test]
    fn inter_arrival_averages_adjacent_gaps() {
        let mut conn = test_connection();
        let base = at(120);
        fan(&mut conn, base + Duration::minutes(25), actions::ON);
        fan(&mut conn, base, actions::ON);
        fan(&mut conn, base + Duration::minutes(10), actions::ON);
        fan(&mut conn, base + Duration::minutes(12), actions::OFF);

        let stats = fan_inter_arrival(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(stats.events, 3);
        assert_eq!(stats.intervals, 2);
        assert_eq!(stats.avg_minutes, Some(12.5));
        assert_eq!(stats.min_minutes, Some(10.0));
        assert_eq!(stats.max_minutes, Some(15.0));
    }

    #[test]
    fn inter_arrival_with_single_event_has_no_average() {
        let mut conn = test_connection();
        fan(&mut conn, at(30), actions::ON);
        let stats = fan_inter_arrival(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.avg_minutes, None);
    }

    #[test]
    fn reading_is_on_when_fan_starts_within_five_minutes() {
        let mut conn = test_connection();
        let t = at(120);
        let close = reading(&mut conn, t, 29.0, 50.0, 100.0);
        fan(&mut conn, t + Duration::minutes(3), actions::ON);

        let t2 = at(60);
        let far = reading(&mut conn, t2, 27.0, 50.0, 100.0);
        fan(&mut conn, t2 + Duration::minutes(10), actions::ON);

        let labels = reading_fan_correlation(&mut conn, Duration::hours(24), 50, now()).unwrap();
        let state_of = |id: i64| labels.iter().find(|l| l.reading_id == id).unwrap().fan;
        assert_eq!(state_of(close), FanState::On);
        assert_eq!(state_of(far), FanState::Off);
    }

    #[test]
    fn correlation_ignores_fan_off_and_earlier_events() {
        let mut conn = test_connection();
        let t = at(30);
        let id = reading(&mut conn, t, 29.0, 50.0, 100.0);
        fan(&mut conn, t - Duration::minutes(1), actions::ON);
        fan(&mut conn, t + Duration::minutes(2), actions::OFF);

        let labels = reading_fan_correlation(&mut conn, Duration::hours(1), 10, now()).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].reading_id, id);
        assert_eq!(labels[0].fan, FanState::Off);
    }

    #[test]
    fn correlation_respects_limit() {
        let mut conn = test_connection();
        for i in 0..5 {
            reading(&mut conn, at(i * 10), 22.0, 50.0, 100.0);
        }
        let labels = reading_fan_correlation(&mut conn, Duration::hours(24), 3, now()).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0].timestamp, at(0));
    }

    #[test]
    fn conditions_before_activation_use_one_minute_lookback() {
        let mut conn = test_connection();
        let e1 = at(100);
        reading(&mut conn, e1 - Duration::seconds(30), 30.0, 60.0, 200.0);
        reading(&mut conn, e1, 32.0, 62.0, 220.0);
        reading(&mut conn, e1 - Duration::minutes(3), 10.0, 10.0, 10.0);
        fan(&mut conn, e1, actions::ON);

        let e2 = at(40);
        reading(&mut conn, e2 - Duration::seconds(10), 29.0, 70.0, 400.0);
        fan(&mut conn, e2, actions::ON);

        // no readings precede this one
        fan(&mut conn, at(10), actions::ON);

        let c = conditions_before_fan_on(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(c.fan_on_events, 3);
        assert_eq!(c.activations, 2);
        // per-event means: (31, 61, 210) and (29, 70, 400)
        assert_eq!(c.avg_temperature, Some(30.0));
        assert_eq!(c.avg_humidity, Some(65.5));
        assert_eq!(c.avg_light, Some(305.0));
    }

    #[test]
    fn conditions_without_fan_events_are_empty() {
        let mut conn = test_connection();
        reading(&mut conn, at(5), 25.0, 50.0, 100.0);
        let c = conditions_before_fan_on(&mut conn, Duration::hours(24), now()).unwrap();
        assert_eq!(c.fan_on_events, 0);
        assert_eq!(c.avg_temperature, None);
    }

    #[test]
    fn actuator_usage_splits_origin_and_filters_kind() {
        let mut conn = test_connection();
        fan(&mut conn, at(50), actions::ON);
        fan(&mut conn, at(40), actions::ON);
        ingest::insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Fan, actions::ON, Origin::Manual).at(at(30)),
            now(),
        )
        .unwrap();
        ingest::insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Light, actions::ON, Origin::Manual).at(at(20)),
            now(),
        )
        .unwrap();

        let all = actuator_usage(&mut conn, Duration::hours(24), None, now()).unwrap();
        assert_eq!(all.len(), 2);

        let fans = actuator_usage(&mut conn, Duration::hours(24), Some(ActuatorKind::Fan), now()).unwrap();
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].total, 3);
        assert_eq!(fans[0].automatic, 2);
        assert_eq!(fans[0].manual, 1);
        assert_eq!(fans[0].last_at, at(30));
    }

    #[test]
    fn actuator_usage_skips_rows_with_unknown_type() {
        let mut conn = test_connection();
        fan(&mut conn, at(50), actions::ON);
        conn.batch_execute(
            "PRAGMA ignore_check_constraints = ON; \
             INSERT INTO actuator_events (timestamp, actuator_type, action, value, auto_triggered, created_at) \
             VALUES ('2024-09-14 17:30:00', 'heater', 'on', NULL, 1, '2024-09-14 17:30:00'); \
             PRAGMA ignore_check_constraints = OFF;",
        )
        .unwrap();

        let usage = actuator_usage(&mut conn, Duration::hours(24), None, now()).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].actuator_type, ActuatorKind::Fan);
        assert_eq!(usage[0].total, 1);
    }

    #[test]
    fn windows_reaching_past_the_calendar_are_rejected() {
        let mut conn = test_connection();
        reading(&mut conn, at(5), 21.0, 50.0, 10.0);
        let huge = Duration::try_hours(10_000_000_000).unwrap();
        assert!(matches!(statistics(&mut conn, huge, now()), Err(StoreError::InvalidParameter(_))));
        assert!(matches!(
            temperature_extremes(&mut conn, huge, ExtremeOrder::Highest, 5, now()),
            Err(StoreError::InvalidParameter(_))
        ));
        assert!(matches!(actuator_usage(&mut conn, huge, None, now()), Err(StoreError::InvalidParameter(_))));
        assert!(conditions_before_fan_on(&mut conn, huge, now()).is_err());
    }

    #[test]
    fn alert_summary_filters_by_literal_substring() {
        let mut conn = test_connection();
        for (kind, value) in [
            (alert_types::TEMPERATURE_CRITICAL, 36.0),
            (alert_types::TEMPERATURE_CRITICAL, 38.5),
            (alert_types::HUMIDITY_CRITICAL, 85.0),
            (alert_types::HUMIDITY_HIGH, 72.0),
            ("temperatureXhigh", 1.0),
        ] {
            ingest::insert_alert(&mut conn, AlertDraft::new(kind, "breach").with_value(value).at(at(5)), now()).unwrap();
        }
        alerts::acknowledge(&mut conn, alerts::AckTarget::One(1)).unwrap();

        let critical = alert_summary(&mut conn, Duration::hours(24), Some("critical"), now()).unwrap();
        assert_eq!(critical.len(), 2);
        let temp = critical.iter().find(|s| s.alert_type == alert_types::TEMPERATURE_CRITICAL).unwrap();
        assert!(temp.critical);
        assert_eq!(temp.total, 2);
        assert_eq!(temp.unacknowledged, 1);
        assert_eq!(temp.max_value, Some(38.5));

        // `_` must not act as a wildcard
        let literal = alert_summary(&mut conn, Duration::hours(24), Some("temperature_"), now()).unwrap();
        assert_eq!(literal.len(), 1);
    }

    #[test]
    fn daily_report_matches_direct_counts() {
        let mut conn = test_connection();
        let today = now().date().and_hms_opt(0, 30, 0).unwrap();
        let yesterday = today - Duration::hours(2);

        for i in 0..4 {
            reading(&mut conn, today + Duration::hours(i), 20.0 + i as f64, 50.0, 100.0);
        }
        reading(&mut conn, yesterday, 40.0, 50.0, 100.0);
        fan(&mut conn, today + Duration::minutes(5), actions::ON);
        fan(&mut conn, today + Duration::minutes(65), actions::OFF);
        fan(&mut conn, yesterday, actions::ON);
        for i in 0..3 {
            ingest::insert_alert(
                &mut conn,
                AlertDraft::new(alert_types::TEMPERATURE_HIGH, "hot").at(today + Duration::minutes(i)),
                now(),
            )
            .unwrap();
        }
        ingest::insert_alert(&mut conn, AlertDraft::new(alert_types::TEMPERATURE_HIGH, "hot").at(yesterday), now()).unwrap();

        let report = daily_report(&mut conn, now()).unwrap();
        assert_eq!(report.day, now().date());
        assert_eq!(report.readings.readings, 4);
        assert_eq!(report.readings.avg_temperature, Some(21.5));
        assert_eq!(report.readings.max_temperature, Some(23.0));
        assert_eq!(report.actuator_events, 2);
        assert_eq!(report.fan_activations, 1);
        assert_eq!(report.alerts, 3);
        assert_eq!(report.unacknowledged_alerts, 3);
    }

    #[test]
    fn integrity_audit_flags_rows_written_around_constraints() {
        let mut conn = test_connection();
        reading(&mut conn, at(5), 21.0, 50.0, 10.0);
        let clean = integrity_audit(&mut conn, now()).unwrap();
        assert_eq!(clean.len(), 6);
        assert!(clean.iter().all(|i| i.rows == 0));

        conn.batch_execute(
            "PRAGMA ignore_check_constraints = ON; \
             INSERT INTO sensor_readings (timestamp, temperature, humidity, light_level, created_at) \
             VALUES ('2024-09-14 17:00:00', 150.0, 50.0, -3.0, '2024-09-14 17:00:00'); \
             PRAGMA ignore_check_constraints = OFF;",
        )
        .unwrap();

        let issues = integrity_audit(&mut conn, now()).unwrap();
        let count = |cat: &str| issues.iter().find(|i| i.category == cat).unwrap().rows;
        assert_eq!(count("temperature_out_of_range"), 1);
        assert_eq!(count("negative_light"), 1);
        assert_eq!(count("humidity_out_of_range"), 0);
        assert_eq!(count("null_telemetry"), 0);
    }

    #[test]
    fn integrity_audit_counts_future_rows() {
        let mut conn = test_connection();
        reading(&mut conn, now() + Duration::hours(2), 21.0, 50.0, 10.0);
        let issues = integrity_audit(&mut conn, now()).unwrap();
        let future = issues.iter().find(|i| i.category == "future_timestamps").unwrap();
        assert_eq!(future.rows, 1);
    }

    #[test]
    fn liveness_reports_latest_per_table() {
        let mut conn = test_connection();
        let empty = liveness(&mut conn).unwrap();
        assert!(empty.readings_stalled(now(), Duration::minutes(5)));

        reading(&mut conn, at(30), 21.0, 50.0, 10.0);
        reading(&mut conn, at(2), 21.0, 50.0, 10.0);
        fan(&mut conn, at(45), actions::ON);

        let live = liveness(&mut conn).unwrap();
        assert_eq!(live.last_reading, Some(at(2)));
        assert_eq!(live.last_actuator_event, Some(at(45)));
        assert_eq!(live.last_alert, None);
        assert!(!live.readings_stalled(now(), Duration::minutes(5)));
        assert!(live.readings_stalled(now() + Duration::minutes(10), Duration::minutes(5)));
    }
}
