//! Deterministic synthetic history for demos and manual testing.
//!
//! Readings follow a diurnal curve with seeded noise. The automatic control
//! rules of the room controller are replayed over them so the actuator and
//! alert tables get plausible, correlated rows. Everything goes through
//! `services::ingest`, so validation and retention apply as for live data.

use chrono::{Duration, NaiveDateTime, Timelike};
use diesel::sqlite::SqliteConnection;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::f64::consts::PI;

use crate::db::constraints;
use crate::db::models::{ActuatorCommand, ActuatorKind, AlertDraft, Origin, SensorSample, actions, alert_types};
use crate::error::StoreError;
use crate::services::ingest;

const RNG_SEED: u64 = 0x5EED_0F_C0FFEE;

pub const FAN_ON_ABOVE_C: f64 = 28.0;
pub const CRITICAL_ABOVE_C: f64 = 35.0;
pub const HUMIDITY_ALERT_ABOVE_PCT: f64 = 70.0;
pub const LIGHT_ON_BELOW_LUX: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    pub days: i64,
    pub step_minutes: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub readings: usize,
    pub actuator_events: usize,
    pub alerts: usize,
}

/// Actuator state carried between samples; commands are emitted on change.
#[derive(Debug, Default)]
struct Controller {
    fan_on: bool,
    light_on: bool,
    humid: bool,
}

enum Effect {
    Command(ActuatorKind, &'static str),
    Alert(&'static str, String, f64),
}

impl Controller {
    fn apply(&mut self, temperature: f64, humidity: f64, light: f64) -> Vec<Effect> {
        let mut effects = Vec::new();

        if temperature > FAN_ON_ABOVE_C {
            if !self.fan_on {
                self.fan_on = true;
                effects.push(Effect::Command(ActuatorKind::Fan, actions::ON));
                if temperature > CRITICAL_ABOVE_C {
                    effects.push(Effect::Alert(
                        alert_types::TEMPERATURE_CRITICAL,
                        format!("temperature critical: {:.1}C", temperature),
                        temperature,
                    ));
                }
            }
        } else if self.fan_on {
            self.fan_on = false;
            effects.push(Effect::Command(ActuatorKind::Fan, actions::OFF));
        }

        if light < LIGHT_ON_BELOW_LUX {
            if !self.light_on {
                self.light_on = true;
                effects.push(Effect::Command(ActuatorKind::Light, actions::ON));
            }
        } else if self.light_on {
            self.light_on = false;
            effects.push(Effect::Command(ActuatorKind::Light, actions::OFF));
        }

        let humid = humidity > HUMIDITY_ALERT_ABOVE_PCT;
        if humid && !self.humid {
            effects.push(Effect::Alert(
                alert_types::HUMIDITY_HIGH,
                format!("humidity high: {:.1}%", humidity),
                humidity,
            ));
        }
        self.humid = humid;

        effects
    }
}

pub fn run(conn: &mut SqliteConnection, plan: SeedPlan, now: NaiveDateTime) -> Result<SeedSummary, StoreError> {
    if plan.days <= 0 || plan.step_minutes <= 0 {
        return Err(StoreError::InvalidParameter(format!(
            "seed plan needs positive days and step (got days={}, step={}min)",
            plan.days, plan.step_minutes
        )));
    }
    let step = Duration::try_minutes(plan.step_minutes).ok_or_else(|| {
        StoreError::InvalidParameter(format!("seed step out of range: {} minutes", plan.step_minutes))
    })?;
    let end = align_to_step(now, step);
    let start = constraints::checked_since("seed history", end, constraints::days_span("seed history", plan.days)?)?;

    let mut rng = SmallRng::seed_from_u64(RNG_SEED);
    let mut controller = Controller::default();
    let mut summary = SeedSummary::default();

    info!(
        "Seed: generating synthetic history from {} to {} (step={}min)",
        start, end, plan.step_minutes
    );

    let mut ts = start;
    while ts <= end {
        let day_fraction = ts.num_seconds_from_midnight() as f64 / 86_400.0;
        let temperature = compute_temperature(day_fraction, &mut rng);
        let humidity = compute_humidity(temperature, &mut rng);
        let light = compute_light(day_fraction, &mut rng);

        ingest::insert_reading(conn, SensorSample::new(temperature, humidity, light).at(ts), now)?;
        summary.readings += 1;

        for effect in controller.apply(temperature, humidity, light) {
            match effect {
                Effect::Command(kind, action) => {
                    let command = ActuatorCommand::new(kind, action, Origin::Automatic).at(ts);
                    ingest::insert_actuator_event(conn, command, now)?;
                    summary.actuator_events += 1;
                }
                Effect::Alert(alert_type, message, value) => {
                    let draft = AlertDraft::new(alert_type, message).with_value(value).at(ts);
                    ingest::insert_alert(conn, draft, now)?;
                    summary.alerts += 1;
                }
            }
        }

        ts += step;
    }

    info!(
        "Seed: complete (readings={}, actuator_events={}, alerts={})",
        summary.readings, summary.actuator_events, summary.alerts
    );
    Ok(summary)
}

fn align_to_step(ts: NaiveDateTime, step: Duration) -> NaiveDateTime {
    let step_seconds = step.num_seconds();
    let secs = ts.and_utc().timestamp();
    ts - Duration::seconds(secs.rem_euclid(step_seconds)) - Duration::nanoseconds(ts.nanosecond() as i64)
}

fn compute_temperature(day_fraction: f64, rng: &mut SmallRng) -> f64 {
    // coolest around 05:00, warmest mid-afternoon
    let diurnal = ((day_fraction - 0.375) * 2.0 * PI).sin() * 6.5;
    let noise = rng.random_range(-1.2..=1.2);
    let heat_spike = if rng.random_bool(0.01) {
        rng.random_range(4.0..=9.0)
    } else {
        0.0
    };
    (24.5 + diurnal + noise + heat_spike).clamp(-50.0, 100.0)
}

fn compute_humidity(temperature: f64, rng: &mut SmallRng) -> f64 {
    let inverse = (25.0 - temperature) * 1.4;
    let noise = rng.random_range(-5.0..=5.0);
    (55.0 + inverse + noise).clamp(0.0, 100.0)
}

fn compute_light(day_fraction: f64, rng: &mut SmallRng) -> f64 {
    let daylight = ((day_fraction - 0.5) * 2.0 * PI).cos().max(0.0);
    let cloud_cover = rng.random_range(0.5..=1.0);
    let lamp_floor = rng.random_range(5.0..=40.0);
    (daylight * 900.0 * cloud_cover + lamp_floor).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_connection;
    use crate::db::models::{ActuatorEvent, SensorReading};
    use crate::schema;
    use chrono::NaiveDate;
    use diesel::prelude::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap().and_hms_opt(12, 3, 17).unwrap()
    }

    fn plan() -> SeedPlan {
        SeedPlan {
            days: 2,
            step_minutes: 15,
        }
    }

    #[test]
    fn seed_fills_every_step() {
        let mut conn = test_connection();
        let summary = run(&mut conn, plan(), now()).unwrap();
        // two days of 15-minute steps, both ends included
        assert_eq!(summary.readings, 2 * 96 + 1);

        let readings: Vec<SensorReading> = schema::sensor_readings::table.load(&mut conn).unwrap();
        assert_eq!(readings.len(), summary.readings);
        assert!(readings.iter().all(|r| r.timestamp.minute() % 15 == 0 && r.timestamp.second() == 0));
        assert!(readings.iter().all(|r| r.timestamp <= now()));
    }

    #[test]
    fn seed_rejects_history_past_the_calendar() {
        let mut conn = test_connection();
        let long = SeedPlan {
            days: 10_000_000_000,
            step_minutes: 15,
        };
        assert!(matches!(run(&mut conn, long, now()), Err(StoreError::InvalidParameter(_))));
        let wide_step = SeedPlan {
            days: 2,
            step_minutes: i64::MAX,
        };
        assert!(matches!(run(&mut conn, wide_step, now()), Err(StoreError::InvalidParameter(_))));
        let count: i64 = schema::sensor_readings::table.count().get_result(&mut conn).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn seed_is_deterministic() {
        let mut a = test_connection();
        let mut b = test_connection();
        assert_eq!(run(&mut a, plan(), now()).unwrap(), run(&mut b, plan(), now()).unwrap());
    }

    #[test]
    fn seeded_events_are_automatic_and_alternate() {
        let mut conn = test_connection();
        run(&mut conn, plan(), now()).unwrap();

        let fan: Vec<ActuatorEvent> = schema::actuator_events::table
            .filter(schema::actuator_events::actuator_type.eq(ActuatorKind::Fan))
            .order(schema::actuator_events::timestamp.asc())
            .load(&mut conn)
            .unwrap();
        assert!(!fan.is_empty());
        assert!(fan.iter().all(|e| e.auto_triggered));
        assert_eq!(fan[0].action, actions::ON);
        assert!(fan.windows(2).all(|w| w[0].action != w[1].action));
    }

    #[test]
    fn controller_replays_thresholds() {
        let mut c = Controller::default();
        let effects = c.apply(36.0, 75.0, 100.0);
        assert_eq!(effects.len(), 4);
        assert!(c.fan_on && c.light_on);

        // steady state emits nothing
        assert!(c.apply(30.0, 72.0, 120.0).is_empty());

        let effects = c.apply(28.0, 50.0, 500.0);
        assert_eq!(effects.len(), 2);
        assert!(!c.fan_on && !c.light_on);
    }

    #[test]
    fn invalid_plan_is_rejected() {
        let mut conn = test_connection();
        let bad = SeedPlan {
            days: 0,
            step_minutes: 5,
        };
        assert!(run(&mut conn, bad, now()).is_err());
    }
}
