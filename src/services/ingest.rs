//! Write path for collaborator-produced rows.
//!
//! Every write validates first and commits nothing on a violation. Inserts into
//! the bounded tables run their retention sweep in the same immediate
//! transaction, so a failed sweep rolls the insert back.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, warn};

use crate::db::models::{ActuatorCommand, AlertDraft, LogEntry, SensorSample};
use crate::error::StoreError;
use crate::schema;
use crate::services::retention;

pub fn insert_reading(conn: &mut SqliteConnection, sample: SensorSample, now: NaiveDateTime) -> Result<i64, StoreError> {
    use schema::sensor_readings::dsl as R;

    if let Err(e) = sample.validate() {
        warn!("Rejected sensor reading: {}", e);
        return Err(e);
    }
    let row = sample.into_row(now);

    let id = conn.immediate_transaction::<_, StoreError, _>(|conn| {
        let id: i64 = diesel::insert_into(R::sensor_readings)
            .values(&row)
            .returning(R::id)
            .get_result(conn)?;
        retention::sweep_sensor_readings(conn, now)?;
        Ok(id)
    })?;

    debug!(
        "Stored reading {} at {} ({:.1}C, {:.1}%, {:.0} lux)",
        id, row.timestamp, row.temperature, row.humidity, row.light_level
    );
    Ok(id)
}

pub fn insert_actuator_event(
    conn: &mut SqliteConnection,
    command: ActuatorCommand,
    now: NaiveDateTime,
) -> Result<i64, StoreError> {
    use schema::actuator_events::dsl as A;

    if let Err(e) = command.validate() {
        warn!("Rejected actuator event: {}", e);
        return Err(e);
    }
    let row = command.into_row(now);

    let id = conn.immediate_transaction::<_, StoreError, _>(|conn| {
        let id: i64 = diesel::insert_into(A::actuator_events)
            .values(&row)
            .returning(A::id)
            .get_result(conn)?;
        retention::sweep_actuator_events(conn, now)?;
        Ok(id)
    })?;

    debug!(
        "Stored actuator event {} at {} ({} {}, auto={})",
        id, row.timestamp, row.actuator_type, row.action, row.auto_triggered
    );
    Ok(id)
}

/// Alerts are exempt from retention; no sweep runs here.
pub fn insert_alert(conn: &mut SqliteConnection, draft: AlertDraft, now: NaiveDateTime) -> Result<i64, StoreError> {
    use schema::alerts::dsl as AL;

    if let Err(e) = draft.validate() {
        warn!("Rejected alert: {}", e);
        return Err(e);
    }
    let row = draft.into_row(now);

    let id: i64 = diesel::insert_into(AL::alerts)
        .values(&row)
        .returning(AL::id)
        .get_result(conn)?;

    debug!("Stored alert {} ({}) at {}", id, row.alert_type, row.timestamp);
    Ok(id)
}

pub fn insert_system_log(conn: &mut SqliteConnection, entry: LogEntry, now: NaiveDateTime) -> Result<i64, StoreError> {
    use schema::system_logs::dsl as S;

    if let Err(e) = entry.validate() {
        warn!("Rejected system log entry: {}", e);
        return Err(e);
    }
    let row = entry.into_row(now)?;

    let id: i64 = diesel::insert_into(S::system_logs)
        .values(&row)
        .returning(S::id)
        .get_result(conn)?;

    debug!("Stored system log {} [{}] from {}", id, row.level, row.component);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::test_connection;
    use crate::db::models::{ActuatorKind, Alert, LogLevel, Origin, SensorReading, SystemLog, actions, alert_types};
    use chrono::{Duration, NaiveDate};
    use diesel::connection::SimpleConnection;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn reading_count(conn: &mut SqliteConnection) -> i64 {
        schema::sensor_readings::table.count().get_result(conn).unwrap()
    }

    fn oldest_reading(conn: &mut SqliteConnection) -> Option<NaiveDateTime> {
        schema::sensor_readings::table
            .select(diesel::dsl::min(schema::sensor_readings::timestamp))
            .first(conn)
            .unwrap()
    }

    #[test]
    fn out_of_range_temperature_is_rejected_without_commit() {
        let mut conn = test_connection();
        insert_reading(&mut conn, SensorSample::new(22.0, 40.0, 100.0), now()).unwrap();

        let err = insert_reading(&mut conn, SensorSample::new(150.0, 40.0, 100.0), now()).unwrap_err();
        match err {
            StoreError::ConstraintViolation { field, .. } => assert_eq!(field, "temperature"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reading_count(&mut conn), 1);
    }

    #[test]
    fn check_constraints_back_up_rust_validation() {
        let mut conn = test_connection();
        let bogus = SensorSample::new(22.0, 140.0, 100.0).into_row(now());
        let result = diesel::insert_into(schema::sensor_readings::table)
            .values(&bogus)
            .execute(&mut conn);
        assert!(result.is_err());
        assert_eq!(reading_count(&mut conn), 0);
    }

    #[test]
    fn ids_increase_and_are_not_reused_after_pruning() {
        let mut conn = test_connection();
        let first = insert_reading(&mut conn, SensorSample::new(20.0, 40.0, 10.0), now()).unwrap();
        diesel::delete(schema::sensor_readings::table).execute(&mut conn).unwrap();
        let second = insert_reading(&mut conn, SensorSample::new(20.0, 40.0, 10.0), now()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn horizon_holds_after_out_of_order_backfill() {
        let mut conn = test_connection();
        let offsets_days = [3, 45, 29, 31, 0, 60, 12];
        for (i, days) in offsets_days.iter().enumerate() {
            let ts = now() - Duration::days(*days);
            // clock advances one minute per write
            let write_time = now() + Duration::minutes(i as i64);
            insert_reading(&mut conn, SensorSample::new(20.0, 40.0, 10.0).at(ts), write_time).unwrap();

            let oldest = oldest_reading(&mut conn);
            if let Some(oldest) = oldest {
                assert!(oldest >= retention::cutoff(write_time));
            }
        }
        assert_eq!(reading_count(&mut conn), 4);
    }

    #[test]
    fn actuator_insert_sweeps_only_its_table() {
        let mut conn = test_connection();
        let old = now() - Duration::days(40);
        // seed an expired reading directly so only the actuator sweep can run
        diesel::insert_into(schema::sensor_readings::table)
            .values(&SensorSample::new(20.0, 40.0, 10.0).at(old).into_row(old))
            .execute(&mut conn)
            .unwrap();

        insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Fan, actions::ON, Origin::Automatic).at(old),
            now(),
        )
        .unwrap();

        let events: i64 = schema::actuator_events::table.count().get_result(&mut conn).unwrap();
        assert_eq!(events, 0);
        assert_eq!(reading_count(&mut conn), 1);
    }

    #[test]
    fn failed_reading_sweep_rolls_back_the_insert() {
        let mut conn = test_connection();
        let old = now() - Duration::days(40);
        diesel::insert_into(schema::sensor_readings::table)
            .values(&SensorSample::new(20.0, 40.0, 10.0).at(old).into_row(old))
            .execute(&mut conn)
            .unwrap();
        conn.batch_execute(
            "CREATE TRIGGER block_reading_sweep BEFORE DELETE ON sensor_readings \
             BEGIN SELECT RAISE(ABORT, 'sweep blocked'); END;",
        )
        .unwrap();

        let result = insert_reading(&mut conn, SensorSample::new(21.0, 45.0, 300.0), now());
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(reading_count(&mut conn), 1);
        assert_eq!(oldest_reading(&mut conn), Some(old));
    }

    #[test]
    fn failed_actuator_sweep_rolls_back_the_insert() {
        let mut conn = test_connection();
        let old = now() - Duration::days(40);
        diesel::insert_into(schema::actuator_events::table)
            .values(&ActuatorCommand::new(ActuatorKind::Fan, actions::ON, Origin::Automatic).at(old).into_row(old))
            .execute(&mut conn)
            .unwrap();
        conn.batch_execute(
            "CREATE TRIGGER block_event_sweep BEFORE DELETE ON actuator_events \
             BEGIN SELECT RAISE(ABORT, 'sweep blocked'); END;",
        )
        .unwrap();

        let result = insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Fan, actions::OFF, Origin::Manual),
            now(),
        );
        assert!(result.is_err());
        let events: i64 = schema::actuator_events::table.count().get_result(&mut conn).unwrap();
        assert_eq!(events, 1);
    }

    #[test]
    fn actuator_action_must_be_a_token() {
        let mut conn = test_connection();
        let err = insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Buzzer, "", Origin::Manual),
            now(),
        )
        .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn stored_rows_read_back_intact() {
        let mut conn = test_connection();
        let id = insert_reading(&mut conn, SensorSample::new(-12.5, 0.0, 0.0), now()).unwrap();
        let reading: SensorReading = schema::sensor_readings::table.find(id).first(&mut conn).unwrap();
        assert_eq!(reading.temperature, -12.5);
        assert_eq!(reading.timestamp, now());

        let id = insert_actuator_event(
            &mut conn,
            ActuatorCommand::new(ActuatorKind::Led, "red", Origin::Manual).with_value("255,0,0"),
            now(),
        )
        .unwrap();
        let event: crate::db::models::ActuatorEvent =
            schema::actuator_events::table.find(id).first(&mut conn).unwrap();
        assert_eq!(event.actuator_type, ActuatorKind::Led);
        assert_eq!(event.value.as_deref(), Some("255,0,0"));
        assert_eq!(event.origin(), Origin::Manual);
    }

    #[test]
    fn old_alerts_survive_bounded_table_writes() {
        let mut conn = test_connection();
        let old = now() - Duration::days(60);
        for i in 0..1000 {
            insert_alert(
                &mut conn,
                AlertDraft::new(alert_types::TEMPERATURE_HIGH, format!("alert {i}"))
                    .with_value(30.0)
                    .at(old),
                now(),
            )
            .unwrap();
        }
        for _ in 0..5 {
            insert_reading(&mut conn, SensorSample::new(20.0, 40.0, 10.0), now()).unwrap();
            insert_actuator_event(
                &mut conn,
                ActuatorCommand::new(ActuatorKind::Fan, actions::OFF, Origin::Automatic),
                now(),
            )
            .unwrap();
        }

        let alerts: Vec<Alert> = schema::alerts::table.load(&mut conn).unwrap();
        assert_eq!(alerts.len(), 1000);
    }

    #[test]
    fn system_log_round_trips_level_and_details() {
        let mut conn = test_connection();
        let id = insert_system_log(
            &mut conn,
            LogEntry::new(LogLevel::Error, "sensors", "DHT22 read failed")
                .with_details(serde_json::json!({"retries": 3})),
            now(),
        )
        .unwrap();
        let log: SystemLog = schema::system_logs::table.find(id).first(&mut conn).unwrap();
        assert_eq!(log.level, LogLevel::Error);
        assert_eq!(log.details_json().unwrap(), Some(serde_json::json!({"retries": 3})));
    }
}
