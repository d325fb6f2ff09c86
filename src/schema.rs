// Mirrors migrations/2025-10-01-000000_create_telemetry. Ids are declared as
// BigInt so they round-trip as i64 even though SQLite stores them as INTEGER.

diesel::table! {
    sensor_readings (id) {
        id -> BigInt,
        timestamp -> Timestamp,
        temperature -> Double,
        humidity -> Double,
        light_level -> Double,
        created_at -> Timestamp,
    }
}

diesel::table! {
    actuator_events (id) {
        id -> BigInt,
        timestamp -> Timestamp,
        actuator_type -> Text,
        action -> Text,
        value -> Nullable<Text>,
        auto_triggered -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    alerts (id) {
        id -> BigInt,
        timestamp -> Timestamp,
        alert_type -> Text,
        message -> Text,
        value -> Nullable<Double>,
        acknowledged -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    system_logs (id) {
        id -> BigInt,
        timestamp -> Timestamp,
        level -> Text,
        component -> Text,
        message -> Text,
        details -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

// No foreign keys: readings and actuator events are related only by time proximity.
diesel::allow_tables_to_appear_in_same_query!(sensor_readings, actuator_events, alerts, system_logs,);
