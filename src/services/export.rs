//! CSV projection of the recent reading window.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::info;
use std::io::Write;

use crate::db::constraints;
use crate::error::StoreError;
use crate::schema;

pub const DEFAULT_EXPORT_DAYS: i64 = 7;
pub const CSV_HEADER: &str = "Timestamp,Temperature,Humidity,Light Level";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Write readings from the last `days` days to `out`, oldest first.
/// Returns the number of data rows written.
pub fn export_readings_csv<W: Write>(
    conn: &mut SqliteConnection,
    out: &mut W,
    days: i64,
    now: NaiveDateTime,
) -> Result<usize, StoreError> {
    use schema::sensor_readings::dsl as R;

    if days <= 0 {
        return Err(StoreError::InvalidParameter(format!("export window must be positive (got {} days)", days)));
    }
    let since = constraints::checked_since("export window", now, constraints::days_span("export window", days)?)?;

    let rows: Vec<(NaiveDateTime, f64, f64, f64)> = R::sensor_readings
        .filter(R::timestamp.ge(since))
        .order((R::timestamp.asc(), R::id.asc()))
        .select((R::timestamp, R::temperature, R::humidity, R::light_level))
        .load(conn)?;

    writeln!(out, "{}", CSV_HEADER)?;
    for (ts, temperature, humidity, light) in &rows {
        writeln!(
            out,
            "{},{},{},{}",
            ts.format(TIMESTAMP_FORMAT),
            temperature,
            humidity,
            light
        )?;
    }
    out.flush()?;

    info!("Exported {} reading(s) from the last {} day(s)", rows.len(), days);
    Ok(rows.len())
}
