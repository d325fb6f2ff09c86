//! Acknowledgment lifecycle: `Unacknowledged -> Acknowledged`, no way back.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use std::fmt;
use std::str::FromStr;

use crate::db::models::Alert;
use crate::error::StoreError;
use crate::schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTarget {
    All,
    One(i64),
}

impl FromStr for AckTarget {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" | "ALL" => Ok(AckTarget::All),
            other => other
                .parse::<i64>()
                .map(AckTarget::One)
                .map_err(|_| StoreError::InvalidParameter(format!("expected `all` or an alert id, got {:?}", other))),
        }
    }
}

impl fmt::Display for AckTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckTarget::All => f.write_str("all"),
            AckTarget::One(id) => write!(f, "{}", id),
        }
    }
}

/// Returns how many alerts changed state. Already acknowledged or missing
/// ids count as zero, so repeating a call is harmless.
pub fn acknowledge(conn: &mut SqliteConnection, target: AckTarget) -> Result<usize, StoreError> {
    use schema::alerts::dsl as AL;

    let affected = match target {
        AckTarget::All => diesel::update(AL::alerts.filter(AL::acknowledged.eq(false)))
            .set(AL::acknowledged.eq(true))
            .execute(conn)?,
        AckTarget::One(id) => diesel::update(AL::alerts.filter(AL::id.eq(id).and(AL::acknowledged.eq(false))))
            .set(AL::acknowledged.eq(true))
            .execute(conn)?,
    };

    if affected > 0 {
        info!("Acknowledged {} alert(s) (target={})", affected, target);
    } else {
        debug!("Acknowledge {} changed nothing", target);
    }
    Ok(affected)
}

/// Alerts in the given acknowledgment state, newest first.
pub fn alerts_by_state(conn: &mut SqliteConnection, acknowledged: bool, limit: i64) -> Result<Vec<Alert>, StoreError> {
    use schema::alerts::dsl as AL;

    if limit <= 0 {
        return Err(StoreError::InvalidParameter(format!("limit must be positive (got {})", limit)));
    }
    Ok(AL::alerts
        .filter(AL::acknowledged.eq(acknowledged))
        .order((AL::timestamp.desc(), AL::id.desc()))
        .limit(limit)
        .select(Alert::as_select())
        .load(conn)?)
}
