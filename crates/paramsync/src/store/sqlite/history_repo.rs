//! Audit history and name change feed: `parameter_history` and
//! `name_changes` tables.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub name: String,
    pub action: String,
    pub value: Option<String>,
    pub description: String,
    pub kind: String,
    pub kms_key_id: Option<String>,
    pub version: i64,
    pub user: String,
    pub time_ms: i64,
}

const HISTORY_COLUMNS: &str =
    "name, action, value, description, kind, kms_key_id, version, user, time_ms";

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        name: row.get(0)?,
        action: row.get(1)?,
        value: row.get(2)?,
        description: row.get(3)?,
        kind: row.get(4)?,
        kms_key_id: row.get(5)?,
        version: row.get(6)?,
        user: row.get(7)?,
        time_ms: row.get(8)?,
    })
}

pub fn append(conn: &Connection, row: &HistoryRow) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO parameter_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            HISTORY_COLUMNS
        ),
        params![
            row.name,
            row.action,
            row.value,
            row.description,
            row.kind,
            row.kms_key_id,
            row.version,
            row.user,
            row.time_ms,
        ],
    )?;
    Ok(())
}

/// Entries at or before `at_ms` for names under `prefix`, oldest first.
pub fn list_before(
    conn: &Connection,
    at_ms: i64,
    prefix: &str,
) -> Result<Vec<HistoryRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM parameter_history
         WHERE time_ms <= ?1 AND substr(name, 1, length(?2)) = ?2
         ORDER BY time_ms, id",
        HISTORY_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![at_ms, prefix], history_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_for_name(conn: &Connection, name: &str) -> Result<Vec<HistoryRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM parameter_history WHERE name = ?1 ORDER BY time_ms, id",
        HISTORY_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![name], history_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records the latest state of a name in the change feed.
pub fn record_name_change(
    conn: &Connection,
    name: &str,
    state: &str,
    updated_ms: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO name_changes (name, state, updated_ms) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET state = excluded.state, updated_ms = excluded.updated_ms",
        params![name, state, updated_ms],
    )?;
    Ok(())
}

/// Returns `(name, state, updated_ms)` for every change at or after
/// `since_ms`. Callers pass a truncated timestamp, so the boundary
/// millisecond is included.
pub fn name_changes_since(
    conn: &Connection,
    since_ms: i64,
) -> Result<Vec<(String, String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name, state, updated_ms FROM name_changes
         WHERE updated_ms >= ?1 ORDER BY updated_ms",
    )?;
    let rows = stmt
        .query_map(params![since_ms], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
