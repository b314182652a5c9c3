//! Replication mapping repository: `replication_mappings` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct MappingRow {
    pub destination: String,
    pub source_json: String,
    pub namespace: String,
    pub kind: String,
    pub env: String,
    pub user: String,
    pub time_ms: i64,
}

const MAPPING_COLUMNS: &str = "destination, source_json, namespace, kind, env, user, time_ms";

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<MappingRow> {
    Ok(MappingRow {
        destination: row.get(0)?,
        source_json: row.get(1)?,
        namespace: row.get(2)?,
        kind: row.get(3)?,
        env: row.get(4)?,
        user: row.get(5)?,
        time_ms: row.get(6)?,
    })
}

pub fn upsert(conn: &Connection, row: &MappingRow) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO replication_mappings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            MAPPING_COLUMNS
        ),
        params![
            row.destination,
            row.source_json,
            row.namespace,
            row.kind,
            row.env,
            row.user,
            row.time_ms,
        ],
    )?;
    Ok(())
}

pub fn remove(conn: &Connection, destination: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM replication_mappings WHERE destination = ?1",
        params![destination],
    )?;
    Ok(affected > 0)
}

pub fn find_by_destination(
    conn: &Connection,
    destination: &str,
) -> Result<Option<MappingRow>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM replication_mappings WHERE destination = ?1",
                MAPPING_COLUMNS
            ),
            params![destination],
            mapping_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Mappings whose destination starts with `prefix`.
pub fn list_under(conn: &Connection, prefix: &str) -> Result<Vec<MappingRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM replication_mappings
         WHERE substr(destination, 1, length(?1)) = ?1
         ORDER BY destination",
        MAPPING_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![prefix], mapping_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Mappings whose serialized source mentions `name`. Callers refine the
/// match, since the text search also hits longer names sharing the prefix.
pub fn list_mentioning(conn: &Connection, name: &str) -> Result<Vec<MappingRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM replication_mappings WHERE instr(source_json, ?1) > 0 ORDER BY destination",
        MAPPING_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![name], mapping_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
