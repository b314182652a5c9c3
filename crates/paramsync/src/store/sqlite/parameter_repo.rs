//! Parameter repository: current values in the `parameters` table.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

/// A raw parameter row. `value` is ciphertext for secure parameters.
#[derive(Debug, Clone)]
pub struct ParameterRow {
    pub name: String,
    pub value: String,
    pub description: String,
    pub kind: String,
    pub kms_key_id: Option<String>,
    pub version: i64,
    pub last_modified_ms: i64,
}

pub fn find(conn: &Connection, name: &str) -> Result<Option<ParameterRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT name, value, description, kind, kms_key_id, version, last_modified_ms
             FROM parameters WHERE name = ?1",
            params![name],
            |row| {
                Ok(ParameterRow {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    kind: row.get(3)?,
                    kms_key_id: row.get(4)?,
                    version: row.get(5)?,
                    last_modified_ms: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Inserts or replaces the current value of a parameter.
pub fn upsert(conn: &Connection, row: &ParameterRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO parameters (name, value, description, kind, kms_key_id, version, last_modified_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(name) DO UPDATE SET
            value = excluded.value,
            description = excluded.description,
            kind = excluded.kind,
            kms_key_id = excluded.kms_key_id,
            version = excluded.version,
            last_modified_ms = excluded.last_modified_ms",
        params![
            row.name,
            row.value,
            row.description,
            row.kind,
            row.kms_key_id,
            row.version,
            row.last_modified_ms,
        ],
    )?;
    Ok(())
}

/// Removes a parameter. Returns false if it did not exist.
pub fn remove(conn: &Connection, name: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM parameters WHERE name = ?1", params![name])?;
    Ok(affected > 0)
}

/// Returns every name starting with `prefix`, sorted.
pub fn names_with_prefix(conn: &Connection, prefix: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM parameters
         WHERE substr(name, 1, length(?1)) = ?1
         ORDER BY name",
    )?;
    let names = stmt
        .query_map(params![prefix], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
