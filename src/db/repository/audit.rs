use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::{parse_opt_uuid, parse_timestamp, timestamp_str, DatabaseError};
use crate::models::*;

/// Append one entry to the audit log. Returns the new row id.
pub fn insert_audit_entry(
    conn: &Connection,
    entry: &NewAuditEntry,
    now: &DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    let details = entry
        .details
        .as_ref()
        .map(serde_json::Value::to_string);
    conn.execute(
        "INSERT INTO audit_log (action, entity_type, entity_id, user_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.action.as_str(),
            entry.entity_type,
            entry.entity_id,
            entry.user_id.map(|id| id.to_string()),
            details,
            timestamp_str(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// One page of the audit log, newest first. `limit` is capped by the caller.
pub fn list_audit_entries(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, action, entity_type, entity_id, user_id, details, created_at
         FROM audit_log
         ORDER BY created_at DESC, id DESC
         LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt
        .query_map(params![limit, offset], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, action, entity_type, entity_id, user_id, details, created_at)| {
            Ok(AuditEntry {
                id,
                action,
                entity_type,
                entity_id,
                user_id: parse_opt_uuid(user_id)?,
                // Details are written by us as JSON; anything else is kept as a string.
                details: details.map(|d| {
                    serde_json::from_str(&d).unwrap_or(serde_json::Value::String(d))
                }),
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}
