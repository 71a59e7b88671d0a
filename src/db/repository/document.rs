use std::str::FromStr;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use crate::db::{parse_opt_uuid, parse_timestamp, parse_uuid, timestamp_str, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

pub(crate) const DOCUMENT_COLUMNS: &str = "d.id, d.filename, d.file_url, d.document_type, d.supplier_name,
     d.status, d.overall_confidence, d.uploaded_at, d.uploaded_by";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, filename, file_url, document_type, supplier_name, status,
         overall_confidence, uploaded_at, uploaded_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            doc.id.to_string(),
            doc.filename,
            doc.file_url,
            doc.document_type.as_str(),
            doc.supplier_name,
            doc.status.as_str(),
            doc.overall_confidence,
            timestamp_str(&doc.uploaded_at),
            doc.uploaded_by.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1");
    let result = conn.query_row(&sql, params![id.to_string()], |row| DocumentRow::read(row, 0));

    match result {
        Ok(row) => Ok(Some(row.into_document()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Newest first, optionally restricted to one status.
pub fn list_documents(
    conn: &Connection,
    status: Option<DocumentStatus>,
) -> Result<Vec<Document>, DatabaseError> {
    let rows = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.status = ?1
                 ORDER BY d.uploaded_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![status.as_str()], |row| DocumentRow::read(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents d ORDER BY d.uploaded_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| DocumentRow::read(row, 0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    rows.into_iter().map(DocumentRow::into_document).collect()
}

/// Conditional status write: succeeds only while the current status is one of
/// `allowed`. Returns whether a row changed.
///
/// `overall_confidence` is written together with the status so the pair stays
/// consistent with the table CHECK.
pub fn update_status_if(
    conn: &Connection,
    id: &Uuid,
    allowed: &[DocumentStatus],
    status: DocumentStatus,
    overall_confidence: Option<u8>,
) -> Result<bool, DatabaseError> {
    if allowed.is_empty() {
        return Ok(false);
    }
    let placeholders = (0..allowed.len())
        .map(|i| format!("?{}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE documents SET status = ?1, overall_confidence = ?2
         WHERE id = ?3 AND status IN ({placeholders})"
    );

    let mut values = vec![
        Value::Text(status.as_str().into()),
        overall_confidence.map_or(Value::Null, |c| Value::Integer(i64::from(c))),
        Value::Text(id.to_string()),
    ];
    values.extend(allowed.iter().map(|s| Value::Text(s.as_str().into())));

    let rows = conn.execute(&sql, params_from_iter(values))?;
    Ok(rows > 0)
}

pub fn update_supplier_name(
    conn: &Connection,
    id: &Uuid,
    supplier_name: &str,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET supplier_name = ?2 WHERE id = ?1",
        params![id.to_string(), supplier_name],
    )?;
    if rows == 0 {
        return Err(DatabaseError::not_found("Document", id));
    }
    Ok(())
}

pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
    Ok(rows > 0)
}

pub(crate) struct DocumentRow {
    id: String,
    filename: String,
    file_url: Option<String>,
    document_type: String,
    supplier_name: Option<String>,
    status: String,
    overall_confidence: Option<u8>,
    uploaded_at: String,
    uploaded_by: Option<String>,
}

impl DocumentRow {
    /// Read the `DOCUMENT_COLUMNS` block starting at column `offset`.
    pub(crate) fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            filename: row.get(offset + 1)?,
            file_url: row.get(offset + 2)?,
            document_type: row.get(offset + 3)?,
            supplier_name: row.get(offset + 4)?,
            status: row.get(offset + 5)?,
            overall_confidence: row.get(offset + 6)?,
            uploaded_at: row.get(offset + 7)?,
            uploaded_by: row.get(offset + 8)?,
        })
    }

    pub(crate) fn into_document(self) -> Result<Document, DatabaseError> {
        Ok(Document {
            id: parse_uuid(&self.id)?,
            filename: self.filename,
            file_url: self.file_url,
            document_type: DocumentType::from_str(&self.document_type)?,
            supplier_name: self.supplier_name,
            status: DocumentStatus::from_str(&self.status)?,
            overall_confidence: self.overall_confidence,
            uploaded_at: parse_timestamp(&self.uploaded_at)?,
            uploaded_by: parse_opt_uuid(self.uploaded_by)?,
        })
    }
}
