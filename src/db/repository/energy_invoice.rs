use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::document::{DocumentRow, DOCUMENT_COLUMNS};
use crate::db::{
    parse_opt_date, parse_opt_timestamp, parse_opt_uuid, parse_timestamp, parse_uuid,
    timestamp_str, DatabaseError,
};
use crate::models::enums::*;
use crate::models::*;

const INVOICE_COLUMNS: &str = "i.id, i.document_id, i.invoice_date, i.billing_period_start,
     i.billing_period_end, i.reading_type, i.kwh_used, i.confidence_invoice_date,
     i.confidence_reading_type, i.confidence_kwh, i.reviewer_notes, i.reviewed_by,
     i.reviewed_at, i.created_at, i.updated_at";

const INVOICE_COLUMN_COUNT: usize = 15;

fn date_str(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn insert_invoice(conn: &Connection, invoice: &EnergyInvoice) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO energy_invoices (id, document_id, invoice_date, billing_period_start,
         billing_period_end, reading_type, kwh_used, confidence_invoice_date,
         confidence_reading_type, confidence_kwh, reviewer_notes, reviewed_by, reviewed_at,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            invoice.id.to_string(),
            invoice.document_id.to_string(),
            date_str(invoice.invoice_date),
            date_str(invoice.billing_period_start),
            date_str(invoice.billing_period_end),
            invoice.reading_type.as_str(),
            invoice.kwh_used,
            invoice.confidence_invoice_date,
            invoice.confidence_reading_type,
            invoice.confidence_kwh,
            invoice.reviewer_notes,
            invoice.reviewed_by.map(|id| id.to_string()),
            invoice.reviewed_at.as_ref().map(timestamp_str),
            timestamp_str(&invoice.created_at),
            timestamp_str(&invoice.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_invoice(conn: &Connection, id: &Uuid) -> Result<Option<EnergyInvoice>, DatabaseError> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM energy_invoices i WHERE i.id = ?1");
    query_one_invoice(conn, &sql, &id.to_string())
}

pub fn get_invoice_by_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Option<EnergyInvoice>, DatabaseError> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM energy_invoices i WHERE i.document_id = ?1");
    query_one_invoice(conn, &sql, &document_id.to_string())
}

fn query_one_invoice(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<EnergyInvoice>, DatabaseError> {
    match conn.query_row(sql, params![key], |row| InvoiceRow::read(row, 0)) {
        Ok(row) => Ok(Some(row.into_invoice()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every invoice with its owning document, newest first.
pub fn list_invoices_with_documents(
    conn: &Connection,
) -> Result<Vec<InvoiceWithDocument>, DatabaseError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS}, {DOCUMENT_COLUMNS}
         FROM energy_invoices i JOIN documents d ON d.id = i.document_id
         ORDER BY i.created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                InvoiceRow::read(row, 0)?,
                DocumentRow::read(row, INVOICE_COLUMN_COUNT)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(invoice, document)| {
            Ok(InvoiceWithDocument {
                invoice: invoice.into_invoice()?,
                document: document.into_document()?,
            })
        })
        .collect()
}

pub fn get_invoice_with_document(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<InvoiceWithDocument>, DatabaseError> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS}, {DOCUMENT_COLUMNS}
         FROM energy_invoices i JOIN documents d ON d.id = i.document_id
         WHERE i.id = ?1"
    );
    let result = conn.query_row(&sql, params![id.to_string()], |row| {
        Ok((
            InvoiceRow::read(row, 0)?,
            DocumentRow::read(row, INVOICE_COLUMN_COUNT)?,
        ))
    });
    match result {
        Ok((invoice, document)) => Ok(Some(InvoiceWithDocument {
            invoice: invoice.into_invoice()?,
            document: document.into_document()?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Apply a reviewer patch. Unset patch fields keep their stored value.
pub fn update_invoice_fields(
    conn: &Connection,
    id: &Uuid,
    patch: &InvoicePatch,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE energy_invoices SET
            invoice_date = COALESCE(?2, invoice_date),
            billing_period_start = COALESCE(?3, billing_period_start),
            billing_period_end = COALESCE(?4, billing_period_end),
            reading_type = COALESCE(?5, reading_type),
            kwh_used = COALESCE(?6, kwh_used),
            reviewer_notes = COALESCE(?7, reviewer_notes),
            updated_at = ?8
         WHERE id = ?1",
        params![
            id.to_string(),
            date_str(patch.invoice_date),
            date_str(patch.billing_period_start),
            date_str(patch.billing_period_end),
            patch.reading_type.map(|r| r.as_str()),
            patch.kwh_used,
            patch.reviewer_notes,
            timestamp_str(now),
        ],
    )?;
    Ok(rows > 0)
}

/// The approval write: all confidences to 100 and the reviewer pair set together.
/// This is the only writer of `reviewed_by`/`reviewed_at`.
pub fn mark_invoice_reviewed(
    conn: &Connection,
    id: &Uuid,
    reviewer: &Uuid,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE energy_invoices SET
            confidence_invoice_date = 100,
            confidence_reading_type = 100,
            confidence_kwh = 100,
            reviewed_by = ?2,
            reviewed_at = ?3,
            updated_at = ?3
         WHERE id = ?1",
        params![id.to_string(), reviewer.to_string(), timestamp_str(now)],
    )?;
    Ok(rows > 0)
}

pub fn delete_invoice(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM energy_invoices WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(rows > 0)
}

struct InvoiceRow {
    id: String,
    document_id: String,
    invoice_date: Option<String>,
    billing_period_start: Option<String>,
    billing_period_end: Option<String>,
    reading_type: String,
    kwh_used: Option<f64>,
    confidence_invoice_date: Option<u8>,
    confidence_reading_type: Option<u8>,
    confidence_kwh: Option<u8>,
    reviewer_notes: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl InvoiceRow {
    fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            document_id: row.get(offset + 1)?,
            invoice_date: row.get(offset + 2)?,
            billing_period_start: row.get(offset + 3)?,
            billing_period_end: row.get(offset + 4)?,
            reading_type: row.get(offset + 5)?,
            kwh_used: row.get(offset + 6)?,
            confidence_invoice_date: row.get(offset + 7)?,
            confidence_reading_type: row.get(offset + 8)?,
            confidence_kwh: row.get(offset + 9)?,
            reviewer_notes: row.get(offset + 10)?,
            reviewed_by: row.get(offset + 11)?,
            reviewed_at: row.get(offset + 12)?,
            created_at: row.get(offset + 13)?,
            updated_at: row.get(offset + 14)?,
        })
    }

    fn into_invoice(self) -> Result<EnergyInvoice, DatabaseError> {
        Ok(EnergyInvoice {
            id: parse_uuid(&self.id)?,
            document_id: parse_uuid(&self.document_id)?,
            invoice_date: parse_opt_date(self.invoice_date),
            billing_period_start: parse_opt_date(self.billing_period_start),
            billing_period_end: parse_opt_date(self.billing_period_end),
            reading_type: ReadingType::from_str(&self.reading_type)?,
            kwh_used: self.kwh_used,
            confidence_invoice_date: self.confidence_invoice_date,
            confidence_reading_type: self.confidence_reading_type,
            confidence_kwh: self.confidence_kwh,
            reviewer_notes: self.reviewer_notes,
            reviewed_by: parse_opt_uuid(self.reviewed_by)?,
            reviewed_at: parse_opt_timestamp(self.reviewed_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
