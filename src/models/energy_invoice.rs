use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Document;
use super::enums::ReadingType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyInvoice {
    pub id: Uuid,
    pub document_id: Uuid,
    pub invoice_date: Option<NaiveDate>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub reading_type: ReadingType,
    pub kwh_used: Option<f64>,
    pub confidence_invoice_date: Option<u8>,
    pub confidence_reading_type: Option<u8>,
    pub confidence_kwh: Option<u8>,
    pub reviewer_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnergyInvoice {
    /// Per-field scores in a fixed order, for the confidence model.
    pub fn field_confidences(&self) -> [Option<u8>; 3] {
        [
            self.confidence_invoice_date,
            self.confidence_reading_type,
            self.confidence_kwh,
        ]
    }
}

/// Invoice joined with its owning document, as listed on the energy data screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithDocument {
    #[serde(flatten)]
    pub invoice: EnergyInvoice,
    pub document: Document,
}

/// Reviewer edits. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoicePatch {
    pub invoice_date: Option<NaiveDate>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub reading_type: Option<ReadingType>,
    pub kwh_used: Option<f64>,
    pub reviewer_notes: Option<String>,
}

impl InvoicePatch {
    pub fn is_empty(&self) -> bool {
        self.invoice_date.is_none()
            && self.billing_period_start.is_none()
            && self.billing_period_end.is_none()
            && self.reading_type.is_none()
            && self.kwh_used.is_none()
            && self.reviewer_notes.is_none()
    }
}
