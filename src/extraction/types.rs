use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::enums::ReadingType;

/// The model's arguments object, untrusted. Every field is kept as raw JSON
/// so a wrong type degrades to a default instead of failing the whole reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub invoice_date: Option<Value>,
    #[serde(default)]
    pub billing_period_start: Option<Value>,
    #[serde(default)]
    pub billing_period_end: Option<Value>,
    #[serde(default)]
    pub reading_type: Option<Value>,
    #[serde(default)]
    pub kwh_used: Option<Value>,
    #[serde(default)]
    pub supplier_name: Option<Value>,
    #[serde(default)]
    pub confidence_invoice_date: Option<Value>,
    #[serde(default)]
    pub confidence_reading_type: Option<Value>,
    #[serde(default)]
    pub confidence_kwh: Option<Value>,
}

/// Sanitized extraction result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionFields {
    pub invoice_date: Option<NaiveDate>,
    pub billing_period_start: Option<NaiveDate>,
    pub billing_period_end: Option<NaiveDate>,
    pub reading_type: ReadingType,
    pub kwh_used: Option<f64>,
    pub supplier_name: String,
    pub confidence_invoice_date: u8,
    pub confidence_reading_type: u8,
    pub confidence_kwh: u8,
}

impl ExtractionFields {
    pub fn confidences(&self) -> [u8; 3] {
        [
            self.confidence_invoice_date,
            self.confidence_reading_type,
            self.confidence_kwh,
        ]
    }
}
