use chrono::NaiveDate;
use serde_json::Value;

use super::types::{ExtractionFields, RawExtraction};
use crate::models::enums::ReadingType;

pub const UNKNOWN_SUPPLIER: &str = "Unknown Supplier";
pub const DEFAULT_CONFIDENCE: u8 = 50;

/// Normalise untrusted model output. Never fails; bad values fall back to
/// null, `Unknown`, the placeholder supplier, or the default confidence.
pub fn sanitize(raw: RawExtraction) -> ExtractionFields {
    ExtractionFields {
        invoice_date: date(raw.invoice_date.as_ref()),
        billing_period_start: date(raw.billing_period_start.as_ref()),
        billing_period_end: date(raw.billing_period_end.as_ref()),
        reading_type: reading_type(raw.reading_type.as_ref()),
        kwh_used: kwh(raw.kwh_used.as_ref()),
        supplier_name: supplier(raw.supplier_name.as_ref()),
        confidence_invoice_date: confidence(raw.confidence_invoice_date.as_ref()),
        confidence_reading_type: confidence(raw.confidence_reading_type.as_ref()),
        confidence_kwh: confidence(raw.confidence_kwh.as_ref()),
    }
}

fn date(v: Option<&Value>) -> Option<NaiveDate> {
    let s = v?.as_str()?.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn reading_type(v: Option<&Value>) -> ReadingType {
    let Some(s) = v.and_then(Value::as_str).map(str::trim) else {
        return ReadingType::Unknown;
    };
    [
        ReadingType::Actual,
        ReadingType::Estimated,
        ReadingType::CustomerRead,
        ReadingType::Unknown,
    ]
    .into_iter()
    .find(|r| r.as_str().eq_ignore_ascii_case(s))
    .unwrap_or(ReadingType::Unknown)
}

fn kwh(v: Option<&Value>) -> Option<f64> {
    v?.as_f64().filter(|n| n.is_finite() && *n >= 0.0)
}

fn supplier(v: Option<&Value>) -> String {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SUPPLIER)
        .to_string()
}

/// Numeric scores are clamped to 0..=100 and rounded. Zero is a real score.
fn confidence(v: Option<&Value>) -> u8 {
    match v.and_then(Value::as_f64) {
        Some(n) if n.is_finite() => n.clamp(0.0, 100.0).round() as u8,
        _ => DEFAULT_CONFIDENCE,
    }
}
