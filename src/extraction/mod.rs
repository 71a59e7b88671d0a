//! Field extraction through a hosted vision-language model.
//!
//! One outbound call per document: the file goes up as a base64 data URL with
//! a fixed prompt and a forced function-call schema, the reply is parsed and
//! sanitized into [`ExtractionFields`]. No retries happen here.

pub mod client;
pub mod parser;
pub mod prompt;
pub mod sanitize;
pub mod types;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub use client::{GatewayClient, MockVisionClient, VisionClient};
pub use types::{ExtractionFields, RawExtraction};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to download document: {0}")]
    Download(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Extraction credits exhausted")]
    QuotaExhausted,

    #[error("Extraction provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Extraction provider unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to parse extraction results: {0}")]
    Parse(String),
}

impl ExtractionError {
    /// Stable short name for logs and audit details.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Upstream { .. } => "upstream",
            Self::Unreachable(_) => "unreachable",
            Self::Parse(_) => "parse",
        }
    }
}

/// Send one file to the model and return sanitized fields.
pub fn extract(
    client: &dyn VisionClient,
    filename: &str,
    bytes: &[u8],
) -> Result<ExtractionFields, ExtractionError> {
    let mime = mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/pdf");
    let data_url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));

    let completion = client.complete(prompt::EXTRACTION_PROMPT, &data_url)?;
    let raw = parser::parse_completion(&completion)?;
    Ok(sanitize::sanitize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::ReadingType;
    use serde_json::json;

    #[test]
    fn extract_runs_parse_and_sanitize() {
        let client = MockVisionClient::tool_call(json!({
            "invoice_date": "2026-03-01",
            "billing_period_start": "",
            "billing_period_end": "2026-02-28",
            "reading_type": "Customer Read",
            "kwh_used": 1234.5,
            "supplier_name": "  ",
            "confidence_invoice_date": 95,
            "confidence_reading_type": 120,
            "confidence_kwh": 88.6
        }));
        let fields = extract(&client, "bill.pdf", b"%PDF-1.4 test").unwrap();
        assert_eq!(fields.invoice_date.unwrap().to_string(), "2026-03-01");
        assert!(fields.billing_period_start.is_none());
        assert_eq!(fields.reading_type, ReadingType::CustomerRead);
        assert_eq!(fields.kwh_used, Some(1234.5));
        assert_eq!(fields.supplier_name, "Unknown Supplier");
        assert_eq!(fields.confidences(), [95, 100, 89]);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn sends_pdf_data_url() {
        let client = MockVisionClient::with_confidences(90, 90, 90);
        extract(&client, "bill.pdf", b"%PDF-").unwrap();
        let sent = client.last_data_url().unwrap();
        assert!(sent.starts_with("data:application/pdf;base64,"));
        assert!(sent.ends_with(&STANDARD.encode(b"%PDF-")));
    }

    #[test]
    fn upstream_errors_pass_through() {
        let client = MockVisionClient::status(429, "slow down");
        assert!(matches!(
            extract(&client, "bill.pdf", b"%PDF-"),
            Err(ExtractionError::RateLimited)
        ));
        let client = MockVisionClient::status(402, "pay up");
        assert!(matches!(
            extract(&client, "bill.pdf", b"%PDF-"),
            Err(ExtractionError::QuotaExhausted)
        ));
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(ExtractionError::RateLimited.kind(), "rate_limited");
        assert_eq!(ExtractionError::Parse("x".into()).kind(), "parse");
        assert_eq!(
            ExtractionError::Upstream { status: 500, body: String::new() }.kind(),
            "upstream"
        );
    }
}
