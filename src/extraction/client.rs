use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};

use super::prompt::{build_request, TOOL_NAME};
use super::ExtractionError;

/// Longest upstream error body kept in an error value.
const MAX_ERROR_BODY: usize = 512;

/// Vision model seam (allows mocking). Calls block; run them off the async runtime.
pub trait VisionClient: Send + Sync {
    /// Send the prompt plus one file as a data URL, return the raw completion JSON.
    fn complete(&self, prompt: &str, data_url: &str) -> Result<Value, ExtractionError>;
}

/// OpenAI-compatible chat-completions gateway.
pub struct GatewayClient {
    endpoint: String,
    api_key: String,
    model: String,
}

impl GatewayClient {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

impl VisionClient for GatewayClient {
    fn complete(&self, prompt: &str, data_url: &str) -> Result<Value, ExtractionError> {
        // Built per call: a blocking client must be created and dropped off the runtime.
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| ExtractionError::Unreachable(e.to_string()))?;

        let body = build_request(&self.model, prompt, data_url);
        let response = client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ExtractionError::Unreachable(self.endpoint.clone())
                } else {
                    ExtractionError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Extraction gateway error");
            return Err(status_error(status.as_u16(), body));
        }

        response
            .json::<Value>()
            .map_err(|e| ExtractionError::Parse(e.to_string()))
    }
}

fn status_error(status: u16, mut body: String) -> ExtractionError {
    match status {
        429 => ExtractionError::RateLimited,
        402 => ExtractionError::QuotaExhausted,
        _ => {
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            ExtractionError::Upstream { status, body }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

enum MockReply {
    Completion(Value),
    Status(u16, String),
    Unreachable,
}

/// Canned replies for tests and offline runs.
pub struct MockVisionClient {
    reply: MockReply,
    calls: AtomicUsize,
    last_data_url: Mutex<Option<String>>,
}

impl MockVisionClient {
    fn new(reply: MockReply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_data_url: Mutex::new(None),
        }
    }

    /// Reply with a forced function call carrying `arguments`.
    pub fn tool_call(arguments: Value) -> Self {
        Self::new(MockReply::Completion(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "type": "function",
                        "function": { "name": TOOL_NAME, "arguments": arguments.to_string() }
                    }]
                }
            }]
        })))
    }

    /// A well-formed invoice with the given per-field confidences.
    pub fn with_confidences(invoice_date: u8, reading_type: u8, kwh: u8) -> Self {
        Self::tool_call(json!({
            "invoice_date": "2026-03-01",
            "billing_period_start": "2026-02-01",
            "billing_period_end": "2026-02-28",
            "reading_type": "Actual",
            "kwh_used": 412.5,
            "supplier_name": "Northern Power",
            "confidence_invoice_date": invoice_date,
            "confidence_reading_type": reading_type,
            "confidence_kwh": kwh
        }))
    }

    /// Reply with plain message content and no tool call.
    pub fn content(text: &str) -> Self {
        Self::new(MockReply::Completion(json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })))
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::new(MockReply::Status(status, body.to_string()))
    }

    pub fn unreachable() -> Self {
        Self::new(MockReply::Unreachable)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_data_url(&self) -> Option<String> {
        self.last_data_url.lock().ok().and_then(|g| g.clone())
    }
}

impl VisionClient for MockVisionClient {
    fn complete(&self, _prompt: &str, data_url: &str) -> Result<Value, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_data_url.lock() {
            *last = Some(data_url.to_string());
        }
        match &self.reply {
            MockReply::Completion(v) => Ok(v.clone()),
            MockReply::Status(status, body) => Err(status_error(*status, body.clone())),
            MockReply::Unreachable => Err(ExtractionError::Unreachable("mock".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(status_error(429, String::new()), ExtractionError::RateLimited));
        assert!(matches!(status_error(402, String::new()), ExtractionError::QuotaExhausted));
        match status_error(503, "down".into()) {
            ExtractionError::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        match status_error(500, body) {
            ExtractionError::Upstream { body, .. } => {
                assert!(body.len() <= MAX_ERROR_BODY);
                assert!(body.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mock_counts_calls() {
        let client = MockVisionClient::unreachable();
        assert!(client.complete("p", "data:x").is_err());
        assert!(client.complete("p", "data:y").is_err());
        assert_eq!(client.calls(), 2);
        assert_eq!(client.last_data_url().as_deref(), Some("data:y"));
    }

    #[test]
    fn gateway_reports_unreachable_endpoint() {
        let client = GatewayClient::new("http://127.0.0.1:9/v1/chat/completions", "key", "m");
        assert!(matches!(
            client.complete("p", "data:application/pdf;base64,AA"),
            Err(ExtractionError::Unreachable(_))
        ));
    }
}
