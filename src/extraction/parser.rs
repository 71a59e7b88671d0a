use serde_json::Value;

use super::types::RawExtraction;
use super::ExtractionError;

/// Pull the extraction arguments out of a chat-completions reply.
///
/// Prefers `choices[0].message.tool_calls[0].function.arguments` (a JSON string
/// or an inline object). Without a tool call, falls back to the message
/// content with Markdown code fences removed.
pub fn parse_completion(completion: &Value) -> Result<RawExtraction, ExtractionError> {
    let message = completion
        .pointer("/choices/0/message")
        .ok_or_else(|| ExtractionError::Parse("no message in completion".into()))?;

    if let Some(arguments) = message.pointer("/tool_calls/0/function/arguments") {
        return match arguments {
            Value::String(s) => parse_object(s),
            Value::Object(_) => from_value(arguments.clone()),
            _ => Err(ExtractionError::Parse("tool call arguments are not an object".into())),
        };
    }

    let content = message.get("content").and_then(Value::as_str).unwrap_or_default();
    parse_object(&strip_code_fences(content))
}

fn parse_object(text: &str) -> Result<RawExtraction, ExtractionError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| ExtractionError::Parse(e.to_string()))?;
    from_value(value)
}

fn from_value(value: Value) -> Result<RawExtraction, ExtractionError> {
    if !value.is_object() {
        return Err(ExtractionError::Parse("extraction payload is not an object".into()));
    }
    serde_json::from_value(value).map_err(|e| ExtractionError::Parse(e.to_string()))
}

fn strip_code_fences(content: &str) -> String {
    content
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}
