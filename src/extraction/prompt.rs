use serde_json::{json, Value};

pub const TOOL_NAME: &str = "extract_invoice_data";

pub const EXTRACTION_PROMPT: &str = "\
You are an expert energy invoice data extraction system. Analyze this energy invoice document \
and extract the following information accurately.

IMPORTANT INSTRUCTIONS:
1. Look carefully at all pages of the document
2. For dates, convert to YYYY-MM-DD format
3. For kWh, extract the total consumption figure (not daily or partial readings)
4. For reading type, look for keywords like:
   - \"Actual\" or \"A\" = Actual reading
   - \"Estimated\" or \"E\" = Estimated reading
   - \"Customer\" or \"C\" = Customer Read
   - If unclear, use \"Unknown\"
5. For supplier name, look at the letterhead, logo, or company name
6. Provide confidence scores (0-100) based on how clearly visible/readable each value is:
   - 90-100: Value is clearly visible and unambiguous
   - 75-89: Value is visible but formatting is non-standard
   - 60-74: Value is partially visible or inferred
   - Below 60: Value is guessed or not found

Extract the data now.";

/// Chat-completions body: one user message (prompt + file) and a forced call
/// to the extraction function.
pub fn build_request(model: &str, prompt: &str, data_url: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]
        }],
        "tools": [{
            "type": "function",
            "function": {
                "name": TOOL_NAME,
                "description": "Extract structured data from an energy invoice",
                "parameters": tool_parameters()
            }
        }],
        "tool_choice": { "type": "function", "function": { "name": TOOL_NAME } }
    })
}

fn tool_parameters() -> Value {
    let date = |what: &str| {
        json!({ "type": "string", "description": format!("{what} in YYYY-MM-DD format") })
    };
    let score = |what: &str| {
        json!({ "type": "number", "description": format!("Confidence score 0-100 for {what} extraction") })
    };
    json!({
        "type": "object",
        "properties": {
            "invoice_date": date("Invoice date"),
            "billing_period_start": date("Billing period start date"),
            "billing_period_end": date("Billing period end date"),
            "reading_type": {
                "type": "string",
                "enum": ["Actual", "Estimated", "Customer Read", "Unknown"],
                "description": "Type of meter reading"
            },
            "kwh_used": { "type": "number", "description": "Total kWh consumed during billing period" },
            "supplier_name": { "type": "string", "description": "Name of the energy supplier" },
            "confidence_invoice_date": score("invoice date"),
            "confidence_reading_type": score("reading type"),
            "confidence_kwh": score("kWh")
        },
        "required": [
            "invoice_date", "billing_period_start", "billing_period_end", "reading_type",
            "kwh_used", "supplier_name", "confidence_invoice_date", "confidence_reading_type",
            "confidence_kwh"
        ],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_forces_the_extraction_tool() {
        let body = build_request("google/gemini-2.5-flash", EXTRACTION_PROMPT, "data:application/pdf;base64,AAAA");
        assert_eq!(body["model"], "google/gemini-2.5-flash");
        assert_eq!(body["tool_choice"]["function"]["name"], TOOL_NAME);
        assert_eq!(body["tools"][0]["function"]["name"], TOOL_NAME);
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:application/pdf;base64,AAAA"
        );
        let required = body["tools"][0]["function"]["parameters"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 9);
    }
}
