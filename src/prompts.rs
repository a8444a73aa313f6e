//! Instruction text and output schema sent to the recognition service.
//!
//! Callers can override the instructions via
//! [`crate::config::ExtractionConfig::instructions`]; the schema is fixed
//! because the parser in [`crate::pipeline::parse`] is written against it.

use serde_json::{json, Value};

/// Default instruction text for label extraction.
pub const DEFAULT_INSTRUCTIONS: &str = r#"Act as a high-precision OCR and data extraction specialist for retail logistics.
Examine the provided document (PDF/Image) which contains physical clothing labels.

Your task:
1. Segment the document into individual labels.
2. For EVERY label found, extract the requested fields into a structured format.

FIELD-SPECIFIC INSTRUCTIONS:
- TITLE: This is the primary brand name or collection line. Clothing labels often have stacked headers (e.g. "COLLECTION" on line 1, "FALL/WINTER" on line 2). Concatenate these using '\n'.
- MODEL/STYLE: Look for unique alphanumeric codes.
- SPN/ORDER: Often a 5-8 digit number labeled as 'Order', 'SPN', or 'PO'.
- BARCODE: Ensure the 'barcode_value' is exactly as printed under the barcode.

Return a JSON array of objects following the defined schema.
If no clothing labels or relevant product data is found, return an empty array []."#;

/// Schema of a single label object, in the Gemini `responseSchema` dialect
/// (OpenAPI subset, upper-case type names).
pub fn label_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "The main brand/collection header. If it spans multiple lines at the very top (e.g. 'DENIM 6-7 25' and 'AW' underneath), capture all lines separated by a newline '\\n'."
            },
            "model": {
                "type": "STRING",
                "description": "The alphanumeric model code or style reference, often found near the top or below the header (e.g. D5480AX/NM36)."
            },
            "color": {
                "type": "STRING",
                "description": "The primary color name (e.g. Anthracite, Midnight Blue)."
            },
            "size": {
                "type": "STRING",
                "description": "The sizing information (e.g. 32-28, Large, 42R)."
            },
            "spn": {
                "type": "STRING",
                "description": "The SPN, Order Number, or Factory reference (e.g. 11056)."
            },
            "barcode_type": {
                "type": "STRING",
                "description": "The specific barcode symbology if identified (e.g. EAN-13, CODE-128)."
            },
            "barcode_value": {
                "type": "STRING",
                "description": "The precise numeric or alphanumeric sequence encoded in the barcode."
            },
            "raw_text": {
                "type": "STRING",
                "description": "A complete dump of all text found on this specific label."
            }
        },
        "required": ["raw_text"]
    })
}

/// The full response schema: an array of [`label_schema`] objects.
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": label_schema()
    })
}

/// Schema instructions for providers without native structured output.
///
/// Appended to the system message so the model sees the same contract the
/// Gemini backend enforces through `responseSchema`.
pub fn schema_instructions(schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_default();
    format!(
        "\n\nRespond with JSON only, no prose and no code fences. The response MUST \
conform exactly to this schema; omit or null any field you cannot read, but always \
include raw_text:\n{schema}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_text_is_the_only_required_field() {
        let schema = response_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(schema["items"]["required"], json!(["raw_text"]));
        assert_eq!(
            schema["items"]["properties"].as_object().map(|p| p.len()),
            Some(8)
        );
    }

    #[test]
    fn schema_instructions_embed_schema() {
        let text = schema_instructions(&response_schema());
        assert!(text.contains("\"raw_text\""));
        assert!(text.contains("\"ARRAY\""));
    }

    #[test]
    fn default_instructions_ask_for_empty_array() {
        assert!(DEFAULT_INSTRUCTIONS.contains("empty array []"));
    }
}
