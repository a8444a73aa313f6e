//! Response parsing: raw service text → ordered `LabelRecord`s.
//!
//! This is the parse boundary where the single hard invariant is enforced:
//! every record carries `raw_text`. Anything that is not an array of
//! label-shaped objects is a failure, never a silently empty success. A
//! literal `[]` is the one legitimate "no labels found" answer.

use crate::error::LabelScanError;
use crate::output::LabelRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Providers without structured output sometimes wrap JSON in a code fence.
fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse the service's response body into label records, in response order.
pub fn parse_labels(body: &str) -> Result<Vec<LabelRecord>, LabelScanError> {
    let json = strip_code_fences(body);
    if json.is_empty() {
        return Err(LabelScanError::EmptyResponse);
    }

    let labels: Vec<LabelRecord> =
        serde_json::from_str(json).map_err(|e| LabelScanError::MalformedResponse {
            detail: e.to_string(),
        })?;

    debug!("Parsed {} label records", labels.len());
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_in_order() {
        let labels = parse_labels(
            r#"[{"title":"A","raw_text":"first"},{"title":"B","raw_text":"second"}]"#,
        )
        .unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].raw_text, "first");
        assert_eq!(labels[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn empty_array_is_success() {
        assert!(parse_labels("[]").unwrap().is_empty());
        assert!(parse_labels("  [ ]\n").unwrap().is_empty());
    }

    #[test]
    fn empty_body_is_failure() {
        assert!(matches!(parse_labels(""), Err(LabelScanError::EmptyResponse)));
        assert!(matches!(parse_labels("  \n"), Err(LabelScanError::EmptyResponse)));
    }

    #[test]
    fn missing_raw_text_is_rejected() {
        let err = parse_labels(r#"[{"title":"A"}]"#).unwrap_err();
        assert!(matches!(err, LabelScanError::MalformedResponse { .. }));
        assert!(err.to_string().contains("raw_text"));
    }

    #[test]
    fn null_raw_text_is_rejected() {
        let err = parse_labels(r#"[{"raw_text":null}]"#).unwrap_err();
        assert!(matches!(err, LabelScanError::MalformedResponse { .. }));
    }

    #[test]
    fn object_instead_of_array_is_rejected() {
        let err = parse_labels(r#"{"raw_text":"X"}"#).unwrap_err();
        assert!(matches!(err, LabelScanError::MalformedResponse { .. }));
    }

    #[test]
    fn explicit_nulls_become_none() {
        let labels = parse_labels(
            r#"[{"title":null,"model":null,"color":null,"size":null,"spn":null,
                "barcode_type":null,"barcode_value":null,"raw_text":"X"}]"#,
        )
        .unwrap();
        assert_eq!(
            labels[0],
            LabelRecord {
                raw_text: "X".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let labels = parse_labels("```json\n[{\"raw_text\":\"X\"}]\n```").unwrap();
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn prose_is_rejected() {
        let err = parse_labels("I could not find any labels.").unwrap_err();
        assert!(matches!(err, LabelScanError::MalformedResponse { .. }));
    }
}
