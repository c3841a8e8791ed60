#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Parses raw model output into a [`GradingResult`].
//!
//! No repair is attempted: anything that fails to deserialize, or that
//! deserializes but breaks a range invariant, is reported as
//! [`ValidationError::Malformed`].

use std::sync::LazyLock;

use regex::Regex;

use crate::{error::ValidationError, schema::GradingResult, service::StructuredReply};

/// Phrases that mark a free-text reply as a refusal rather than a grading.
/// Apostrophes may be ASCII or typographic (U+2019).
static REFUSAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:i['’]?m\ sorry|i\ am\ sorry|i\ apologi[sz]e|sorry,)
        |
        \bi\s*(?:can(?:no|['’])?t|cannot|won['’]?t|will\ not|am\ unable\ to|['’]m\ unable\ to|am\ not\ able\ to)
        \s+(?:help|assist|grade|evaluate|comply|provide|review|do\ that)",
    )
    .expect("refusal pattern is valid")
});

/// Validates a reply from structured-output mode.
pub fn validate_structured(reply: StructuredReply) -> Result<GradingResult, ValidationError> {
    match reply {
        StructuredReply::Refusal(reason) => Err(ValidationError::Refusal(reason)),
        StructuredReply::Content(content) => parse_result(&content),
    }
}

/// Validates a reply from free-form mode by locating the JSON object inside
/// it.
pub fn validate_text(text: &str) -> Result<GradingResult, ValidationError> {
    match extract_json(text) {
        Some(json) => parse_result(json),
        None => match detect_refusal(text) {
            Some(reason) => Err(ValidationError::Refusal(reason)),
            None => Err(ValidationError::Malformed(
                "no JSON object found in the response".into(),
            )),
        },
    }
}

/// Deserializes `json` and checks the result's invariants.
pub fn parse_result(json: &str) -> Result<GradingResult, ValidationError> {
    if json.trim().is_empty() {
        return Err(ValidationError::Malformed("the response was empty".into()));
    }

    let result: GradingResult = serde_json::from_str(json)
        .map_err(|e| ValidationError::Malformed(format!("schema mismatch: {e}")))?;
    result.check().map_err(ValidationError::Malformed)?;

    Ok(result)
}

/// Returns the span from the first `{` to the last `}`, which leaves any
/// surrounding prose or Markdown code fences behind.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Returns the refusal text when `text` reads like the model declining.
pub fn detect_refusal(text: &str) -> Option<String> {
    let trimmed = text.trim();
    REFUSAL_PATTERN
        .is_match(trimmed)
        .then(|| trimmed.to_string())
}
