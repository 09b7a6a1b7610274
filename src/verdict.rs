//! Evaluator-response parsing.
//!
//! Evaluator replies are free-form model text that usually embeds a JSON
//! verdict. Extraction is an explicit ordered list of strategies, each
//! returning success or failure, short-circuiting on the first hit. When
//! every strategy fails the caller falls back to treating the raw reply as
//! an opaque payload.

use serde_json::Value;
use thiserror::Error;

/// Structured verdict from an evaluator reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// `yes`/`no` acceptance decision, lowercased; empty when the field was
    /// missing from the extracted JSON.
    pub acceptance_status: String,
    /// Follow-up step descriptions, populated when the verdict rejects.
    pub next_steps: Vec<String>,
}

impl Verdict {
    pub fn is_rejection(&self) -> bool {
        self.acceptance_status == "no"
    }

    fn from_value(value: &Value) -> Verdict {
        let acceptance_status = value
            .get("acceptance_status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();

        // The upper-case variant is the documented evaluator output format;
        // it takes precedence over the snake_case spelling.
        let next_steps = value
            .get("NEXT STEPS")
            .or_else(|| value.get("next_steps"))
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .map(|step| match step {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Verdict {
            acceptance_status,
            next_steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not extract structured data from evaluator reply")]
pub struct VerdictParseError;

/// Ordered extraction strategies; first success wins.
const STRATEGIES: &[fn(&str) -> Option<Value>] =
    &[parse_direct, parse_fenced_block, parse_brace_span];

/// Extract a structured verdict from an evaluator reply.
pub fn parse_verdict(text: &str) -> Result<Verdict, VerdictParseError> {
    for strategy in STRATEGIES {
        if let Some(value) = strategy(text) {
            return Ok(Verdict::from_value(&value));
        }
    }
    Err(VerdictParseError)
}

/// Strategy 1: the entire reply is JSON.
fn parse_direct(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

/// Strategy 2: a fenced block explicitly tagged as JSON.
fn parse_fenced_block(text: &str) -> Option<Value> {
    let start = text.find("```json")? + "```json".len();
    let end = text[start..].find("```")? + start;
    serde_json::from_str(text[start..end].trim()).ok()
}

/// Strategy 3: the span from the first `{` to the last `}`.
fn parse_brace_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
