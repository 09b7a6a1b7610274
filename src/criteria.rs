//! Completion criteria evaluation.
//!
//! A task may declare how its reply is judged via the `completion_criteria`
//! metadata value: either a plain substring, or a JSON object with optional
//! `contains` and `min_length` clauses. Anything else fails closed.

use crate::document::Scalar;

/// Declared completion condition for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Case-insensitive substring match against the reply
    Contains(String),
    /// AND of all present clauses
    Structured {
        contains: Option<String>,
        min_length: Option<usize>,
    },
    /// Unrecognized shape; never satisfied
    Invalid,
}

impl Criteria {
    /// Interpret a `completion_criteria` metadata scalar.
    ///
    /// A string whose trimmed text is a JSON object becomes `Structured`;
    /// any other string is a plain substring. Non-string scalars and
    /// malformed clause types are `Invalid`.
    pub fn from_scalar(value: &Scalar) -> Criteria {
        let text = match value {
            Scalar::Str(s) => s,
            _ => return Criteria::Invalid,
        };

        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            return match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(serde_json::Value::Object(map)) => {
                    let contains = match map.get("contains") {
                        Some(serde_json::Value::String(s)) => Some(s.clone()),
                        Some(_) => return Criteria::Invalid,
                        None => None,
                    };
                    let min_length = match map.get("min_length") {
                        Some(value) => match value.as_u64() {
                            Some(n) => Some(n as usize),
                            None => return Criteria::Invalid,
                        },
                        None => None,
                    };
                    Criteria::Structured {
                        contains,
                        min_length,
                    }
                }
                _ => Criteria::Invalid,
            };
        }

        Criteria::Contains(text.clone())
    }
}

/// Decide whether a reply satisfies the declared criteria.
///
/// Absent criteria accept any reply. All clauses of a structured criteria
/// must hold; an `Invalid` shape is never satisfied.
pub fn satisfies(reply: &str, criteria: Option<&Criteria>) -> bool {
    let criteria = match criteria {
        Some(criteria) => criteria,
        None => return true,
    };

    match criteria {
        Criteria::Contains(needle) => {
            reply.to_lowercase().contains(&needle.to_lowercase())
        }
        Criteria::Structured {
            contains,
            min_length,
        } => {
            if let Some(needle) = contains {
                if !reply.to_lowercase().contains(&needle.to_lowercase()) {
                    return false;
                }
            }
            if let Some(min) = min_length {
                if reply.chars().count() < *min {
                    return false;
                }
            }
            true
        }
        Criteria::Invalid => false,
    }
}
