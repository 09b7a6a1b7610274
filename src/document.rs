//! Task document codec.
//!
//! A task is persisted as a single text file: a `---` fenced frontmatter
//! block of `key: value` lines, a free-text body, and an optional appended
//! `## Response` section behind a further `---` delimiter.
//!
//! # Invariants
//! - Decoding never fails: malformed frontmatter degrades to an empty
//!   metadata map with the whole input as body.
//! - `decode(encode(doc))` reproduces the same metadata mapping (modulo
//!   scalar coercion) and the same body; the encoding itself is not
//!   byte-identical (quoting is normalized).

use std::fmt;

use tracing::warn;

/// Frontmatter fence.
pub const DELIMITER: &str = "---";

/// Heading that introduces the appended response section.
pub const RESPONSE_HEADING: &str = "## Response";

/// A scalar frontmatter value.
///
/// The variant tag survives an encode/decode round trip: strings are
/// re-quoted, booleans and integers are printed literally and re-coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl Scalar {
    pub fn str(value: impl Into<String>) -> Self {
        Scalar::Str(value.into())
    }

    /// The string content, for `Str` values only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a raw frontmatter value: unquote, then coerce booleans and
    /// all-digit values.
    fn parse(raw: &str) -> Scalar {
        let unquoted = unquote(raw);
        let lowered = unquoted.to_lowercase();
        if lowered == "true" {
            return Scalar::Bool(true);
        }
        if lowered == "false" {
            return Scalar::Bool(false);
        }
        if !unquoted.is_empty() && unquoted.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = unquoted.parse::<i64>() {
                return Scalar::Int(n);
            }
        }
        Scalar::Str(unquoted.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => write!(f, "\"{}\"", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
        }
    }
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Insertion-ordered metadata mapping.
///
/// Keys are lowercased on decode. `set` replaces in place so re-encoding
/// preserves the original key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, Scalar)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Scalar::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Scalar) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Scalar> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Status of a task document.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Complete
///                   \-> Incomplete
///                   \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Incomplete,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Complete => "complete",
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse a status string. Unknown values decode as `Pending`, which is
    /// what the lifecycle dispatch treats any unrecognized status as.
    pub fn parse(value: &str) -> TaskStatus {
        match value.to_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "complete" => TaskStatus::Complete,
            "incomplete" => TaskStatus::Incomplete,
            "failed" => TaskStatus::Failed,
            other => {
                warn!("Unknown task status '{}', treating as pending", other);
                TaskStatus::Pending
            }
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded task document.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDocument {
    pub metadata: Metadata,
    pub body: String,
    pub response: Option<String>,
}

impl TaskDocument {
    /// Decode a raw document.
    ///
    /// No leading delimiter, or fewer than two delimiter occurrences, yields
    /// empty metadata and the input verbatim as body (malformed but
    /// non-fatal). Frontmatter lines without a `:` are skipped with a
    /// warning.
    pub fn decode(raw: &str) -> TaskDocument {
        if !raw.starts_with(DELIMITER) {
            return TaskDocument {
                metadata: Metadata::new(),
                body: raw.to_string(),
                response: None,
            };
        }

        let parts: Vec<&str> = raw.splitn(3, DELIMITER).collect();
        if parts.len() < 3 {
            warn!("Malformed frontmatter (unterminated delimiter), treating whole document as body");
            return TaskDocument {
                metadata: Metadata::new(),
                body: raw.to_string(),
                response: None,
            };
        }

        let mut metadata = Metadata::new();
        for line in parts[1].trim().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim().to_lowercase();
                    metadata.set(key, Scalar::parse(value.trim()));
                }
                None => warn!("Skipping unparseable frontmatter line: {}", line),
            }
        }

        let (body, response) = split_response(parts[2].trim());
        TaskDocument {
            metadata,
            body,
            response,
        }
    }

    /// Re-serialize the document: frontmatter, body, and the response
    /// section when one is present.
    pub fn encode(&self) -> String {
        let frontmatter = self
            .metadata
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join("\n");

        let mut out = format!(
            "{delim}\n{frontmatter}\n{delim}\n\n{body}",
            delim = DELIMITER,
            frontmatter = frontmatter,
            body = self.body
        );
        if let Some(response) = &self.response {
            out.push_str(&format!(
                "\n\n{}\n\n{}\n\n{}\n",
                DELIMITER, RESPONSE_HEADING, response
            ));
        }
        out
    }

    /// Current status, defaulting to `Pending` when absent.
    pub fn status(&self) -> TaskStatus {
        self.metadata
            .get_str("status")
            .map(TaskStatus::parse)
            .unwrap_or(TaskStatus::Pending)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.metadata.set("status", Scalar::str(status.as_str()));
    }
}

/// Separate an appended response section from a decoded body.
///
/// The response section is the text after the first `---` delimiter whose
/// following content begins with the `## Response` heading.
fn split_response(body: &str) -> (String, Option<String>) {
    let needle = format!("\n{}\n", DELIMITER);
    let mut search = 0;
    while let Some(pos) = body[search..].find(&needle) {
        let at = search + pos;
        let after = &body[at + needle.len()..];
        if let Some(rest) = after.trim_start().strip_prefix(RESPONSE_HEADING) {
            return (
                body[..at].trim_end().to_string(),
                Some(rest.trim().to_string()),
            );
        }
        search = at + needle.len();
    }
    (body.to_string(), None)
}

/// Remove the `## Acceptance Criteria` section from a task body.
///
/// Skips everything from the heading up to (but not including) the next
/// `## ` heading. Criteria must never leak into the prompt.
pub fn strip_acceptance_criteria(body: &str) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;
    for line in body.lines() {
        if line.trim() == "## Acceptance Criteria" {
            skipping = true;
            continue;
        }
        if skipping {
            if line.starts_with("## ") {
                skipping = false;
                kept.push(line);
            }
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}
