//! Inference endpoint client.
//!
//! Sends a single non-streaming chat-completion request per call. There is
//! deliberately no retry loop here: a failed call is terminal for the
//! current lifecycle pass, and the surrounding scheduler re-invokes later.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Header carrying the optional workspace hint.
pub const WORKSPACE_HEADER: &str = "X-Workspace-ID";

const MAX_REPORT_HEADERS: usize = 1_000;
const MAX_REPORT_BODY: usize = 4_000;

/// Classification of inference failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport error (connection failed, timeout)
    Network,
    /// Non-2xx HTTP status from the endpoint
    Http,
    /// Response received but the expected reply field could not be located
    Parse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Network => write!(f, "Network error"),
            FailureKind::Http => write!(f, "HTTP error"),
            FailureKind::Parse => write!(f, "Response parsing error"),
        }
    }
}

/// Diagnostic record for a failed inference call.
///
/// Carries enough detail to be rendered as a human-readable report; it never
/// propagates as a panic past the client boundary.
#[derive(Debug, Clone)]
pub struct InferenceFailure {
    pub kind: FailureKind,
    pub status_code: Option<u16>,
    pub message: String,
    pub elapsed: Option<Duration>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
}

impl InferenceFailure {
    pub fn network(message: String, elapsed: Duration) -> Self {
        Self {
            kind: FailureKind::Network,
            status_code: None,
            message,
            elapsed: Some(elapsed),
            response_headers: None,
            response_body: None,
        }
    }

    pub fn http(
        status_code: u16,
        elapsed: Duration,
        response_headers: String,
        response_body: String,
    ) -> Self {
        Self {
            kind: FailureKind::Http,
            status_code: Some(status_code),
            message: format!("Endpoint returned HTTP {}", status_code),
            elapsed: Some(elapsed),
            response_headers: Some(truncate(&response_headers, MAX_REPORT_HEADERS)),
            response_body: Some(truncate(&response_body, MAX_REPORT_BODY)),
        }
    }

    pub fn parse(message: String, elapsed: Duration, response_body: String) -> Self {
        Self {
            kind: FailureKind::Parse,
            status_code: None,
            message,
            elapsed: Some(elapsed),
            response_headers: None,
            response_body: Some(truncate(&response_body, MAX_REPORT_BODY)),
        }
    }

    /// Render the failure as a markdown error report, suitable for storing
    /// as a task document's response section.
    pub fn report(&self) -> String {
        let stage = match self.kind {
            FailureKind::Parse => "Response Parsing Error",
            _ => "API Error",
        };
        let mut lines = vec![
            "## Error Log".to_string(),
            String::new(),
            format!("### {}", stage),
            format!(
                "**timestamp:** {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
            format!("**error_type:** {}", self.kind),
            format!("**error_message:**\n```\n{}\n```", self.message),
        ];
        if let Some(code) = self.status_code {
            lines.push(format!("**status_code:** {}", code));
        }
        if let Some(elapsed) = self.elapsed {
            lines.push(format!(
                "**response_time_seconds:** {:.2}",
                elapsed.as_secs_f64()
            ));
        }
        if let Some(headers) = &self.response_headers {
            lines.push(format!("**response_headers:**\n```\n{}\n```", headers));
        }
        if let Some(body) = &self.response_body {
            lines.push(format!("**response_text:**\n```\n{}\n```", body));
        }
        lines.join("\n")
    }
}

impl std::fmt::Display for InferenceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for InferenceFailure {}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated]", &text[..end])
    }
}

/// Seam for the lifecycle engine: one chat-completion attempt per call.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Submit `content` as a single user message to `model`, returning the
    /// reply text.
    async fn submit(
        &self,
        model: &str,
        content: &str,
        workspace: Option<&str>,
    ) -> Result<String, InferenceFailure>;
}

/// reqwest-backed client for OpenAI-compatible chat-completion endpoints.
pub struct HttpInferenceClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpInferenceClient {
    /// Build a client with the given request timeout.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url,
            api_key,
        })
    }

    fn render_headers(headers: &reqwest::header::HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| {
                format!("{}: {}", name, value.to_str().unwrap_or("<non-ascii>"))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn submit(
        &self,
        model: &str,
        content: &str,
        workspace: Option<&str>,
    ) -> Result<String, InferenceFailure> {
        let request = ChatRequest {
            model,
            messages: vec![RequestMessage {
                role: "user",
                content,
            }],
            stream: false,
        };

        let mut builder = self.http.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(workspace) = workspace {
            builder = builder.header(WORKSPACE_HEADER, workspace);
        }

        tracing::debug!(model, workspace, "Submitting chat completion request");
        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = start.elapsed();
                let message = if e.is_timeout() {
                    format!("Request timeout: {}", e)
                } else if e.is_connect() {
                    format!("Connection failed: {}", e)
                } else {
                    format!("Request failed: {}", e)
                };
                return Err(InferenceFailure::network(message, elapsed));
            }
        };

        let elapsed = start.elapsed();
        let status = response.status();
        let headers = Self::render_headers(response.headers());
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(InferenceFailure::http(
                status.as_u16(),
                elapsed,
                headers,
                body,
            ));
        }

        let parsed: ChatCompletion = serde_json::from_str(&body).map_err(|e| {
            InferenceFailure::parse(format!("Failed to parse response: {}", e), elapsed, body.clone())
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            InferenceFailure::parse("No choices in response".to_string(), elapsed, body.clone())
        })?;

        choice.message.content.ok_or_else(|| {
            InferenceFailure::parse(
                "No message content in response".to_string(),
                elapsed,
                body,
            )
        })
    }
}

/// Request format for `POST <base>/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response format (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
