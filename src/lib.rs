//! # taskrelay
//!
//! File-backed task queue for LLM inference.
//!
//! Tasks are Markdown documents with a frontmatter header. The scanner
//! enumerates the pending directory on an interval, and the engine drives
//! each document through its lifecycle:
//!
//! ```text
//! pending -> running -> complete   (criteria met, moved to completed/)
//!                   \-> incomplete (criteria unmet, retried next pass)
//!                   \-> failed     (request failed, moved to failed/)
//! ```
//!
//! Completed work gets a second, evaluator inference pass whose verdict can
//! spawn follow-up subtasks back into the pending set.
//!
//! ## Modules
//! - `document`: frontmatter codec and task status
//! - `client`: chat-completions HTTP client behind the `InferenceClient` trait
//! - `criteria`: completion-criteria evaluation
//! - `verdict`: evaluator-response parsing
//! - `engine`: per-document lifecycle engine
//! - `scanner` / `scheduler`: pass enumeration and the interval loop
//! - `store`: producer-side create / list / retry / delete operations

pub mod client;
pub mod config;
pub mod criteria;
pub mod document;
pub mod engine;
pub mod scanner;
pub mod scheduler;
pub mod store;
pub mod verdict;

pub use client::{HttpInferenceClient, InferenceClient, InferenceFailure};
pub use config::Config;
pub use document::{TaskDocument, TaskStatus};
pub use engine::Engine;
pub use scheduler::Scheduler;
