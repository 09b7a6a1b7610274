//! Task lifecycle engine.
//!
//! Drives one document through the state machine per invocation:
//!
//! ```text
//! pending -> running -> complete   (moved to the completed set)
//!                   \-> incomplete (left in place)
//!                   \-> failed     (moved to the failed set)
//! ```
//!
//! Documents already marked `complete` or `failed` are only reconciled,
//! moved to their matching set without another inference call, so a crash
//! between the final write and the rename recovers on the next pass.
//! `running` documents are skipped entirely: the running write is a
//! cooperative advisory lock against a concurrent pass, not a mutual
//! exclusion guarantee.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::InferenceClient;
use crate::config::Config;
use crate::criteria::{satisfies, Criteria};
use crate::document::{strip_acceptance_criteria, Metadata, Scalar, TaskDocument, TaskStatus};
use crate::verdict::parse_verdict;

/// Workspace hint for the secondary evaluator call.
const EVALUATOR_WORKSPACE: &str = "evaluator";

/// What a lifecycle pass did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Document is `running`, owned by another pass; no write, no move.
    Skipped,
    /// Document was already terminal; only the directory move was performed.
    Reconciled(TaskStatus),
    /// Reply accepted; document moved to the completed set.
    Completed,
    /// Reply rejected by criteria; document left in the pending set.
    Incomplete,
    /// Inference call failed; document moved to the failed set.
    Failed,
}

/// Errors terminal for a single document, never for the batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read task document {path}: {source}")]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write task document {path}: {source}")]
    DocumentWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to relocate task document {path}: {source}")]
    Relocate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The lifecycle engine. At most one inference call per document per
/// invocation, plus the evaluator call after a completion.
pub struct Engine {
    config: Arc<Config>,
    client: Arc<dyn InferenceClient>,
}

impl Engine {
    pub fn new(config: Arc<Config>, client: Arc<dyn InferenceClient>) -> Self {
        Self { config, client }
    }

    /// Run one lifecycle pass over the document at `path`.
    ///
    /// `incomplete` documents left in the pending set are processed again
    /// like `pending` ones; re-queueing is otherwise an external concern.
    pub async fn process(&self, path: &Path) -> Result<PassOutcome, EngineError> {
        let name = display_name(path);
        info!("Processing {}", name);

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EngineError::DocumentRead {
                path: path.to_path_buf(),
                source,
            })?;
        let mut doc = TaskDocument::decode(&raw);

        match doc.status() {
            TaskStatus::Complete => {
                info!("{} already complete, reconciling move", name);
                self.relocate(path, &mut doc, &self.config.completed_dir)
                    .await?;
                return Ok(PassOutcome::Reconciled(TaskStatus::Complete));
            }
            TaskStatus::Failed => {
                info!("{} already failed, reconciling move", name);
                self.relocate(path, &mut doc, &self.config.failed_dir)
                    .await?;
                return Ok(PassOutcome::Reconciled(TaskStatus::Failed));
            }
            TaskStatus::Running => {
                info!("Skipping {}: marked running by another pass", name);
                return Ok(PassOutcome::Skipped);
            }
            TaskStatus::Pending | TaskStatus::Incomplete => {}
        }

        let prompt = strip_acceptance_criteria(&doc.body);
        if prompt != doc.body {
            info!("Acceptance criteria section removed from request");
        }

        let model = doc
            .metadata
            .get_str("model")
            .unwrap_or(&self.config.default_model)
            .to_string();
        let workspace = doc
            .metadata
            .get_str("workspace")
            .unwrap_or(&self.config.default_workspace)
            .to_string();
        let criteria = doc
            .metadata
            .get("completion_criteria")
            .map(Criteria::from_scalar);

        // Advisory lock: persist `running` before any network call so a
        // concurrent pass skips this document.
        doc.set_status(TaskStatus::Running);
        doc.metadata.set("last_updated", Scalar::str(timestamp()));
        self.write(path, &doc).await?;

        info!(%model, %workspace, "Submitting task to inference endpoint");
        match self.client.submit(&model, &prompt, Some(&workspace)).await {
            Ok(reply) => {
                let accepted = satisfies(&reply, criteria.as_ref());
                if accepted {
                    info!("Criteria met, marking {} complete", name);
                    doc.set_status(TaskStatus::Complete);
                } else {
                    info!("Criteria not met, marking {} incomplete", name);
                    doc.set_status(TaskStatus::Incomplete);
                    doc.metadata.set(
                        "failure_reason",
                        Scalar::str("Completion criteria not met"),
                    );
                }
                doc.metadata.set("last_updated", Scalar::str(timestamp()));
                doc.response = Some(reply.clone());
                self.write(path, &doc).await?;

                if accepted {
                    // Committed terminal status; the evaluator pass can no
                    // longer change it.
                    self.evaluator_pass(path, &doc, &model, &reply).await;
                    self.relocate(path, &mut doc, &self.config.completed_dir)
                        .await?;
                    Ok(PassOutcome::Completed)
                } else {
                    Ok(PassOutcome::Incomplete)
                }
            }
            Err(failure) => {
                error!("Inference call failed for {}: {}", name, failure);
                doc.set_status(TaskStatus::Failed);
                doc.metadata
                    .set("failure_reason", Scalar::str("API Request Failed"));
                doc.metadata.set("last_updated", Scalar::str(timestamp()));
                doc.response = Some(failure.report());
                self.write(path, &doc).await?;
                self.relocate(path, &mut doc, &self.config.failed_dir)
                    .await?;
                Ok(PassOutcome::Failed)
            }
        }
    }

    /// Secondary evaluator call after a completion. Failures here are
    /// logged and never affect the primary document.
    async fn evaluator_pass(&self, path: &Path, doc: &TaskDocument, model: &str, reply: &str) {
        let source_stem = file_stem(path);
        info!("Sending reply to evaluator workspace");
        let eval_reply = match self
            .client
            .submit(model, reply, Some(EVALUATOR_WORKSPACE))
            .await
        {
            Ok(eval_reply) => eval_reply,
            Err(failure) => {
                warn!("Evaluator call failed: {}", failure);
                return;
            }
        };

        match parse_verdict(&eval_reply) {
            Ok(verdict) => {
                info!("Evaluator acceptance status: {}", verdict.acceptance_status);
                if verdict.is_rejection() && !verdict.next_steps.is_empty() {
                    info!(
                        "Evaluator rejected with {} next steps",
                        verdict.next_steps.len()
                    );
                    if let Err(e) = self
                        .spawn_next_steps(&source_stem, &verdict.next_steps, &doc.metadata)
                        .await
                    {
                        error!("Failed to create next-step subtasks: {}", e);
                    }
                }
            }
            // Raw-text fallback: the evaluation subtask below still carries
            // the full reply.
            Err(e) => warn!("Could not parse evaluator response: {}", e),
        }

        if let Err(e) = self
            .spawn_evaluation(&source_stem, &eval_reply, &doc.metadata)
            .await
        {
            error!("Failed to create evaluation subtask: {}", e);
        }
    }

    /// One new pending document per follow-up step.
    async fn spawn_next_steps(
        &self,
        source_stem: &str,
        steps: &[String],
        source_metadata: &Metadata,
    ) -> Result<(), EngineError> {
        let base = subtask_base(source_stem);
        for (i, step) in steps.iter().enumerate() {
            let name = format!("{}_step{}_{}.md", base, i + 1, file_timestamp());
            let path = self.config.pending_dir.join(&name);

            let mut metadata = self.subtask_metadata(source_stem, source_metadata);
            metadata.set(
                "workspace",
                Scalar::str(
                    source_metadata
                        .get_str("workspace")
                        .unwrap_or(&self.config.default_workspace),
                ),
            );
            metadata.set("task_type", Scalar::str("next_step"));
            metadata.set("step_number", Scalar::Int((i + 1) as i64));

            let doc = TaskDocument {
                metadata,
                body: step.clone(),
                response: None,
            };
            self.write(&path, &doc).await?;
            info!("Created next step subtask: {}", name);
        }
        Ok(())
    }

    /// The always-spawned evaluation subtask carrying the raw evaluator
    /// reply.
    async fn spawn_evaluation(
        &self,
        source_stem: &str,
        eval_reply: &str,
        source_metadata: &Metadata,
    ) -> Result<(), EngineError> {
        let name = format!("{}_{}.md", subtask_base(source_stem), file_timestamp());
        let path = self.config.pending_dir.join(&name);

        let mut metadata = self.subtask_metadata(source_stem, source_metadata);
        metadata.set("workspace", Scalar::str(EVALUATOR_WORKSPACE));
        metadata.set("task_type", Scalar::str("evaluation"));

        let doc = TaskDocument {
            metadata,
            body: eval_reply.to_string(),
            response: None,
        };
        self.write(&path, &doc).await?;
        info!("Created evaluation subtask: {}", name);
        Ok(())
    }

    /// Fields shared by every spawned subtask.
    fn subtask_metadata(&self, source_stem: &str, source_metadata: &Metadata) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.set("status", Scalar::str(TaskStatus::Pending.as_str()));
        metadata.set(
            "model",
            Scalar::str(
                source_metadata
                    .get_str("model")
                    .unwrap_or(&self.config.default_model),
            ),
        );
        metadata.set("original_task", Scalar::str(source_stem));
        metadata.set("created_at", Scalar::str(timestamp()));
        metadata
    }

    /// Attach a fresh task id and rename the document into `dest_dir`.
    async fn relocate(
        &self,
        path: &Path,
        doc: &mut TaskDocument,
        dest_dir: &Path,
    ) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| EngineError::Relocate {
                path: path.to_path_buf(),
                source,
            })?;

        let created_at = timestamp();
        let (task_id, short_id) = generate_task_id(&created_at);
        doc.metadata
            .set("created_at", Scalar::str(created_at.as_str()));
        doc.metadata.set("task_id", Scalar::str(task_id));
        self.write(path, doc).await?;

        let new_name = format!("{}_{}.md", file_stem(path), short_id);
        let destination = dest_dir.join(&new_name);
        tokio::fs::rename(path, &destination)
            .await
            .map_err(|source| EngineError::Relocate {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "Moved '{}' to {} as '{}'",
            display_name(path),
            dest_dir.display(),
            new_name
        );
        Ok(())
    }

    async fn write(&self, path: &Path, doc: &TaskDocument) -> Result<(), EngineError> {
        tokio::fs::write(path, doc.encode())
            .await
            .map_err(|source| EngineError::DocumentWrite {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Hash a fresh timestamp into a task identifier.
///
/// Returns the full hex digest and its 6-character short form. Uniqueness
/// only needs to hold within one run; collisions are treated as negligible.
pub fn generate_task_id(timestamp: &str) -> (String, String) {
    let digest = Sha256::digest(timestamp.as_bytes());
    let full = hex::encode(digest);
    let short = full[..6].to_string();
    (full, short)
}

/// Strip a trailing `_xxxxxx` short-hash suffix so chains of subtasks do
/// not accumulate suffixes.
fn subtask_base(stem: &str) -> &str {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = SUFFIX.get_or_init(|| {
        Regex::new(r"_[0-9a-f]{6}$").expect("short-hash suffix pattern is valid")
    });
    match re.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InferenceFailure;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Stub client replaying canned responses and recording calls.
    struct StubClient {
        responses: Mutex<VecDeque<Result<String, InferenceFailure>>>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl StubClient {
        fn new(responses: Vec<Result<String, InferenceFailure>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn calls(&self) -> Vec<(String, String, Option<String>)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl InferenceClient for StubClient {
        async fn submit(
            &self,
            model: &str,
            content: &str,
            workspace: Option<&str>,
        ) -> Result<String, InferenceFailure> {
            self.calls.lock().await.push((
                model.to_string(),
                content.to_string(),
                workspace.map(str::to_string),
            ));
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| panic!("stub client ran out of responses"))
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: Arc<Config>,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let config = Arc::new(Config::new(
            "http://localhost/api/chat/completions".to_string(),
            None,
            root.join("pending"),
            root.join("completed"),
            root.join("failed"),
            "llama3".to_string(),
            "default".to_string(),
        ));
        std::fs::create_dir_all(&config.pending_dir).unwrap();
        std::fs::create_dir_all(&config.completed_dir).unwrap();
        std::fs::create_dir_all(&config.failed_dir).unwrap();
        Fixture { _tmp: tmp, config }
    }

    fn write_task(config: &Config, name: &str, raw: &str) -> PathBuf {
        let path = config.pending_dir.join(name);
        std::fs::write(&path, raw).unwrap();
        path
    }

    fn list_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn pending_task_completes_and_spawns_evaluation_subtask() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("the reply".to_string()),
            Ok(r#"{"acceptance_status": "yes"}"#.to_string()),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "mytask.md",
            "---\nstatus: \"pending\"\n---\n\nWrite a poem.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed);

        // Source moved to the completed set with a short-hash suffix.
        let completed = list_names(&fx.config.completed_dir);
        assert_eq!(completed.len(), 1);
        assert!(completed[0].starts_with("mytask_"));
        let moved = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.completed_dir.join(&completed[0])).unwrap(),
        );
        assert_eq!(moved.status(), TaskStatus::Complete);
        assert_eq!(moved.body, "Write a poem.");
        assert_eq!(moved.response.as_deref(), Some("the reply"));
        assert_eq!(moved.metadata.get_str("task_id").unwrap().len(), 64);

        // Exactly one evaluation subtask back in the pending set.
        let pending = list_names(&fx.config.pending_dir);
        assert_eq!(pending.len(), 1);
        let subtask = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.pending_dir.join(&pending[0])).unwrap(),
        );
        assert_eq!(subtask.metadata.get_str("task_type"), Some("evaluation"));
        assert_eq!(subtask.metadata.get_str("workspace"), Some("evaluator"));
        assert_eq!(subtask.metadata.get_str("original_task"), Some("mytask"));
        assert_eq!(subtask.body, r#"{"acceptance_status": "yes"}"#);

        // Second call went to the evaluator workspace with the raw reply.
        let calls = client.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1, "the reply");
        assert_eq!(calls[1].2.as_deref(), Some("evaluator"));
    }

    #[tokio::test]
    async fn rejection_spawns_next_step_and_evaluation_subtasks() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("task reply".to_string()),
            Ok(r#"prefix {"acceptance_status":"no","next_steps":["a","b"]} suffix"#.to_string()),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "build.md",
            "---\nstatus: \"pending\"\n---\n\nBuild it.",
        );
        engine.process(&path).await.unwrap();

        // Two next-step subtasks plus one evaluation subtask.
        let pending = list_names(&fx.config.pending_dir);
        assert_eq!(pending.len(), 3);

        let steps: Vec<TaskDocument> = pending
            .iter()
            .filter(|n| n.contains("_step"))
            .map(|n| {
                TaskDocument::decode(
                    &std::fs::read_to_string(fx.config.pending_dir.join(n)).unwrap(),
                )
            })
            .collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].metadata.get_str("task_type"), Some("next_step"));
        assert_eq!(steps[0].metadata.get("step_number"), Some(&Scalar::Int(1)));
        assert_eq!(steps[0].body, "a");
        assert_eq!(steps[1].body, "b");

        let evaluation = pending.iter().find(|n| !n.contains("_step")).unwrap();
        let evaluation = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.pending_dir.join(evaluation)).unwrap(),
        );
        assert_eq!(evaluation.metadata.get_str("task_type"), Some("evaluation"));
        assert!(evaluation.body.contains("prefix"));
    }

    #[tokio::test]
    async fn unparseable_evaluator_reply_still_creates_raw_evaluation_subtask() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("the reply".to_string()),
            Ok("no json here at all".to_string()),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "fuzzy.md",
            "---\nstatus: \"pending\"\n---\n\nDo it.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed);

        // No next-step subtasks, but the raw reply is carried by exactly one
        // evaluation subtask.
        let pending = list_names(&fx.config.pending_dir);
        assert_eq!(pending.len(), 1);
        let subtask = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.pending_dir.join(&pending[0])).unwrap(),
        );
        assert_eq!(subtask.metadata.get_str("task_type"), Some("evaluation"));
        assert_eq!(subtask.body, "no json here at all");

        assert_eq!(list_names(&fx.config.completed_dir).len(), 1);
    }

    #[tokio::test]
    async fn evaluator_call_failure_leaves_committed_completion_untouched() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("the reply".to_string()),
            Err(InferenceFailure::network(
                "Connection failed: connection refused".to_string(),
                Duration::from_secs(1),
            )),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "flaky.md",
            "---\nstatus: \"pending\"\n---\n\nDo it.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed);
        assert_eq!(client.calls().await.len(), 2);

        // No subtasks of any kind, and the completion itself is unaffected.
        assert!(list_names(&fx.config.pending_dir).is_empty());
        let completed = list_names(&fx.config.completed_dir);
        assert_eq!(completed.len(), 1);
        let doc = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.completed_dir.join(&completed[0])).unwrap(),
        );
        assert_eq!(doc.status(), TaskStatus::Complete);
        assert_eq!(doc.response.as_deref(), Some("the reply"));
        assert_eq!(doc.metadata.get("failure_reason"), None);
    }

    #[tokio::test]
    async fn completion_keeps_prior_failure_annotation() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("now it is DONE".to_string()),
            Ok("{}".to_string()),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        // A document that went incomplete on an earlier pass. The annotation
        // from that pass is deliberately left in place when it completes.
        let path = write_task(
            &fx.config,
            "second_try.md",
            "---\nstatus: \"incomplete\"\nfailure_reason: \"Completion criteria not met\"\ncompletion_criteria: \"DONE\"\n---\n\nDo it.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed);

        let completed = list_names(&fx.config.completed_dir);
        assert_eq!(completed.len(), 1);
        let doc = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.completed_dir.join(&completed[0])).unwrap(),
        );
        assert_eq!(doc.status(), TaskStatus::Complete);
        assert_eq!(
            doc.metadata.get_str("failure_reason"),
            Some("Completion criteria not met")
        );
    }

    #[tokio::test]
    async fn inference_timeout_moves_task_to_failed_set() {
        let fx = fixture();
        let client = StubClient::new(vec![Err(InferenceFailure::network(
            "Request timeout: deadline elapsed".to_string(),
            Duration::from_secs(300),
        ))]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "slow.md",
            "---\nstatus: \"pending\"\n---\n\nTake forever.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Failed);

        assert!(list_names(&fx.config.pending_dir).is_empty());
        let failed = list_names(&fx.config.failed_dir);
        assert_eq!(failed.len(), 1);
        let doc = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.failed_dir.join(&failed[0])).unwrap(),
        );
        assert_eq!(doc.status(), TaskStatus::Failed);
        assert_eq!(
            doc.metadata.get_str("failure_reason"),
            Some("API Request Failed")
        );
        assert!(doc.response.unwrap().contains("Request timeout"));
    }

    #[tokio::test]
    async fn running_document_is_left_untouched() {
        let fx = fixture();
        let client = StubClient::new(vec![]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let raw = "---\nstatus: \"running\"\n---\n\nIn flight.";
        let path = write_task(&fx.config, "owned.md", raw);
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Skipped);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn completed_document_in_pending_set_is_reconciled() {
        let fx = fixture();
        let client = StubClient::new(vec![]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "done.md",
            "---\nstatus: \"complete\"\n---\n\nAlready finished.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Reconciled(TaskStatus::Complete));

        let completed = list_names(&fx.config.completed_dir);
        assert_eq!(completed.len(), 1);
        assert!(completed[0].starts_with("done_"));
        let doc = TaskDocument::decode(
            &std::fs::read_to_string(fx.config.completed_dir.join(&completed[0])).unwrap(),
        );
        assert_eq!(doc.body, "Already finished.");
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn unmet_criteria_leaves_incomplete_document_in_place() {
        let fx = fixture();
        let client = StubClient::new(vec![Ok("nothing useful".to_string())]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "strict.md",
            "---\nstatus: \"pending\"\ncompletion_criteria: \"FINISHED\"\n---\n\nDo it.",
        );
        let outcome = engine.process(&path).await.unwrap();
        assert_eq!(outcome, PassOutcome::Incomplete);

        // No evaluator call, no move.
        assert_eq!(client.calls().await.len(), 1);
        let doc = TaskDocument::decode(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(doc.status(), TaskStatus::Incomplete);
        assert_eq!(
            doc.metadata.get_str("failure_reason"),
            Some("Completion criteria not met")
        );
        assert_eq!(doc.response.as_deref(), Some("nothing useful"));
    }

    #[tokio::test]
    async fn acceptance_criteria_never_reach_the_prompt() {
        let fx = fixture();
        let client = StubClient::new(vec![
            Ok("ok".to_string()),
            Ok("{}".to_string()),
        ]);
        let engine = Engine::new(fx.config.clone(), client.clone());

        let path = write_task(
            &fx.config,
            "guarded.md",
            "---\nstatus: \"pending\"\n---\n\nIntro\n## Acceptance Criteria\nsecret\n## Next\nbar",
        );
        engine.process(&path).await.unwrap();

        let calls = client.calls().await;
        assert!(!calls[0].1.contains("Acceptance Criteria"));
        assert!(!calls[0].1.contains("secret"));
        assert!(calls[0].1.contains("## Next"));
    }

    #[test]
    fn subtask_names_do_not_accumulate_hash_suffixes() {
        assert_eq!(subtask_base("mytask_ab12cd"), "mytask");
        assert_eq!(subtask_base("mytask"), "mytask");
        assert_eq!(subtask_base("mytask_zz99"), "mytask_zz99");
    }

    #[test]
    fn task_id_is_sha256_of_timestamp() {
        let (full, short) = generate_task_id("2026-01-01 00:00:00");
        assert_eq!(full.len(), 64);
        assert_eq!(short, full[..6].to_string());
        assert_eq!(generate_task_id("2026-01-01 00:00:00").0, full);
    }
}
