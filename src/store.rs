//! Producer/viewer operations over the task sets.
//!
//! These are the operations a dashboard performs against the same storage
//! the engine works on: creating pending documents, reading any set for
//! display, re-queueing failures, and deleting. The engine itself never
//! deletes a document.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::info;

use crate::document::{Metadata, Scalar, TaskDocument, TaskStatus};

/// A document together with its location.
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub path: PathBuf,
    pub document: TaskDocument,
}

/// Read every task document in a set. A missing directory is an empty set.
pub async fn list_documents(dir: &Path) -> anyhow::Result<Vec<StoredTask>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot list task set {}", dir.display()))
        }
    };

    let mut tasks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "md") {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            tasks.push(StoredTask {
                document: TaskDocument::decode(&raw),
                path,
            });
        }
    }
    Ok(tasks)
}

/// Create a new pending document with user-supplied fields.
pub async fn create_task(
    pending_dir: &Path,
    name: &str,
    model: &str,
    workspace: &str,
    body: &str,
    criteria: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let filename = if name.ends_with(".md") {
        name.to_string()
    } else {
        format!("{}.md", name)
    };

    let mut metadata = Metadata::new();
    metadata.set("model", Scalar::str(model));
    metadata.set("workspace", Scalar::str(workspace));
    metadata.set("status", Scalar::str(TaskStatus::Pending.as_str()));
    if let Some(criteria) = criteria {
        metadata.set("completion_criteria", Scalar::str(criteria));
    }

    let doc = TaskDocument {
        metadata,
        body: body.trim().to_string(),
        response: None,
    };

    tokio::fs::create_dir_all(pending_dir).await?;
    let path = pending_dir.join(&filename);
    tokio::fs::write(&path, doc.encode())
        .await
        .with_context(|| format!("cannot create task {}", path.display()))?;
    info!("Created task {}", filename);
    Ok(path)
}

/// Re-queue a failed document: clone it into the pending set with status
/// reset and the failure annotation removed. The failed original stays
/// where it is.
pub async fn retry_failed(
    failed_dir: &Path,
    pending_dir: &Path,
    filename: &str,
) -> anyhow::Result<PathBuf> {
    let source = failed_dir.join(filename);
    let raw = tokio::fs::read_to_string(&source)
        .await
        .with_context(|| format!("task not found in failed set: {}", source.display()))?;

    let mut doc = TaskDocument::decode(&raw);
    doc.set_status(TaskStatus::Pending);
    doc.metadata.remove("failure_reason");
    // A retry is a fresh attempt; the recorded error report stays behind
    // with the failed original.
    doc.response = None;

    let base = filename.strip_suffix(".md").unwrap_or(filename);
    let new_name = format!(
        "{}_retry_{}.md",
        base,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );

    tokio::fs::create_dir_all(pending_dir).await?;
    let destination = pending_dir.join(&new_name);
    tokio::fs::write(&destination, doc.encode())
        .await
        .with_context(|| format!("cannot write retried task {}", destination.display()))?;
    info!("Retried '{}' as '{}'", filename, new_name);
    Ok(destination)
}

/// Delete a document from a set.
pub async fn delete_document(dir: &Path, filename: &str) -> anyhow::Result<()> {
    let path = dir.join(filename);
    if !path.exists() {
        bail!("task not found: {}", path.display());
    }
    tokio::fs::remove_file(&path)
        .await
        .with_context(|| format!("cannot delete {}", path.display()))?;
    info!("Deleted task {}", filename);
    Ok(())
}
