//! Queue scanner.
//!
//! Enumerates the pending set and drives the lifecycle engine over each
//! document. One bad document never aborts the batch: per-document failures
//! are logged and counted, and the pass always runs to the end of the
//! listing.

use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use crate::engine::{Engine, PassOutcome};

/// Counters for one scanner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Documents handed to the engine
    pub visited: usize,
    /// `running` documents skipped
    pub skipped: usize,
    /// Documents the engine errored on (read/write/move failures)
    pub errored: usize,
}

/// Run one pass over every `.md` document in `pending_dir`.
///
/// Iteration order is whatever the directory listing yields; the engine
/// does not depend on it.
pub async fn run_pass(engine: &Engine, pending_dir: &Path) -> anyhow::Result<PassStats> {
    let mut entries = tokio::fs::read_dir(pending_dir)
        .await
        .with_context(|| format!("cannot list pending directory {}", pending_dir.display()))?;

    // Snapshot the listing before processing: the engine spawns subtasks
    // back into this directory, and those belong to the next pass.
    let mut batch = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to advance pending directory listing")?
    {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "md") {
            batch.push(path);
        }
    }

    let mut stats = PassStats::default();
    for path in batch {
        stats.visited += 1;
        match engine.process(&path).await {
            Ok(PassOutcome::Skipped) => stats.skipped += 1,
            Ok(_) => {}
            Err(e) => {
                stats.errored += 1;
                error!("Skipping {}: {}", path.display(), e);
            }
        }
    }

    if stats.visited == 0 {
        info!("No pending tasks found");
    } else {
        info!(
            "Pass finished: {} visited, {} skipped, {} errored",
            stats.visited, stats.skipped, stats.errored
        );
    }
    Ok(stats)
}
