//! Interval scheduler around scanner passes.
//!
//! Owns a background task that runs one full pass, sleeps, and repeats.
//! Cancellation is observed only between passes: stopping never interrupts
//! an in-flight document write.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::scanner;

/// Handle to the background pass loop.
pub struct Scheduler {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Spawn the pass loop. The first pass starts immediately.
    pub fn spawn(engine: Arc<Engine>, pending_dir: std::path::PathBuf, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = scanner::run_pass(&engine, &pending_dir).await {
                    warn!("Scanner pass failed: {}", e);
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Scheduler stopped");
        });
        Self { handle, cancel }
    }

    /// Request a stop at the next pass boundary and wait for the loop to
    /// finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Scheduler task panicked: {}", e);
        }
    }
}
