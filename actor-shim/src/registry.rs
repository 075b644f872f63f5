//! In-flight request registry.
//!
//! Tracks the task executing each request. Insertion happens on the intake
//! path, removal on the owning task at completion; both sides go through the
//! mutex, so completions racing with intake cannot lose updates.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

/// Mapping from request id to the execution handle of its task.
///
/// An entry exists from just before its task can first run until the task
/// completes or shutdown abandons it. Entries are removed exactly once.
#[derive(Default)]
pub struct ActiveRequests {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ActiveRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched request. Returns the replaced handle if the id
    /// was already in flight (a client protocol violation the caller warns
    /// about).
    pub fn insert(&self, request_id: &str, handle: JoinHandle<()>) -> Option<JoinHandle<()>> {
        self.tasks
            .lock()
            .unwrap()
            .insert(request_id.to_string(), handle)
    }

    /// Remove a completed request. Returns false if the entry was already
    /// gone (drained at shutdown).
    pub fn remove(&self, request_id: &str) -> bool {
        self.tasks.lock().unwrap().remove(request_id).is_some()
    }

    /// Number of requests currently tracked.
    pub fn active_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Wait up to `grace` for every tracked request to finish. Returns the
    /// ids of requests that did not finish in time; their tasks keep running
    /// detached but no further response is guaranteed.
    pub async fn drain(&self, grace: Duration) -> Vec<String> {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.tasks.lock().unwrap().drain().collect();
        if handles.is_empty() {
            return Vec::new();
        }

        let deadline = Instant::now() + grace;
        let mut abandoned = Vec::new();
        for (request_id, handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, handle).await {
                Ok(Ok(())) => {
                    debug!(%request_id, "request completed within shutdown grace");
                }
                Ok(Err(e)) => {
                    warn!(%request_id, "request task failed during shutdown: {e}");
                }
                Err(_) => {
                    warn!(%request_id, "request did not complete within shutdown grace, abandoning");
                    abandoned.push(request_id);
                }
            }
        }
        abandoned
    }
}
