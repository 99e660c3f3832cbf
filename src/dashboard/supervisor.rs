use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Owns the background tasks started on behalf of requests (job watchers).
///
/// Tasks run detached; the supervisor only keeps count of them so shutdown
/// can wait for in-flight work within a grace period. Nothing is cancelled.
#[derive(Clone, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, active = self.tracker.len(), "spawning background task");
        self.tracker.spawn(task);
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait at most `grace` for tracked tasks to finish. Returns true when
    /// every task finished.
    ///
    /// A zero grace period returns immediately, leaving tasks to die with
    /// the runtime.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let active = self.tracker.len();
        if active == 0 {
            return true;
        }
        if grace.is_zero() {
            info!(active, "leaving background tasks running at shutdown");
            return false;
        }

        info!(active, grace = ?grace, "waiting for background tasks");
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    active = self.tracker.len(),
                    "background tasks still running after grace period"
                );
                false
            }
        }
    }
}
