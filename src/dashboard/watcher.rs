use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::gitlab::GitLabApi;
use super::models::{Job, JobStatus};
use super::registry::JobRegistry;

/// Default delay between two polls of a watched job.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(3);

/// Polls one triggered job until it reaches a finished status, mirroring
/// every status change into the job registry.
///
/// A failed poll ends the watch for good. There is no overall timeout: a job
/// that never finishes is polled for as long as the process lives.
pub struct JobWatcher {
    api: Arc<dyn GitLabApi>,
    registry: Arc<JobRegistry>,
    environment: String,
    project_id: u64,
    job_id: u64,
    last_status: JobStatus,
    interval: Duration,
}

impl JobWatcher {
    pub fn new(
        api: Arc<dyn GitLabApi>,
        registry: Arc<JobRegistry>,
        environment: &str,
        project_id: u64,
        job: &Job,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            registry,
            environment: environment.to_string(),
            project_id,
            job_id: job.id,
            last_status: job.status,
            interval,
        }
    }

    pub async fn run(mut self) {
        loop {
            let polled = match self.api.get_job(self.project_id, self.job_id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(
                        project_id = self.project_id,
                        environment = %self.environment,
                        job_id = self.job_id,
                        error = ?e,
                        "job watcher stopped after failed poll"
                    );
                    return;
                }
            };

            if polled.status != self.last_status {
                info!(
                    project_id = self.project_id,
                    environment = %self.environment,
                    job_id = self.job_id,
                    from = %self.last_status,
                    to = %polled.status,
                    "job status changed"
                );
                self.last_status = polled.status;
                // Last write wins: a newer trigger for the same key may be overwritten here.
                self.registry
                    .insert(&self.environment, self.project_id, polled)
                    .await;
            }

            if self.last_status.is_finished() {
                debug!(job_id = self.job_id, status = %self.last_status, "job watcher finished");
                return;
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
