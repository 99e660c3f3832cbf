use tokio::sync::RwLock;

use super::models::{Job, JobMap};

/// The latest job started from the dashboard per (environment, project).
///
/// Entries are replaced, never merged, and live until shutdown.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<JobMap>,
}

impl JobRegistry {
    pub async fn insert(&self, environment: &str, project_id: u64, job: Job) {
        self.jobs
            .write()
            .await
            .entry(environment.to_string())
            .or_default()
            .insert(project_id, job);
    }

    pub async fn get(&self, environment: &str, project_id: u64) -> Option<Job> {
        self.jobs
            .read()
            .await
            .get(environment)
            .and_then(|projects| projects.get(&project_id))
            .cloned()
    }

    /// Copy of every tracked job.
    pub async fn snapshot(&self) -> JobMap {
        self.jobs.read().await.clone()
    }
}
