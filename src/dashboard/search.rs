//! Locates the job that deploys a ref to an environment.
//!
//! The job is the one named after the environment in the newest pipeline of
//! the ref that has one. Some pipelines (scheduled ones, for instance) carry
//! no environment jobs at all, so when the newest pipeline has no match the
//! search pages back through older pipelines in batches.

use anyhow::Context;
use tracing::debug;

use super::gitlab::GitLabApi;
use super::models::{Job, JobStatus};
use crate::errors::{DashboardError, Result};

pub struct JobSearch<'a> {
    api: &'a dyn GitLabApi,
    /// Maximum number of batches scanned after the newest pipeline misses.
    depth: u32,
    batch_size: u32,
}

impl<'a> JobSearch<'a> {
    pub fn new(api: &'a dyn GitLabApi, depth: u32, batch_size: u32) -> Self {
        Self {
            api,
            depth,
            batch_size,
        }
    }

    pub async fn find(&self, project_id: u64, environment: &str, git_ref: &str) -> Result<Job> {
        match self.search_page(project_id, environment, git_ref, 1, 1).await {
            Err(DashboardError::JobNotFound) => {}
            found => return found,
        }

        debug!(
            project_id,
            environment, git_ref, "newest pipeline has no matching job, searching older pipelines"
        );

        for page in 1..=self.depth {
            match self
                .search_page(project_id, environment, git_ref, page, self.batch_size)
                .await
            {
                Err(DashboardError::JobNotFound) => continue,
                found => return found,
            }
        }

        Err(DashboardError::JobNotFound)
    }

    /// Scan one page of pipelines, newest first. The first job named after
    /// the environment decides the outcome; a `created` job is not actionable
    /// yet and ends the search.
    async fn search_page(
        &self,
        project_id: u64,
        environment: &str,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Job> {
        let pipelines = self
            .api
            .list_pipelines(project_id, git_ref, page, per_page)
            .await
            .with_context(|| format!("listing pipelines of project {} for {}", project_id, git_ref))?;

        for pipeline in pipelines {
            let jobs = self
                .api
                .list_pipeline_jobs(project_id, pipeline.id, &JobStatus::SEARCH_SCOPE)
                .await
                .with_context(|| format!("listing jobs of pipeline {}", pipeline.id))?;

            if let Some(job) = jobs.into_iter().find(|job| job.name == environment) {
                if job.status == JobStatus::Created {
                    return Err(DashboardError::JobIsNotReady);
                }
                return Ok(job);
            }
        }

        Err(DashboardError::JobNotFound)
    }
}
