//! Job actions: play or retry the deploy job of a ref, by ref or by branch
//! prefix query, and read back what was started.

use anyhow::Context;
use tracing::{debug, info};

use super::Dashboard;
use super::models::{Deployment, Job, JobMap};
use super::search::JobSearch;
use super::watcher::JobWatcher;
use crate::errors::{DashboardError, Result};

/// Shortest branch prefix accepted by [`Dashboard::play_or_retry_by_query`].
pub const MIN_QUERY_LEN: usize = 3;

/// Number of deployments returned by [`Dashboard::project_deployments`].
pub const DEPLOYMENT_HISTORY: u32 = 5;

impl Dashboard {
    /// Start the job deploying `git_ref` of `project_id` to `environment`.
    ///
    /// A job that never ran is played; a finished one is retried. The job
    /// as found before the action is returned, while the registry receives
    /// the job GitLab reports after it and a watcher follows it from there.
    pub async fn play_or_retry(
        &self,
        project_id: u64,
        environment: &str,
        git_ref: &str,
    ) -> Result<Job> {
        self.ensure_not_protected(environment)?;

        let job = JobSearch::new(
            self.api.as_ref(),
            self.settings.search_depth,
            self.settings.search_batch_size,
        )
        .find(project_id, environment, git_ref)
        .await?;

        if job.status.is_in_process() {
            return Err(DashboardError::JobAlreadyRunning { job_id: job.id });
        }

        let (action, started) = if job.status.is_never_started() {
            let started = self
                .api
                .play_job(project_id, job.id)
                .await
                .with_context(|| format!("playing job {} of project {}", job.id, project_id))?;
            ("play", started)
        } else {
            let started = self
                .api
                .retry_job(project_id, job.id)
                .await
                .with_context(|| format!("retrying job {} of project {}", job.id, project_id))?;
            ("retry", started)
        };
        self.metrics.record_trigger(action);

        info!(
            project_id,
            environment,
            git_ref,
            job_id = started.id,
            action,
            previous_status = %job.status,
            "deploy job started"
        );

        let watcher = JobWatcher::new(
            self.api.clone(),
            self.jobs.clone(),
            environment,
            project_id,
            &started,
            self.settings.watch_interval,
        );
        self.jobs.insert(environment, project_id, started).await;
        self.supervisor.spawn("job-watcher", watcher.run());

        Ok(job)
    }

    /// Deploy the newest branch starting with `query` in every configured
    /// project that has one.
    ///
    /// Projects without a matching branch or without a runnable job are
    /// skipped; any other failure stops the remaining projects. Fails with
    /// `NothingWasRun` when no job was started at all.
    pub async fn play_or_retry_by_query(&self, environment: &str, query: &str) -> Result<()> {
        self.ensure_not_protected(environment)?;
        if query.is_empty() {
            return Err(DashboardError::InvalidQuery("query is empty".to_string()));
        }
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(DashboardError::InvalidQuery(format!(
                "query is too small (min {} symbols)",
                MIN_QUERY_LEN
            )));
        }

        let mut started = 0usize;
        for &project_id in &self.settings.project_ids {
            // branches are cached newest first
            let Some(branch) = self
                .branches(project_id)
                .await
                .into_iter()
                .find(|branch| branch.name.starts_with(query))
            else {
                debug!(project_id, query, "no branch matches query");
                continue;
            };

            match self.play_or_retry(project_id, environment, &branch.name).await {
                Ok(_) => started += 1,
                Err(e) if e.is_skippable() => {
                    debug!(project_id, git_ref = %branch.name, reason = %e, "skipping project");
                }
                Err(e) => return Err(e),
            }
        }

        if started == 0 {
            return Err(DashboardError::NothingWasRun);
        }
        Ok(())
    }

    /// Latest job started for the pair, and whether one was found.
    ///
    /// Protected environments report `(None, true)`: found, but withheld.
    pub async fn job(&self, environment: &str, project_id: u64) -> (Option<Job>, bool) {
        if self.is_protected(environment) {
            return (None, true);
        }
        let job = self.jobs.get(environment, project_id).await;
        let found = job.is_some();
        (job, found)
    }

    pub async fn jobs(&self) -> JobMap {
        self.jobs.snapshot().await
    }

    /// Most recent successful deployments of a project to an environment.
    pub async fn project_deployments(
        &self,
        environment: &str,
        project_id: u64,
    ) -> Result<Vec<Deployment>> {
        self.ensure_not_protected(environment)?;

        let deployments = self
            .api
            .list_deployments(project_id, environment, DEPLOYMENT_HISTORY)
            .await
            .with_context(|| {
                format!("listing deployments of project {} to {}", project_id, environment)
            })?;

        Ok(deployments.into_iter().map(Deployment::from).collect())
    }
}
