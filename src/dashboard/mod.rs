//! Environment dashboard: cached GitLab state and deploy job orchestration.
//!
//! ## Overview
//!
//! The dashboard keeps an in-memory view of the environments, branches and
//! deploy jobs of a fixed set of GitLab projects. Environments and branches
//! are refreshed in the background on a fixed interval; deploy jobs are
//! played or retried on request and then watched until they finish.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (bootstrap, axum Router)             │
//! │  (GUI)   │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │                                        │
//!                       │         v                                        │
//!                       │  Dashboard (this file)                           │
//!                       │    ├─ environments.rs  EnvironmentCache          │
//!                       │    ├─ branches.rs      BranchCache               │
//!                       │    ├─ trigger.rs       play / retry / by query   │
//!                       │    │    ├─ search.rs   JobSearch                 │
//!                       │    │    └─ watcher.rs  JobWatcher (per job task) │
//!                       │    ├─ registry.rs      JobRegistry               │
//!                       │    └─ metrics.rs       DashboardMetrics          │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  gitlab.rs  (GitLabApi trait, GitLabClient)      │
//!                       └──────────────────────────────────────────────────┘
//!   scheduler.rs drives the two cache refresh loops; supervisor.rs tracks
//!   watcher tasks for shutdown.
//! ```
//!
//! ## Locking
//!
//! The environment snapshot, the branch snapshot and the job registry each
//! sit behind their own lock. No operation holds two of them at once and no
//! lock is held across a GitLab call.
//!
//! ## Protected environments
//!
//! Protected environment names never enter the caches or the registry, and
//! every job action on them is refused before GitLab is contacted.

pub mod api;
pub mod branches;
pub mod environments;
pub mod gitlab;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod supervisor;
pub mod trigger;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use self::branches::BranchCache;
use self::environments::EnvironmentCache;
use tokio::time::Instant;

use self::gitlab::GitLabApi;
use self::metrics::DashboardMetrics;
use self::models::{Branch, Environment};
use self::registry::JobRegistry;
use self::supervisor::TaskSupervisor;
use crate::errors::{DashboardError, Result};

/// Number of older pipeline batches scanned when the newest one misses.
pub const SEARCH_DEPTH: u32 = 10;
/// Pipelines per batch when searching older pipelines.
pub const SEARCH_BATCH_SIZE: u32 = 10;

/// Tunables of the dashboard core.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub project_ids: Vec<u64>,
    pub protected_environments: HashSet<String>,
    pub search_depth: u32,
    pub search_batch_size: u32,
    pub watch_interval: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            project_ids: Vec::new(),
            protected_environments: HashSet::new(),
            search_depth: SEARCH_DEPTH,
            search_batch_size: SEARCH_BATCH_SIZE,
            watch_interval: watcher::WATCH_INTERVAL,
        }
    }
}

impl DashboardSettings {
    pub fn with_project_ids(mut self, project_ids: Vec<u64>) -> Self {
        self.project_ids = project_ids;
        self
    }

    pub fn with_protected_environments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_environments = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Shared dashboard state. One instance lives for the whole process.
pub struct Dashboard {
    api: Arc<dyn GitLabApi>,
    settings: DashboardSettings,
    environments: EnvironmentCache,
    branches: BranchCache,
    jobs: Arc<JobRegistry>,
    supervisor: TaskSupervisor,
    metrics: DashboardMetrics,
}

impl Dashboard {
    pub fn new(api: Arc<dyn GitLabApi>, settings: DashboardSettings) -> prometheus::Result<Self> {
        Ok(Self {
            api,
            settings,
            environments: EnvironmentCache::default(),
            branches: BranchCache::default(),
            jobs: Arc::new(JobRegistry::default()),
            supervisor: TaskSupervisor::new(),
            metrics: DashboardMetrics::new()?,
        })
    }

    pub fn project_ids(&self) -> &[u64] {
        &self.settings.project_ids
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    /// Exact, case-sensitive match against the configured names.
    pub fn is_protected(&self, environment: &str) -> bool {
        self.settings.protected_environments.contains(environment)
    }

    /// Configured protected names, sorted.
    pub fn protected_environments(&self) -> Vec<String> {
        let mut names: Vec<_> = self.settings.protected_environments.iter().cloned().collect();
        names.sort();
        names
    }

    fn ensure_not_protected(&self, environment: &str) -> Result<()> {
        if self.is_protected(environment) {
            return Err(DashboardError::ProtectedEnvironment {
                environment: environment.to_string(),
            });
        }
        Ok(())
    }

    pub async fn refresh_environments(&self, project_ids: &[u64]) -> Result<()> {
        let started = Instant::now();
        let result = self
            .environments
            .refresh(self.api.as_ref(), project_ids, |name| self.is_protected(name))
            .await;
        self.metrics
            .observe_refresh("environments", result.is_ok(), started.elapsed());
        result
    }

    pub async fn refresh_branches(&self, project_ids: &[u64]) -> Result<()> {
        let started = Instant::now();
        let result = self.branches.refresh(self.api.as_ref(), project_ids).await;
        self.metrics
            .observe_refresh("branches", result.is_ok(), started.elapsed());
        result
    }

    /// Prometheus text exposition of the dashboard metrics.
    pub fn render_metrics(&self) -> prometheus::Result<String> {
        self.metrics.set_active_watchers(self.supervisor.active());
        self.metrics.gather()
    }

    pub async fn environments(&self) -> Vec<Environment> {
        self.environments.list().await
    }

    pub async fn branches(&self, project_id: u64) -> Vec<Branch> {
        self.branches.list(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::testing::{MockGitLab, branch, remote_environment, remote_project};

    #[test]
    fn test_settings_defaults() {
        let settings = DashboardSettings::default();
        assert_eq!(settings.search_depth, 10);
        assert_eq!(settings.search_batch_size, 10);
        assert_eq!(settings.watch_interval, Duration::from_secs(3));
        assert!(settings.project_ids.is_empty());
    }

    #[test]
    fn test_protection_is_exact_and_case_sensitive() {
        let dashboard = Dashboard::new(
            Arc::new(MockGitLab::new()),
            DashboardSettings::default().with_protected_environments(["production"]),
        )
        .unwrap();
        assert!(dashboard.is_protected("production"));
        assert!(!dashboard.is_protected("Production"));
        assert!(!dashboard.is_protected("production-eu"));
    }

    #[tokio::test]
    async fn test_protected_environment_never_cached() {
        let api = Arc::new(MockGitLab::new());
        api.add_environment(1, remote_environment(1, "production", Some(remote_project(1))), None);
        api.add_environment(1, remote_environment(2, "staging", Some(remote_project(1))), None);
        let dashboard = Dashboard::new(
            api,
            DashboardSettings::default()
                .with_project_ids(vec![1])
                .with_protected_environments(["production"]),
        )
        .unwrap();

        dashboard.refresh_environments(&[1]).await.unwrap();

        let names: Vec<_> = dashboard
            .environments()
            .await
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["staging"]);
    }

    #[tokio::test]
    async fn test_branches_read_current_snapshot() {
        let api = Arc::new(MockGitLab::new());
        api.set_branch_pages(3, vec![vec![branch("main", "2024-01-01T00:00:00Z")]]);
        let dashboard = Dashboard::new(api, DashboardSettings::default()).unwrap();

        assert!(dashboard.branches(3).await.is_empty());
        dashboard.refresh_branches(&[3]).await.unwrap();
        assert_eq!(dashboard.branches(3).await[0].name, "main");
    }

    #[tokio::test]
    async fn test_refresh_cycles_are_measured() {
        let api = Arc::new(MockGitLab::new());
        api.set_branch_pages(3, vec![vec![branch("main", "2024-01-01T00:00:00Z")]]);
        api.fail("list_environments", 3);
        let dashboard = Dashboard::new(api, DashboardSettings::default()).unwrap();

        dashboard.refresh_branches(&[3]).await.unwrap();
        assert!(dashboard.refresh_environments(&[3]).await.is_err());

        let text = dashboard.render_metrics().unwrap();
        assert!(text.contains(
            r#"envdash_cache_refreshes_total{cache="branches",outcome="success"} 1"#
        ));
        assert!(text.contains(
            r#"envdash_cache_refreshes_total{cache="environments",outcome="failure"} 1"#
        ));
        assert!(text.contains("envdash_job_watchers_active 0"));
    }
}
