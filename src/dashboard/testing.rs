//! In-memory `GitLabApi` test double and fixture builders.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::gitlab::{
    GitLabApi, LIST_PAGE_SIZE, Page, RemoteDeployable, RemoteDeployment, RemoteEnvironment,
    RemotePipelineRef, RemoteProject, RemoteUser,
};
use super::models::{Branch, Commit, Job, JobStatus, PipelineSummary};

#[derive(Default)]
struct MockState {
    /// Listed environments per project, in listing order.
    environments: HashMap<u64, Vec<RemoteEnvironment>>,
    /// Detail responses keyed by (project, environment id).
    environment_details: HashMap<(u64, u64), RemoteEnvironment>,
    projects: HashMap<u64, RemoteProject>,
    branch_pages: HashMap<u64, Vec<Vec<Branch>>>,
    /// Pipelines per (project, ref), newest first.
    pipelines: HashMap<(u64, String), Vec<PipelineSummary>>,
    pipeline_jobs: HashMap<(u64, u64), Vec<Job>>,
    /// Scripted `get_job` responses; the last one repeats.
    job_polls: HashMap<(u64, u64), Vec<Job>>,
    deployments: HashMap<(u64, String), Vec<RemoteDeployment>>,
    /// (call, project, nth call) → fail; `None` fails every call.
    failures: Vec<(&'static str, u64, Option<usize>)>,
    calls: Vec<String>,
    call_counts: HashMap<(&'static str, u64), usize>,
}

/// Records every call and answers from fixtures set up by the test.
pub struct MockGitLab {
    state: Mutex<MockState>,
    environment_page_size: usize,
    filter_job_scope: bool,
}

impl Default for MockGitLab {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitLab {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            environment_page_size: LIST_PAGE_SIZE as usize,
            filter_job_scope: true,
        }
    }

    pub fn with_environment_page_size(mut self, size: usize) -> Self {
        self.environment_page_size = size;
        self
    }

    /// Return pipeline jobs whatever the requested scope, like GitLab does
    /// when a job changes status between filtering and listing.
    pub fn without_job_scope_filter(mut self) -> Self {
        self.filter_job_scope = false;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Register an environment; listings carry `listed.project`, the detail
    /// response carries `last_deployment` instead.
    pub fn add_environment(
        &self,
        project_id: u64,
        listed: RemoteEnvironment,
        last_deployment: Option<RemoteDeployment>,
    ) {
        let detail = RemoteEnvironment {
            id: listed.id,
            name: listed.name.clone(),
            project: None,
            last_deployment,
        };
        let mut state = self.state();
        state
            .environment_details
            .insert((project_id, listed.id), detail);
        state.environments.entry(project_id).or_default().push(listed);
    }

    pub fn add_project(&self, project: RemoteProject) {
        self.state().projects.insert(project.id, project);
    }

    pub fn set_branch_pages(&self, project_id: u64, pages: Vec<Vec<Branch>>) {
        self.state().branch_pages.insert(project_id, pages);
    }

    /// Append a pipeline; call in newest-first order.
    pub fn add_pipeline(&self, project_id: u64, git_ref: &str, pipeline_id: u64, jobs: Vec<Job>) {
        let mut state = self.state();
        state
            .pipelines
            .entry((project_id, git_ref.to_string()))
            .or_default()
            .push(PipelineSummary {
                id: pipeline_id,
                status: "success".to_string(),
                git_ref: git_ref.to_string(),
            });
        state.pipeline_jobs.insert((project_id, pipeline_id), jobs);
    }

    pub fn set_job_polls(&self, project_id: u64, job_id: u64, polls: Vec<Job>) {
        self.state().job_polls.insert((project_id, job_id), polls);
    }

    pub fn add_deployment(&self, project_id: u64, environment: &str, deployment: RemoteDeployment) {
        self.state()
            .deployments
            .entry((project_id, environment.to_string()))
            .or_default()
            .push(deployment);
    }

    /// Fail every `call` made for `project_id`.
    pub fn fail(&self, call: &'static str, project_id: u64) {
        self.state().failures.push((call, project_id, None));
    }

    /// Fail only the `nth` (1-based) `call` made for `project_id`.
    pub fn fail_at(&self, call: &'static str, project_id: u64, nth: usize) {
        self.state().failures.push((call, project_id, Some(nth)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of recorded calls to `call`, failed ones included.
    pub fn count(&self, call: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(call))
            .count()
    }

    fn record(&self, call: &'static str, project_id: u64, detail: String) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("{} {} {}", call, project_id, detail).trim_end().to_string());
        let nth = {
            let count = state.call_counts.entry((call, project_id)).or_default();
            *count += 1;
            *count
        };
        let failing = state.failures.iter().any(|(c, p, at)| {
            *c == call && *p == project_id && at.is_none_or(|at| at == nth)
        });
        if failing {
            return Err(anyhow!("injected {} failure for project {}", call, project_id));
        }
        Ok(())
    }

    fn started(&self, project_id: u64, job_id: u64, call: &str) -> Result<Job> {
        let state = self.state();
        let original = state
            .pipeline_jobs
            .iter()
            .filter(|((p, _), _)| *p == project_id)
            .flat_map(|(_, jobs)| jobs.iter())
            .find(|job| job.id == job_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 Job Not Found"))?;
        // retry creates a new job, play starts the same one
        let id = if call == "retry_job" { job_id + 1000 } else { job_id };
        Ok(Job {
            id,
            status: JobStatus::Pending,
            ..original
        })
    }
}

#[async_trait]
impl GitLabApi for MockGitLab {
    async fn list_environments(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<RemoteEnvironment>> {
        self.record("list_environments", project_id, format!("page={}", page))?;
        let all = self
            .state()
            .environments
            .get(&project_id)
            .cloned()
            .unwrap_or_default();
        let total = all.len();
        let start = (page as usize - 1) * self.environment_page_size;
        let items: Vec<_> = all
            .into_iter()
            .skip(start)
            .take(self.environment_page_size)
            .collect();
        let next_page = (start + items.len() < total).then_some(page + 1);
        Ok(Page { items, next_page })
    }

    async fn get_environment(
        &self,
        project_id: u64,
        environment_id: u64,
    ) -> Result<RemoteEnvironment> {
        self.record("get_environment", project_id, environment_id.to_string())?;
        self.state()
            .environment_details
            .get(&(project_id, environment_id))
            .cloned()
            .ok_or_else(|| anyhow!("404 Environment Not Found"))
    }

    async fn get_project(&self, project_id: u64) -> Result<RemoteProject> {
        self.record("get_project", project_id, String::new())?;
        self.state()
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| anyhow!("404 Project Not Found"))
    }

    async fn list_branches(&self, project_id: u64, page: u32) -> Result<Page<Branch>> {
        self.record("list_branches", project_id, format!("page={}", page))?;
        let state = self.state();
        let pages = state.branch_pages.get(&project_id);
        let items = pages
            .and_then(|pages| pages.get(page as usize - 1))
            .cloned()
            .unwrap_or_default();
        let next_page = pages
            .filter(|pages| (page as usize) < pages.len())
            .map(|_| page + 1);
        Ok(Page { items, next_page })
    }

    async fn list_pipelines(
        &self,
        project_id: u64,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PipelineSummary>> {
        self.record(
            "list_pipelines",
            project_id,
            format!("{} page={} per_page={}", git_ref, page, per_page),
        )?;
        let pipelines = self
            .state()
            .pipelines
            .get(&(project_id, git_ref.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(pipelines
            .into_iter()
            .skip((page.max(1) as usize - 1) * per_page as usize)
            .take(per_page as usize)
            .collect())
    }

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        scope: &[JobStatus],
    ) -> Result<Vec<Job>> {
        self.record("list_pipeline_jobs", project_id, pipeline_id.to_string())?;
        Ok(self
            .state()
            .pipeline_jobs
            .get(&(project_id, pipeline_id))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|job| !self.filter_job_scope || scope.contains(&job.status))
            .collect())
    }

    async fn play_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        self.record("play_job", project_id, job_id.to_string())?;
        self.started(project_id, job_id, "play_job")
    }

    async fn retry_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        self.record("retry_job", project_id, job_id.to_string())?;
        self.started(project_id, job_id, "retry_job")
    }

    async fn get_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        self.record("get_job", project_id, job_id.to_string())?;
        let mut state = self.state();
        let polls = state
            .job_polls
            .get_mut(&(project_id, job_id))
            .ok_or_else(|| anyhow!("404 Job Not Found"))?;
        match polls.len() {
            0 => Err(anyhow!("404 Job Not Found")),
            1 => Ok(polls[0].clone()),
            _ => Ok(polls.remove(0)),
        }
    }

    async fn list_deployments(
        &self,
        project_id: u64,
        environment: &str,
        per_page: u32,
    ) -> Result<Vec<RemoteDeployment>> {
        self.record(
            "list_deployments",
            project_id,
            format!("{} per_page={}", environment, per_page),
        )?;
        Ok(self
            .state()
            .deployments
            .get(&(project_id, environment.to_string()))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(per_page as usize)
            .collect())
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────

pub fn job(id: u64, name: &str, status: JobStatus) -> Job {
    Job {
        id,
        name: name.to_string(),
        status,
        stage: "deploy".to_string(),
        git_ref: "main".to_string(),
        created_at: None,
        started_at: None,
        finished_at: None,
        web_url: format!("https://gitlab.example.com/jobs/{}", id),
        user: None,
        pipeline: None,
    }
}

pub fn branch(name: &str, committed_date: &str) -> Branch {
    Branch {
        name: name.to_string(),
        commit: Commit {
            committed_date: Some(committed_date.parse().unwrap()),
            ..Commit::default()
        },
        ..Branch::default()
    }
}

pub fn remote_project(id: u64) -> RemoteProject {
    RemoteProject {
        id,
        name: format!("project-{}", id),
        name_with_namespace: format!("group / project-{}", id),
        avatar_url: None,
        web_url: format!("https://gitlab.example.com/group/project-{}", id),
    }
}

pub fn remote_environment(id: u64, name: &str, project: Option<RemoteProject>) -> RemoteEnvironment {
    RemoteEnvironment {
        id,
        name: name.to_string(),
        project,
        last_deployment: None,
    }
}

pub fn deployment(id: u64, git_ref: &str) -> RemoteDeployment {
    RemoteDeployment {
        id,
        git_ref: git_ref.to_string(),
        user: Some(RemoteUser {
            name: "Ada Lovelace".to_string(),
            username: "ada".to_string(),
            avatar_url: None,
        }),
        updated_at: Some("2024-01-10T10:00:00Z".parse().unwrap()),
        deployable: Some(RemoteDeployable {
            status: "success".to_string(),
            user: None,
            pipeline: Some(RemotePipelineRef { id: id * 10 }),
        }),
    }
}
