use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::models::{
    Branch, Deployable, Deployment, Job, JobStatus, Pipeline, PipelineSummary, Project, User,
};

/// Page size used for every listing that walks all pages.
pub const LIST_PAGE_SIZE: u32 = 100;

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

/// Abstraction over the GitLab REST API for testability.
/// Real implementation: `GitLabClient`. Test double: `MockGitLab`.
///
/// Calls are never retried here; callers decide what a failure means.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    async fn list_environments(&self, project_id: u64, page: u32)
    -> Result<Page<RemoteEnvironment>>;

    async fn get_environment(&self, project_id: u64, environment_id: u64)
    -> Result<RemoteEnvironment>;

    async fn get_project(&self, project_id: u64) -> Result<RemoteProject>;

    async fn list_branches(&self, project_id: u64, page: u32) -> Result<Page<Branch>>;

    /// Pipelines for `git_ref`, newest first.
    async fn list_pipelines(
        &self,
        project_id: u64,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PipelineSummary>>;

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        scope: &[JobStatus],
    ) -> Result<Vec<Job>>;

    async fn play_job(&self, project_id: u64, job_id: u64) -> Result<Job>;

    async fn retry_job(&self, project_id: u64, job_id: u64) -> Result<Job>;

    async fn get_job(&self, project_id: u64, job_id: u64) -> Result<Job>;

    /// Most recent successful deployments of `environment`, newest first.
    async fn list_deployments(
        &self,
        project_id: u64,
        environment: &str,
        per_page: u32,
    ) -> Result<Vec<RemoteDeployment>>;
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEnvironment {
    pub id: u64,
    pub name: String,
    /// Present in listings only; the detail endpoint omits it.
    #[serde(default)]
    pub project: Option<RemoteProject>,
    /// Present in the detail endpoint only.
    #[serde(default)]
    pub last_deployment: Option<RemoteDeployment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_with_namespace: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub web_url: String,
}

impl RemoteProject {
    pub fn into_project(self, last_deployment: Option<RemoteDeployment>) -> Project {
        Project {
            id: self.id,
            name: self.name,
            avatar_url: self.avatar_url,
            web_url: self.web_url,
            name_with_namespace: self.name_with_namespace,
            last_deployment: last_deployment.map(Deployment::from),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDeployment {
    pub id: u64,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub user: Option<RemoteUser>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deployable: Option<RemoteDeployable>,
}

/// The job that performed a deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDeployable {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub user: Option<RemoteUser>,
    #[serde(default)]
    pub pipeline: Option<RemotePipelineRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePipelineRef {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<RemoteUser> for User {
    fn from(user: RemoteUser) -> Self {
        User {
            name: user.name,
            username: user.username,
            avatar_url: user.avatar_url,
        }
    }
}

impl From<RemoteDeployment> for Deployment {
    fn from(deployment: RemoteDeployment) -> Self {
        let deployable = deployment
            .deployable
            .map(|d| Deployable {
                pipeline: Pipeline {
                    id: d.pipeline.map(|p| p.id).unwrap_or_default(),
                    status: d.status,
                    user: Some(d.user.map(User::from).unwrap_or_default()),
                },
            })
            .unwrap_or_default();

        Deployment {
            id: deployment.id,
            git_ref: deployment.git_ref,
            user: deployment.user.map(User::from),
            updated_at: deployment.updated_at,
            deployable,
        }
    }
}

// ── HTTP client ───────────────────────────────────────────────────────

/// GitLab REST v4 client authenticated with a private token.
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("envdash")
            .build()
            .context("Failed to build GitLab HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn project_url(&self, project_id: u64, path: &str) -> String {
        if path.is_empty() {
            format!("{}/api/v4/projects/{}", self.base_url, project_id)
        } else {
            format!("{}/api/v4/projects/{}/{}", self.base_url, project_id, path)
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<(T, Option<u32>)> {
        self.send(self.http.get(url).query(query), what).await
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let (body, _) = self.send(self.http.post(url), what).await?;
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<(T, Option<u32>)> {
        let resp = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to GitLab", what))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitLab {} endpoint returned {}: {}", what, status, body.trim());
        }

        let next = next_page(resp.headers());
        let body = resp
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response from GitLab", what))?;
        Ok((body, next))
    }
}

/// Read GitLab's `X-Next-Page` pagination header. The header is present but
/// empty on the last page.
fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-next-page")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn list_environments(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<RemoteEnvironment>> {
        let url = self.project_url(project_id, "environments");
        let (items, next_page) = self
            .get(
                &url,
                &[
                    ("page", page.to_string()),
                    ("per_page", LIST_PAGE_SIZE.to_string()),
                ],
                "environments",
            )
            .await?;
        Ok(Page { items, next_page })
    }

    async fn get_environment(
        &self,
        project_id: u64,
        environment_id: u64,
    ) -> Result<RemoteEnvironment> {
        let url = self.project_url(project_id, &format!("environments/{}", environment_id));
        let (environment, _) = self.get(&url, &[], "environment").await?;
        Ok(environment)
    }

    async fn get_project(&self, project_id: u64) -> Result<RemoteProject> {
        let url = self.project_url(project_id, "");
        let (project, _) = self.get(&url, &[], "project").await?;
        Ok(project)
    }

    async fn list_branches(&self, project_id: u64, page: u32) -> Result<Page<Branch>> {
        let url = self.project_url(project_id, "repository/branches");
        let (items, next_page) = self
            .get(
                &url,
                &[
                    ("page", page.to_string()),
                    ("per_page", LIST_PAGE_SIZE.to_string()),
                ],
                "branches",
            )
            .await?;
        Ok(Page { items, next_page })
    }

    async fn list_pipelines(
        &self,
        project_id: u64,
        git_ref: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PipelineSummary>> {
        let url = self.project_url(project_id, "pipelines");
        let (pipelines, _) = self
            .get(
                &url,
                &[
                    ("ref", git_ref.to_string()),
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                    ("order_by", "id".to_string()),
                    ("sort", "desc".to_string()),
                ],
                "pipelines",
            )
            .await?;
        Ok(pipelines)
    }

    async fn list_pipeline_jobs(
        &self,
        project_id: u64,
        pipeline_id: u64,
        scope: &[JobStatus],
    ) -> Result<Vec<Job>> {
        let url = self.project_url(project_id, &format!("pipelines/{}/jobs", pipeline_id));
        let mut query = vec![("per_page", LIST_PAGE_SIZE.to_string())];
        query.extend(scope.iter().map(|s| ("scope[]", s.as_str().to_string())));
        let (jobs, _) = self.get(&url, &query, "pipeline jobs").await?;
        Ok(jobs)
    }

    async fn play_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        let url = self.project_url(project_id, &format!("jobs/{}/play", job_id));
        self.post(&url, "play job").await
    }

    async fn retry_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        let url = self.project_url(project_id, &format!("jobs/{}/retry", job_id));
        self.post(&url, "retry job").await
    }

    async fn get_job(&self, project_id: u64, job_id: u64) -> Result<Job> {
        let url = self.project_url(project_id, &format!("jobs/{}", job_id));
        let (job, _) = self.get(&url, &[], "job").await?;
        Ok(job)
    }

    async fn list_deployments(
        &self,
        project_id: u64,
        environment: &str,
        per_page: u32,
    ) -> Result<Vec<RemoteDeployment>> {
        let url = self.project_url(project_id, "deployments");
        let (deployments, _) = self
            .get(
                &url,
                &[
                    ("environment", environment.to_string()),
                    ("order_by", "id".to_string()),
                    ("sort", "desc".to_string()),
                    ("status", JobStatus::Success.as_str().to_string()),
                    ("per_page", per_page.to_string()),
                ],
                "deployments",
            )
            .await?;
        Ok(deployments)
    }
}
