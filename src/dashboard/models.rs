use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Jobs started from the dashboard, keyed by environment name then project id.
pub type JobMap = HashMap<String, HashMap<u64, Job>>;

/// A named deployment target and every tracked project that deploys to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Environment {
    pub name: String,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(rename = "avatarURL")]
    pub avatar_url: Option<String>,
    #[serde(rename = "webURL")]
    pub web_url: String,
    pub name_with_namespace: String,
    pub last_deployment: Option<Deployment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: u64,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub user: Option<User>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deployable: Deployable,
}

/// Status of the pipeline that produced a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Deployable {
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, rename = "avatarURL", alias = "avatar_url")]
    pub avatar_url: Option<String>,
}

// ── Branches ──────────────────────────────────────────────────────────

/// A repository branch as reported by GitLab.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub commit: Commit,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub web_url: String,
}

impl Branch {
    pub fn committed_date(&self) -> Option<DateTime<Utc>> {
        self.commit.committed_date
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Commit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub committed_date: Option<DateTime<Utc>>,
}

/// Sort branches by commit time, most recent first.
///
/// The sort is stable: branches committed at the same instant keep their
/// listing order. Branches without a commit timestamp go last.
pub fn sort_by_commit_date_desc(branches: &mut [Branch]) {
    branches.sort_by(|a, b| b.committed_date().cmp(&a.committed_date()));
}

// ── Jobs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Preparing,
    Created,
    Pending,
    Running,
    Failed,
    Success,
    Canceled,
    Skipped,
    Manual,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Scope used when listing pipeline jobs that may be played or retried.
    pub const SEARCH_SCOPE: [JobStatus; 4] = [
        JobStatus::Manual,
        JobStatus::Success,
        JobStatus::Created,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Success => "success",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        }
    }

    /// Statuses a job cannot be played or retried from. Unknown statuses are
    /// treated the same way.
    pub fn is_in_process(&self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Created | Self::Pending | Self::Running | Self::Unknown
        )
    }

    /// Statuses that require a play rather than a retry.
    pub fn is_never_started(&self) -> bool {
        matches!(self, Self::Manual)
    }

    /// Statuses at which a watcher stops polling.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Success | Self::Canceled | Self::Skipped | Self::Manual
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "created" => Ok(Self::Created),
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "success" => Ok(Self::Success),
            "canceled" => Ok(Self::Canceled),
            "skipped" => Ok(Self::Skipped),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// A pipeline job as reported by GitLab (subset of fields the GUI uses).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub stage: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub user: Option<JobUser>,
    #[serde(default)]
    pub pipeline: Option<JobPipeline>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobUser {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobPipeline {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
}

/// Minimal pipeline record returned by the pipeline listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSummary {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
}
