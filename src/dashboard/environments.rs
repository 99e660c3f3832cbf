use std::collections::HashMap;

use anyhow::Context;
use tracing::debug;

use super::gitlab::{GitLabApi, RemoteEnvironment, RemoteProject};
use super::models::Environment;
use super::snapshot::Snapshot;
use crate::errors::Result;

/// Cached environments keyed by name, rebuilt wholesale on every refresh.
#[derive(Default)]
pub struct EnvironmentCache {
    snapshot: Snapshot<HashMap<String, Environment>>,
}

impl EnvironmentCache {
    /// Rebuild the environment snapshot from GitLab.
    ///
    /// Any remote failure aborts the cycle and the previous snapshot stays
    /// in place. Environments for which `is_protected` returns true are left
    /// out entirely.
    pub async fn refresh(
        &self,
        api: &dyn GitLabApi,
        project_ids: &[u64],
        is_protected: impl Fn(&str) -> bool,
    ) -> Result<()> {
        let mut environments: HashMap<String, Environment> = HashMap::new();

        for &project_id in project_ids {
            // Listings may omit the project; fetched at most once per cycle.
            let mut project_meta: Option<RemoteProject> = None;
            let mut page = 1;

            loop {
                let listing = api
                    .list_environments(project_id, page)
                    .await
                    .with_context(|| format!("listing environments of project {}", project_id))?;

                for listed in listing.items {
                    if is_protected(&listed.name) {
                        debug!(project_id, environment = %listed.name, "skipping protected environment");
                        continue;
                    }

                    // The listing has no last deployment; the detail call has no project.
                    let RemoteEnvironment {
                        name,
                        last_deployment,
                        ..
                    } = api
                        .get_environment(project_id, listed.id)
                        .await
                        .with_context(|| {
                            format!(
                                "fetching environment {} of project {}",
                                listed.id, project_id
                            )
                        })?;

                    let remote_project = match listed.project {
                        Some(project) => project,
                        None => {
                            let project = match project_meta.take() {
                                Some(cached) => cached,
                                None => api
                                    .get_project(project_id)
                                    .await
                                    .with_context(|| format!("fetching project {}", project_id))?,
                            };
                            project_meta = Some(project.clone());
                            project
                        }
                    };

                    environments
                        .entry(name.clone())
                        .or_insert_with(|| Environment {
                            name,
                            projects: Vec::new(),
                        })
                        .projects
                        .push(remote_project.into_project(last_deployment));
                }

                match listing.next_page {
                    Some(next) if next > page => page = next,
                    _ => break,
                }
            }
        }

        self.snapshot.install(environments).await;
        Ok(())
    }

    /// Current environments, in no particular order.
    pub async fn list(&self) -> Vec<Environment> {
        self.snapshot.load().await.values().cloned().collect()
    }
}
