use std::collections::HashMap;

use tracing::warn;

use super::gitlab::GitLabApi;
use super::models::{Branch, sort_by_commit_date_desc};
use super::snapshot::Snapshot;
use crate::errors::Result;

/// Cached branches per project, most recently committed first.
#[derive(Default)]
pub struct BranchCache {
    snapshot: Snapshot<HashMap<u64, Vec<Branch>>>,
}

impl BranchCache {
    /// Rebuild the branch snapshot from GitLab.
    ///
    /// A paging failure only truncates the affected project's list; the
    /// remaining projects are still refreshed and the snapshot is always
    /// replaced.
    pub async fn refresh(&self, api: &dyn GitLabApi, project_ids: &[u64]) -> Result<()> {
        let mut by_project = HashMap::with_capacity(project_ids.len());

        for &project_id in project_ids {
            let mut branches = Vec::new();
            let mut page = 1;

            loop {
                match api.list_branches(project_id, page).await {
                    Ok(listing) => {
                        branches.extend(listing.items);
                        match listing.next_page {
                            Some(next) if next > page => page = next,
                            _ => break,
                        }
                    }
                    Err(e) => {
                        warn!(project_id, page, error = ?e, "failed to list branches, keeping partial list");
                        break;
                    }
                }
            }

            sort_by_commit_date_desc(&mut branches);
            by_project.insert(project_id, branches);
        }

        self.snapshot.install(by_project).await;
        Ok(())
    }

    /// Branches of `project_id`; empty for projects that are not tracked.
    pub async fn list(&self, project_id: u64) -> Vec<Branch> {
        self.snapshot
            .load()
            .await
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
    }
}
