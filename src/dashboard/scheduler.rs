use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Dashboard;
use crate::errors::Result;

/// The caches refreshed on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Environments,
    Branches,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Environments => "environments",
            Self::Branches => "branches",
        }
    }

    async fn refresh(&self, dashboard: &Dashboard) -> Result<()> {
        let project_ids = dashboard.project_ids();
        match self {
            Self::Environments => dashboard.refresh_environments(project_ids).await,
            Self::Branches => dashboard.refresh_branches(project_ids).await,
        }
    }
}

/// Background refresh loops, one per cache.
///
/// Each loop runs refresh, then sleeps for the interval, so cycles of one
/// cache never overlap. A failed cycle is logged and the loop carries on.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(dashboard: Arc<Dashboard>, interval: Duration) -> Self {
        let handles = [CacheKind::Environments, CacheKind::Branches]
            .into_iter()
            .map(|kind| tokio::spawn(refresh_loop(dashboard.clone(), kind, interval)))
            .collect();
        info!(interval = ?interval, "cache refresh scheduled");
        Self { handles }
    }

    /// Stop both loops. A cycle in flight is dropped at its next await point.
    pub fn abort(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn refresh_loop(dashboard: Arc<Dashboard>, kind: CacheKind, interval: Duration) {
    loop {
        debug!(cache = kind.as_str(), "refreshing cache");
        let started = Instant::now();
        match kind.refresh(&dashboard).await {
            Ok(()) => info!(
                cache = kind.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "cache refreshed"
            ),
            Err(e) => warn!(
                cache = kind.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "cache refresh failed"
            ),
        }

        tokio::time::sleep(interval).await;
    }
}
