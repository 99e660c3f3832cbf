//! Typed error hierarchy for the dashboard.
//!
//! `DashboardError` covers every failure the caching and job orchestration
//! layer reports. Transport, authorization and decoding failures from the
//! GitLab client are carried verbatim inside `Remote`.

use thiserror::Error;

/// Errors from the environment/branch caches and job actions.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("cannot perform the action for a protected environment: {environment}")]
    ProtectedEnvironment { environment: String },

    #[error("job not found")]
    JobNotFound,

    #[error("job is not ready")]
    JobIsNotReady,

    #[error("job {job_id} already running")]
    JobAlreadyRunning { job_id: u64 },

    #[error("nothing was run")]
    NothingWasRun,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("GitLab API error: {0:#}")]
    Remote(#[from] anyhow::Error),
}

impl DashboardError {
    /// Errors a query fan-out skips over instead of aborting on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::JobNotFound | Self::JobIsNotReady)
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_environment_carries_name() {
        let err = DashboardError::ProtectedEnvironment {
            environment: "production".to_string(),
        };
        match &err {
            DashboardError::ProtectedEnvironment { environment } => {
                assert_eq!(environment, "production")
            }
            _ => panic!("Expected ProtectedEnvironment"),
        }
        assert!(err.to_string().contains("production"));
    }

    #[test]
    fn remote_error_converts_from_anyhow() {
        let err: DashboardError = anyhow::anyhow!("401 Unauthorized").into();
        assert!(matches!(err, DashboardError::Remote(_)));
        assert!(err.to_string().contains("401 Unauthorized"));
    }

    #[test]
    fn only_search_misses_are_skippable() {
        assert!(DashboardError::JobNotFound.is_skippable());
        assert!(DashboardError::JobIsNotReady.is_skippable());
        assert!(!DashboardError::NothingWasRun.is_skippable());
        assert!(!DashboardError::JobAlreadyRunning { job_id: 1 }.is_skippable());
        assert!(!DashboardError::Remote(anyhow::anyhow!("boom")).is_skippable());
    }

    #[test]
    fn already_running_carries_job_id() {
        let err = DashboardError::JobAlreadyRunning { job_id: 77 };
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn dashboard_error_implements_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&DashboardError::JobNotFound);
    }
}
