use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::gitlab::GitLabClient;
use super::scheduler::Scheduler;
use super::{Dashboard, DashboardSettings};
use crate::config::Config;

/// Build the application router with request tracing.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Fill the caches, start the refresh loops and serve until a shutdown
/// signal arrives.
pub async fn start_server(config: Config) -> Result<()> {
    let client = GitLabClient::new(
        &config.gitlab_base_url,
        &config.gitlab_token,
        config.http_timeout,
    )
    .context("Failed to create GitLab client")?;

    let settings = DashboardSettings::default()
        .with_project_ids(config.project_ids.clone())
        .with_protected_environments(config.protected_environments.clone());
    let dashboard = Arc::new(
        Dashboard::new(Arc::new(client), settings).context("cannot register metrics")?,
    );

    dashboard
        .refresh_environments(&config.project_ids)
        .await
        .context("cannot update environments")?;
    if let Err(e) = dashboard.refresh_branches(&config.project_ids).await {
        warn!(error = %e, "initial branch refresh failed");
    }
    info!(
        environments = dashboard.environments().await.len(),
        projects = config.project_ids.len(),
        "caches filled"
    );

    let scheduler = Scheduler::start(dashboard.clone(), config.update_duration);

    let state = Arc::new(AppState {
        dashboard: dashboard.clone(),
        gitlab_base_url: config.gitlab_base_url.clone(),
        user_link_template: config.user_link_template.clone(),
    });
    let app = build_router(state, config.dev_mode);

    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_address))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler.abort();
    dashboard.supervisor().shutdown(config.shutdown_grace).await;
    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
