use anyhow::Result;
use clap::Parser;
use clap::builder::BoolishValueParser;
use tracing_subscriber::EnvFilter;

use envdash::config::{Config, ConfigArgs};
use envdash::dashboard::server;

const DEFAULT_LOG_FILTER: &str = "envdash=info,tower_http=info";

#[derive(Parser)]
#[command(name = "envdash")]
#[command(version, about = "GitLab environment dashboard server")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", value_parser = BoolishValueParser::new())]
    pub log_json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::new(cli.config)?;
    tracing::info!(
        gitlab = %config.gitlab_base_url,
        projects = ?config.project_ids,
        protected = ?config.protected_environments,
        "starting envdash"
    );

    server::start_server(config).await
}
