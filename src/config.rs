use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use clap::builder::BoolishValueParser;

pub const DEFAULT_UPDATE_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings read from the command line, the environment or `.env`.
///
/// Values are kept raw here; [`Config::new`] validates them.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// GitLab instance URL, e.g. https://gitlab.example.com
    #[arg(long, env = "GITLAB_BASE_URL")]
    pub gitlab_base_url: String,

    /// Personal access token with `api` scope
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: String,

    /// Comma-separated project ids to track
    #[arg(long, env = "GITLAB_PROJECT_IDS")]
    pub gitlab_project_ids: Option<String>,

    /// Comma-separated environment names no job may be started for
    #[arg(long, env = "PROTECTED_ENVIRONMENTS")]
    pub protected_environments: Option<String>,

    /// Interval between cache refreshes (e.g. 30s, 1m30s, 500ms)
    #[arg(
        long,
        env = "ENVIRONMENT_UPDATE_DURATION",
        default_value = "30s",
        value_parser = parse_duration
    )]
    pub update_duration: Duration,

    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: String,

    /// Link template for user names shown in the GUI
    #[arg(long, env = "USER_LINK_TEMPLATE")]
    pub user_link_template: Option<String>,

    /// Timeout of a single GitLab request
    #[arg(long, env = "HTTP_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub http_timeout: Duration,

    /// How long shutdown waits for job watchers (0 = do not wait)
    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "0s", value_parser = parse_duration)]
    pub shutdown_grace: Duration,

    /// Allow cross-origin requests (GUI served by a dev server)
    #[arg(long, env = "DEV_MODE", value_parser = BoolishValueParser::new())]
    pub dev_mode: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub gitlab_base_url: String,
    pub gitlab_token: String,
    pub project_ids: Vec<u64>,
    pub protected_environments: Vec<String>,
    pub update_duration: Duration,
    pub listen_address: String,
    pub user_link_template: Option<String>,
    pub http_timeout: Duration,
    pub shutdown_grace: Duration,
    pub dev_mode: bool,
}

impl Config {
    pub fn new(args: ConfigArgs) -> Result<Self> {
        let gitlab_base_url = args.gitlab_base_url.trim().trim_end_matches('/').to_string();
        if gitlab_base_url.is_empty() {
            bail!("GITLAB_BASE_URL is empty");
        }
        if args.gitlab_token.trim().is_empty() {
            bail!("GITLAB_TOKEN is empty");
        }
        if args.update_duration.is_zero() {
            bail!("ENVIRONMENT_UPDATE_DURATION should be greater than zero");
        }

        Ok(Self {
            gitlab_base_url,
            gitlab_token: args.gitlab_token.trim().to_string(),
            project_ids: parse_project_ids(args.gitlab_project_ids.as_deref().unwrap_or(""))?,
            protected_environments: parse_list(
                args.protected_environments.as_deref().unwrap_or(""),
            ),
            update_duration: args.update_duration,
            listen_address: args.listen_address,
            user_link_template: args.user_link_template.filter(|t| !t.is_empty()),
            http_timeout: args.http_timeout,
            shutdown_grace: args.shutdown_grace,
            dev_mode: args.dev_mode,
        })
    }
}

/// Comma-separated project ids; at least one is required.
pub fn parse_project_ids(input: &str) -> Result<Vec<u64>> {
    if input.trim().is_empty() {
        bail!("GITLAB_PROJECT_IDS should have at least one ID");
    }
    input
        .split(',')
        .map(|id| {
            let id = id.trim();
            match id.parse::<u64>() {
                Ok(id) => Ok(id),
                Err(_) => bail!("GITLAB_PROJECT_IDS should have integers. {:?} given", id),
            }
        })
        .collect()
}

/// Comma-separated names with blanks dropped. Names are kept verbatim
/// otherwise; matching is case-sensitive.
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a duration such as `30s`, `1m30s`, `1.5h` or `500ms`. A bare `0`
/// is accepted; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", input))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            unit => return Err(format!("unknown unit {:?} in duration {:?}", unit, input)),
        };
        total_secs += value * scale;
        rest = &rest[unit_end..];
    }

    Ok(Duration::from_millis((total_secs * 1000.0).round() as u64))
}
