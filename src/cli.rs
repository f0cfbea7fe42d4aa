use crate::backend::BackendContext;
use crate::core::session::SessionConfig;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct ClientCliConfig {
    pub backend: BackendContext,
    pub session: SessionConfig,
}

/// Contributes a group of global flags and folds their values into the config.
pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ClientCliConfig) -> anyhow::Result<()>;
}

pub struct CliRegistry {
    plugins: Vec<Box<dyn CliPlugin>>,
}

impl CliRegistry {
    pub fn with_defaults() -> Self {
        Self { plugins: vec![Box::new(HttpCliPlugin::new()), Box::new(PollCliPlugin::new())] }
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        self.plugins.iter().fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ClientCliConfig) -> anyhow::Result<()> {
        for p in &self.plugins {
            p.apply_matches(matches, cfg)
                .map_err(|e| anyhow::anyhow!("{} options: {e}", p.name()))?;
        }
        Ok(())
    }
}

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "server"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("server")
                .long("server")
                .global(true)
                .help_heading("Server")
                .help("Base URL of the download server")
                .default_value("http://localhost:5000")
                .num_args(1),
        )
        .arg(
            Arg::new("http_header")
                .long("header")
                .global(true)
                .help_heading("Server")
                .help("Extra HTTP header (repeatable), e.g. --header 'Authorization: Bearer xxx'")
                .action(ArgAction::Append)
                .num_args(1),
        )
        .arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .global(true)
                .help_heading("Server")
                .help("HTTP User-Agent")
                .default_value("UniversalDownloader/0.1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .global(true)
                .help_heading("Server")
                .help("Per-request timeout in seconds")
                .default_value("60")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retries")
                .long("retries")
                .global(true)
                .help_heading("Server")
                .help("Retries for transient errors while fetching the produced file")
                .default_value("2")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retry_backoff_ms")
                .long("retry-backoff-ms")
                .global(true)
                .help_heading("Server")
                .help("Retry backoff base in milliseconds")
                .default_value("400")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ClientCliConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("server") {
            cfg.backend.base_url = parse_base_url(s)?;
        }
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            cfg.backend.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            cfg.backend.timeout_secs = s.parse()?;
        }
        if let Some(s) = matches.get_one::<String>("http_retries") {
            cfg.backend.retries = s.parse()?;
        }
        if let Some(s) = matches.get_one::<String>("http_retry_backoff_ms") {
            cfg.backend.retry_backoff_ms = s.parse()?;
        }

        if let Some(values) = matches.get_many::<String>("http_header") {
            for h in values {
                let (k, v) = h
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("invalid header format: {}", h))?;
                cfg.backend.headers.insert(k.trim().to_string(), v.trim().to_string());
            }
        }

        Ok(())
    }
}

/// Endpoints are joined onto the base, so it must end with a slash.
fn parse_base_url(s: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(s.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("server must be http or https: {s}");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub struct PollCliPlugin;

impl PollCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for PollCliPlugin {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("poll_interval_ms")
                .long("poll-interval-ms")
                .global(true)
                .help_heading("Polling")
                .help("Delay between status checks")
                .default_value("2000")
                .num_args(1),
        )
        .arg(
            Arg::new("poll_timeout_secs")
                .long("poll-timeout-secs")
                .global(true)
                .help_heading("Polling")
                .help("Give up waiting for a terminal status after this long")
                .default_value("300")
                .num_args(1),
        )
        .arg(
            Arg::new("max_poll_failures")
                .long("max-poll-failures")
                .global(true)
                .help_heading("Polling")
                .help("Consecutive failed status checks before the job is reported failed")
                .default_value("5")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ClientCliConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("poll_interval_ms") {
            cfg.session.poll_interval = Duration::from_millis(s.parse::<u64>()?.max(1));
        }
        if let Some(s) = matches.get_one::<String>("poll_timeout_secs") {
            cfg.session.poll_timeout = Duration::from_secs(s.parse()?);
        }
        if let Some(s) = matches.get_one::<String>("max_poll_failures") {
            cfg.session.max_transport_failures = s.parse::<u32>()?.max(1);
        }
        Ok(())
    }
}
