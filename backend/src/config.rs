use deskflow_shared::Channel;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::audit::DEFAULT_AUDIT_LOG_LIMIT;
use crate::services::rate_limiter::{DEFAULT_MAX_RUNS_PER_WINDOW, DEFAULT_WINDOW_SECS};
use crate::workflows::engine::EngineSettings;
use crate::workflows::history::DEFAULT_RUN_HISTORY_LIMIT;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub engine: EngineSettings,
    pub scheduler_enabled: bool,
    pub commands: CommandRunnerConfig,
    /// Webhook URL per outbound message channel
    pub channel_webhooks: HashMap<Channel, String>,
}

/// Settings for the `run_command` action runner
#[derive(Debug, Clone, Default)]
pub struct CommandRunnerConfig {
    pub enabled: bool,
    pub workdir: Option<PathBuf>,
}

const CHANNELS: [(Channel, &str); 5] = [
    (Channel::Telegram, "CHANNEL_WEBHOOK_TELEGRAM"),
    (Channel::Discord, "CHANNEL_WEBHOOK_DISCORD"),
    (Channel::Signal, "CHANNEL_WEBHOOK_SIGNAL"),
    (Channel::Email, "CHANNEL_WEBHOOK_EMAIL"),
    (Channel::Sms, "CHANNEL_WEBHOOK_SMS"),
];

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let channel_webhooks = CHANNELS
            .iter()
            .filter_map(|(channel, key)| {
                env::var(key)
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| (*channel, url))
            })
            .collect();

        let rate_limit_window_secs = parse_or("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS);
        if rate_limit_window_secs <= 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be positive");
        }

        Ok(Config {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            engine: EngineSettings {
                run_history_limit: parse_or("RUN_HISTORY_LIMIT", DEFAULT_RUN_HISTORY_LIMIT),
                audit_log_limit: parse_or("AUDIT_LOG_LIMIT", DEFAULT_AUDIT_LOG_LIMIT),
                rate_limit_window_secs,
                rate_limit_max_runs: parse_or("RATE_LIMIT_MAX_RUNS", DEFAULT_MAX_RUNS_PER_WINDOW),
                rate_limit_automatic_runs: parse_or("RATE_LIMIT_AUTOMATIC_RUNS", true),
                action_timeout: Duration::from_secs(parse_or("ACTION_TIMEOUT_SECS", 30)),
            },
            scheduler_enabled: parse_or("SCHEDULER_ENABLED", true),
            commands: CommandRunnerConfig {
                enabled: parse_or("COMMAND_RUNNER_ENABLED", false),
                workdir: env::var("COMMAND_WORKDIR").ok().map(PathBuf::from),
            },
            channel_webhooks,
        })
    }
}
