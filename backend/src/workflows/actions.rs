// Workflow Actions - collaborator contracts and the adapters shipped with the service
//
// The executor never talks to a concrete service. Each action kind maps onto
// one of the traits below; production wiring lives in `main.rs`.

use async_trait::async_trait;
use deskflow_shared::{Channel, Notification};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::command_filter::{is_allowed_program, validate_command, NOT_ALLOWED_ERROR};

pub type ActionOutput = serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Command rejected: {0}")]
    CommandRejected(String),
    #[error("{0}")]
    NotConfigured(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Action timed out after {0}s")]
    Timeout(u64),
    #[error("Command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ActionOutcome = Result<ActionOutput, ActionError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnOptions {
    pub model: Option<String>,
    pub max_turns: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseTarget {
    Agent(String),
    All,
}

impl PauseTarget {
    /// `all: true` wins over an agent id; with neither, every agent is paused
    pub fn from_action(agent_id: Option<&str>, all: Option<bool>) -> Self {
        match (agent_id, all) {
            (_, Some(true)) => Self::All,
            (Some(id), _) if !id.trim().is_empty() => Self::Agent(id.to_string()),
            _ => Self::All,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> ActionOutcome;
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, channel: Channel, message: &str, recipient: Option<&str>) -> ActionOutcome;
}

#[async_trait]
pub trait AgentOrchestrator: Send + Sync {
    async fn spawn_agent(&self, agent_type: &str, prompt: &str, opts: SpawnOptions) -> ActionOutcome;

    async fn pause_agent(&self, target: PauseTarget) -> ActionOutcome;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// `command` has already passed the safety filter
    async fn run_command(&self, command: &str) -> ActionOutcome;
}

/// The full set of side-effect collaborators handed to the executor
#[derive(Clone)]
pub struct ActionSinks {
    pub notifications: Arc<dyn NotificationSink>,
    pub messages: Arc<dyn MessageSink>,
    pub agents: Arc<dyn AgentOrchestrator>,
    pub commands: Arc<dyn CommandRunner>,
}

// ==================== Messaging ====================

/// Posts messages to a per-channel webhook (bridge bots, email relays, SMS gateways)
pub struct WebhookMessageSink {
    client: reqwest::Client,
    webhooks: HashMap<Channel, String>,
}

impl WebhookMessageSink {
    pub fn new(webhooks: HashMap<Channel, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhooks,
        }
    }
}

#[async_trait]
impl MessageSink for WebhookMessageSink {
    async fn send(&self, channel: Channel, message: &str, recipient: Option<&str>) -> ActionOutcome {
        let url = self.webhooks.get(&channel).ok_or_else(|| {
            ActionError::NotConfigured(format!("Channel {} is not configured", channel.as_str()))
        })?;

        let response = self
            .client
            .post(url)
            .json(&json!({
                "channel": channel.as_str(),
                "message": message,
                "recipient": recipient,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Delivery(format!(
                "{} webhook returned {}",
                channel.as_str(),
                status
            )));
        }

        info!("Delivered message to {}", channel.as_str());
        Ok(json!({
            "channel": channel.as_str(),
            "delivered": true,
            "status": status.as_u16(),
        }))
    }
}

// ==================== Agents ====================

/// Accepts spawn/pause requests and records them in the log.
///
/// Stands in for the agent runtime, which lives in another process.
#[derive(Default)]
pub struct LoggingAgentOrchestrator;

#[async_trait]
impl AgentOrchestrator for LoggingAgentOrchestrator {
    async fn spawn_agent(&self, agent_type: &str, prompt: &str, opts: SpawnOptions) -> ActionOutcome {
        let agent_id = Uuid::new_v4();
        info!(
            agent_type,
            %agent_id,
            model = opts.model.as_deref().unwrap_or("default"),
            max_turns = opts.max_turns,
            prompt_chars = prompt.chars().count(),
            "Agent spawn requested"
        );

        Ok(json!({
            "agentId": agent_id,
            "agentType": agent_type,
            "status": "requested",
        }))
    }

    async fn pause_agent(&self, target: PauseTarget) -> ActionOutcome {
        match target {
            PauseTarget::Agent(id) => {
                info!(agent_id = %id, "Agent pause requested");
                Ok(json!({ "paused": id }))
            }
            PauseTarget::All => {
                info!("Pause requested for all agents");
                Ok(json!({ "paused": "all" }))
            }
        }
    }
}

// ==================== Commands ====================

const MAX_COMMAND_OUTPUT_CHARS: usize = 4096;

/// Runs filtered commands directly (no shell), disabled unless configured
pub struct SandboxedCommandRunner {
    enabled: bool,
    workdir: Option<PathBuf>,
}

impl SandboxedCommandRunner {
    pub fn new(enabled: bool, workdir: Option<PathBuf>) -> Self {
        Self { enabled, workdir }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(false, None)
    }
}

#[async_trait]
impl CommandRunner for SandboxedCommandRunner {
    async fn run_command(&self, command: &str) -> ActionOutcome {
        // The runner is the last stop before a process; check again
        let check = validate_command(command);
        if !check.valid {
            return Err(ActionError::CommandRejected(check.error.unwrap_or_default()));
        }
        if !is_allowed_program(command) {
            return Err(ActionError::CommandRejected(NOT_ALLOWED_ERROR.to_string()));
        }

        if !self.enabled {
            return Err(ActionError::NotConfigured("Command runner is disabled".to_string()));
        }

        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ActionError::CommandRejected("empty command".to_string()))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(parts).kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        let stdout: String = String::from_utf8_lossy(&output.stdout)
            .chars()
            .take(MAX_COMMAND_OUTPUT_CHARS)
            .collect();

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(MAX_COMMAND_OUTPUT_CHARS)
                .collect();
            warn!("Command '{}' failed", program);
            return Err(ActionError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(json!({
            "command": command,
            "exitCode": output.status.code().unwrap_or(0),
            "stdout": stdout,
        }))
    }
}
