// Workflow Executor - Executes workflow actions

use chrono::Utc;
use deskflow_shared::{Action, ActionResult, ActionStatus, Notification};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{ActionError, ActionOutcome, ActionSinks, PauseTarget, SpawnOptions};
use super::command_filter::validate_command;

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Context for workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
}

pub struct WorkflowExecutor {
    sinks: ActionSinks,
    action_timeout: Duration,
}

impl WorkflowExecutor {
    pub fn new(sinks: ActionSinks, action_timeout: Duration) -> Self {
        Self {
            sinks,
            action_timeout,
        }
    }

    /// Execute a single action. Never fails: errors and timeouts become a
    /// `failed` result so the caller can move on to the next action.
    pub async fn execute_action(
        &self,
        index: usize,
        action: &Action,
        context: &ExecutionContext,
    ) -> ActionResult {
        let start = Instant::now();
        let kind = action.kind();
        let timeout = self.timeout_for(action);

        info!(
            run_id = %context.run_id,
            "Executing action {} ({}) of '{}'",
            index,
            kind.as_str(),
            context.workflow_name
        );

        let outcome = match tokio::time::timeout(timeout, self.dispatch(action, context)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ActionError::Timeout(timeout.as_secs())),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => ActionResult {
                action_index: index,
                action_type: kind,
                status: ActionStatus::Success,
                output: Some(output),
                error: None,
                duration_ms,
            },
            Err(e) => {
                warn!(
                    run_id = %context.run_id,
                    "Action {} ({}) of '{}' failed: {}",
                    index,
                    kind.as_str(),
                    context.workflow_name,
                    e
                );
                ActionResult {
                    action_index: index,
                    action_type: kind,
                    status: ActionStatus::Failed,
                    output: None,
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }

    fn timeout_for(&self, action: &Action) -> Duration {
        match action {
            Action::RunCommand {
                timeout: Some(secs),
                ..
            } if *secs > 0 => Duration::from_secs(*secs),
            _ => self.action_timeout,
        }
    }

    async fn dispatch(&self, action: &Action, context: &ExecutionContext) -> ActionOutcome {
        match action {
            Action::Notify {
                title,
                message,
                priority,
            } => {
                let notification = Notification {
                    id: Uuid::new_v4(),
                    title: title.clone(),
                    message: message.clone(),
                    priority: priority.unwrap_or_default(),
                    workflow_id: Some(context.workflow_id),
                    created_at: Utc::now(),
                };
                self.sinks.notifications.deliver(notification).await
            }
            Action::SendMessage {
                channel,
                message,
                recipient,
            } => {
                self.sinks
                    .messages
                    .send(*channel, message, recipient.as_deref())
                    .await
            }
            Action::SpawnAgent {
                agent_type,
                prompt,
                model,
                max_turns,
            } => {
                let opts = SpawnOptions {
                    model: model.clone(),
                    max_turns: *max_turns,
                };
                self.sinks.agents.spawn_agent(agent_type, prompt, opts).await
            }
            Action::PauseAgent { agent_id, all } => {
                let target = PauseTarget::from_action(agent_id.as_deref(), *all);
                self.sinks.agents.pause_agent(target).await
            }
            Action::RunCommand { command, .. } => {
                // Stored workflows may predate a filter change; check at dispatch too
                let check = validate_command(command);
                if !check.valid {
                    return Err(ActionError::CommandRejected(check.error.unwrap_or_default()));
                }
                self.sinks.commands.run_command(command).await
            }
        }
    }
}
