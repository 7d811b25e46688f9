//! Workflow validation for the automation API
//!
//! Pure functions: a candidate goes in, every violated rule comes out. Callers
//! decide what to do with the verdict; nothing here touches the store.

use deskflow_shared::{Action, CreateWorkflowRequest, MAX_ACTIONS_PER_WORKFLOW, Trigger, Workflow};
use serde::Serialize;

use crate::workflows::command_filter::validate_command;

/// Outcome of validating a whole workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Outcome of validating a single action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Borrowed view of the fields validation cares about.
///
/// Create bodies and merged update results both convert into this, so the
/// same rules gate both paths.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowCandidate<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub trigger: Option<&'a Trigger>,
    pub actions: &'a [Action],
}

impl<'a> From<&'a CreateWorkflowRequest> for WorkflowCandidate<'a> {
    fn from(req: &'a CreateWorkflowRequest) -> Self {
        Self {
            name: &req.name,
            description: req.description.as_deref(),
            trigger: Some(&req.trigger),
            actions: &req.actions,
        }
    }
}

impl<'a> From<&'a Workflow> for WorkflowCandidate<'a> {
    fn from(workflow: &'a Workflow) -> Self {
        Self {
            name: &workflow.name,
            description: workflow.description.as_deref(),
            trigger: Some(&workflow.trigger),
            actions: &workflow.actions,
        }
    }
}

/// Length helpers; lengths are counted in characters, not bytes
pub mod string {
    pub fn char_len(value: &str) -> usize {
        value.chars().count()
    }

    pub fn length_between(value: &str, min: usize, max: usize) -> bool {
        let len = char_len(value);
        len >= min && len <= max
    }
}

pub fn validate_workflow(candidate: WorkflowCandidate<'_>) -> ValidationOutcome {
    let mut errors = Vec::new();

    if !string::length_between(candidate.name, 1, 100) {
        errors.push("Name must be 1-100 characters".to_string());
    }

    if let Some(description) = candidate.description {
        if string::char_len(description) > 500 {
            errors.push("Description must be 500 characters or less".to_string());
        }
    }

    match candidate.trigger {
        None => errors.push("Trigger is required".to_string()),
        Some(Trigger::Schedule { cron, .. }) => {
            if cron.trim().is_empty() || !is_valid_cron(cron) {
                errors.push("Invalid cron expression".to_string());
            }
        }
        // The event type is a closed enum, so a typed trigger always carries one
        Some(Trigger::Event { .. }) | Some(Trigger::Manual) => {}
    }

    if candidate.actions.is_empty() {
        errors.push("At least one action is required".to_string());
    } else if candidate.actions.len() > MAX_ACTIONS_PER_WORKFLOW {
        errors.push(format!("Maximum {} actions allowed", MAX_ACTIONS_PER_WORKFLOW));
    }

    for (index, action) in candidate.actions.iter().enumerate() {
        let result = validate_action(action);
        if let Some(reason) = result.error {
            errors.push(format!("Action {}: {}", index + 1, reason));
        }
    }

    ValidationOutcome::from_errors(errors)
}

pub fn validate_action(action: &Action) -> ActionValidation {
    match action {
        Action::SendMessage { message, .. } => {
            if !string::length_between(message, 1, 4000) {
                return ActionValidation::invalid("Message must be 1-4000 characters");
            }
        }
        Action::SpawnAgent {
            prompt, max_turns, ..
        } => {
            if !string::length_between(prompt, 1, 10_000) {
                return ActionValidation::invalid("Prompt must be 1-10000 characters");
            }
            if let Some(turns) = max_turns {
                if !(1..=100).contains(turns) {
                    return ActionValidation::invalid("Max turns must be between 1 and 100");
                }
            }
        }
        Action::Notify { title, message, .. } => {
            if !string::length_between(title, 1, 200) {
                return ActionValidation::invalid("Title must be 1-200 characters");
            }
            if !string::length_between(message, 1, 1000) {
                return ActionValidation::invalid("Message must be 1-1000 characters");
            }
        }
        Action::PauseAgent { .. } => {}
        Action::RunCommand { command, .. } => {
            let check = validate_command(command);
            if !check.valid {
                return ActionValidation {
                    valid: false,
                    error: check.error,
                };
            }
        }
    }

    ActionValidation::ok()
}

/// Structural cron check: 5 or 6 fields of digits and `, - * /`, or a lone
/// `?`, `L` or `W`. Ranges are not checked, so `99 99 99 99 99` passes.
pub fn is_valid_cron(expression: &str) -> bool {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 && fields.len() != 6 {
        return false;
    }

    fields.iter().all(|field| {
        matches!(*field, "?" | "L" | "W")
            || field
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | '*' | '/'))
    })
}
