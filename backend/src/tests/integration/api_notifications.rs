use axum::http::{Method, StatusCode};
use deskflow_shared::{Action, Channel, TriggerSource};
use serial_test::serial;
use std::sync::Arc;
use tower::ServiceExt;

use crate::tests::fixtures::WorkflowFixture;
use crate::tests::helpers::{empty_request, init_test_logging, read_json, test_config};
use crate::workflows::engine::EngineSettings;
use crate::{app_router, build_state};

#[tokio::test]
#[serial]
async fn test_notify_action_reaches_hub() {
    init_test_logging();
    let state = Arc::new(build_state(test_config(EngineSettings::default())));
    let app = app_router(state.clone());
    let mut live = state.notifications.subscribe();

    let wf = state
        .engine
        .create_workflow(WorkflowFixture::notify("Budget alert").request())
        .await;
    state
        .engine
        .trigger_workflow(wf.id, TriggerSource::Manual)
        .await
        .unwrap();

    assert_eq!(live.recv().await.unwrap().workflow_id, Some(wf.id));

    let response = app
        .oneshot(empty_request(Method::GET, "/api/v1/notifications"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["notifications"][0]["title"], "Budget alert");
    assert_eq!(body["notifications"][0]["priority"], "normal");
}

#[tokio::test]
#[serial]
async fn test_default_wiring_fails_unconfigured_actions() {
    init_test_logging();
    let state = build_state(test_config(EngineSettings::default()));

    let input = WorkflowFixture::notify("Mixed")
        .with_action(Action::SendMessage {
            channel: Channel::Telegram,
            message: "hello".to_string(),
            recipient: None,
        })
        .with_action(Action::run_command("git status"))
        .request();
    let wf = state.engine.create_workflow(input).await;

    let run = state
        .engine
        .execute_workflow(wf.id, TriggerSource::Manual)
        .await
        .unwrap();

    let errors: Vec<Option<&str>> = run.results.iter().map(|r| r.error.as_deref()).collect();
    assert_eq!(
        errors,
        vec![
            None,
            Some("Channel telegram is not configured"),
            Some("Command runner is disabled"),
        ]
    );
}
