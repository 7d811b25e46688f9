use axum::http::{header::RETRY_AFTER, Method, StatusCode};
use deskflow_shared::EventType;
use serde_json::{json, Value};
use serial_test::serial;
use tower::ServiceExt;

use crate::tests::fixtures::WorkflowFixture;
use crate::tests::helpers::{create_test_app, empty_request, json_request, read_json};
use crate::workflows::engine::EngineSettings;

async fn create(app: &axum::Router, body: &Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/workflows", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
#[serial]
async fn test_create_and_get_workflow() {
    let (app, _, _) = create_test_app(EngineSettings::default());

    let body = json!({
        "name": "Morning digest",
        "trigger": { "type": "schedule", "cron": "0 9 * * 1-5" },
        "actions": [{ "type": "notify", "title": "Digest", "message": "Good morning" }]
    });
    let created = create(&app, &body).await;

    assert_eq!(created["enabled"], false);
    assert_eq!(created["runCount"], 0);
    assert_eq!(created["trigger"]["cron"], "0 9 * * 1-5");
    assert_eq!(created["createdAt"], created["updatedAt"]);

    let id = created["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("/api/v1/workflows/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["name"], "Morning digest");

    let response = app
        .oneshot(empty_request(Method::GET, "/api/v1/workflows"))
        .await
        .unwrap();
    let list = read_json(response).await;
    assert_eq!(list["workflows"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_create_reports_every_violation() {
    let (app, state, _) = create_test_app(EngineSettings::default());

    let body = json!({
        "name": "",
        "trigger": { "type": "schedule", "cron": "invalid" },
        "actions": []
    });
    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = read_json(response).await;
    assert_eq!(error["code"], "VALIDATION_ERROR");
    let details: Vec<&str> = error["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(details.contains(&"Name must be 1-100 characters"));
    assert!(details.contains(&"Invalid cron expression"));
    assert!(details.contains(&"At least one action is required"));

    assert!(state.engine.list_workflows().await.is_empty());
}

#[tokio::test]
#[serial]
async fn test_create_rejects_forbidden_command() {
    let (app, _, _) = create_test_app(EngineSettings::default());

    let body = WorkflowFixture::notify("Cleanup")
        .with_action(deskflow_shared::Action::run_command("rm -rf /tmp/cache"))
        .json();
    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = read_json(response).await;
    assert_eq!(error["details"][0], "Action 2: Command contains forbidden pattern");
}

#[tokio::test]
#[serial]
async fn test_unknown_action_type_is_bad_request() {
    let (app, _, _) = create_test_app(EngineSettings::default());

    let body = json!({
        "name": "Odd",
        "trigger": { "type": "manual" },
        "actions": [{ "type": "launch_rocket" }]
    });
    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
#[serial]
async fn test_validate_endpoint_does_not_create() {
    let (app, state, _) = create_test_app(EngineSettings::default());

    let body = json!({
        "name": "Dry run",
        "trigger": { "type": "manual" },
        "actions": [{ "type": "spawn_agent", "agentType": "coder", "prompt": "fix", "maxTurns": 0 }]
    });
    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows/validate", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let verdict = read_json(response).await;
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["errors"][0], "Action 1: Max turns must be between 1 and 100");
    assert!(state.engine.list_workflows().await.is_empty());
}

#[tokio::test]
#[serial]
async fn test_update_validates_merged_workflow() {
    let (app, _, _) = create_test_app(EngineSettings::default());
    let created = create(&app, &WorkflowFixture::notify("Editable").json()).await;
    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request(Method::PUT, &uri, &json!({ "actions": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(json_request(Method::PUT, &uri, &json!({ "enabled": true, "description": "now on" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = read_json(response).await;
    assert_eq!(updated["enabled"], true);
    assert_eq!(updated["description"], "now on");
    assert_eq!(updated["name"], "Editable");
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let response = app
        .clone()
        .oneshot(json_request(Method::PUT, &uri, &json!({ "name": "Renamed" })))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["description"], "now on");

    let response = app
        .oneshot(json_request(Method::PUT, &uri, &json!({ "description": null })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = read_json(response).await;
    assert!(cleared.get("description").map_or(true, Value::is_null));
    assert_eq!(cleared["name"], "Renamed");
}

#[tokio::test]
#[serial]
async fn test_missing_workflow_is_not_found() {
    let (app, _, _) = create_test_app(EngineSettings::default());
    let uri = format!("/api/v1/workflows/{}", uuid::Uuid::new_v4());

    let response = app.clone().oneshot(empty_request(Method::GET, &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(json_request(Method::PUT, &uri, &json!({ "name": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request(Method::POST, &format!("{}/run", uri)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn test_delete_is_idempotent() {
    let (app, _, _) = create_test_app(EngineSettings::default());
    let created = create(&app, &WorkflowFixture::default().json()).await;
    let uri = format!("/api/v1/workflows/{}", created["id"].as_str().unwrap());

    let response = app.clone().oneshot(empty_request(Method::DELETE, &uri)).await.unwrap();
    assert_eq!(read_json(response).await["success"], true);

    let response = app.oneshot(empty_request(Method::DELETE, &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["success"], false);
}

#[tokio::test]
#[serial]
async fn test_run_now_and_history() {
    let (app, _, sinks) = create_test_app(EngineSettings::default());
    let created = create(&app, &WorkflowFixture::notify("Run me").json()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request(Method::POST, &format!("/api/v1/workflows/{}/run", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let run = read_json(response).await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["triggeredBy"], "manual");
    assert_eq!(run["results"][0]["status"], "success");
    assert_eq!(run["results"][0]["actionType"], "notify");
    assert_eq!(sinks.notifications.delivered().await.len(), 1);

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("/api/v1/workflows/{}/runs", id)))
        .await
        .unwrap();
    let runs = read_json(response).await;
    assert_eq!(runs["runs"][0]["id"], run["id"]);

    let response = app
        .oneshot(empty_request(Method::GET, &format!("/api/v1/workflows/{}", id)))
        .await
        .unwrap();
    let stored = read_json(response).await;
    assert_eq!(stored["runCount"], 1);
    assert_eq!(stored["lastRunStatus"], "success");
}

#[tokio::test]
#[serial]
async fn test_run_now_rate_limited() {
    let settings = EngineSettings {
        rate_limit_max_runs: 2,
        ..Default::default()
    };
    let (app, _, _) = create_test_app(settings);
    let created = create(&app, &WorkflowFixture::notify("Spammy").json()).await;
    let uri = format!("/api/v1/workflows/{}/run", created["id"].as_str().unwrap());

    for _ in 0..2 {
        let response = app.clone().oneshot(empty_request(Method::POST, &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(empty_request(Method::POST, &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let header: u64 = response
        .headers()
        .get(RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(header >= 1 && header <= 60);

    let error = read_json(response).await;
    assert_eq!(error["code"], "TOO_MANY_REQUESTS");
    assert_eq!(error["retryAfter"], header);
}

#[tokio::test]
#[serial]
async fn test_event_dispatch_runs_matching_workflows() {
    let (app, _, sinks) = create_test_app(EngineSettings::default());

    let mut watcher = WorkflowFixture::notify("Coder done")
        .on_event(EventType::AgentComplete)
        .enabled(true);
    watcher.trigger = deskflow_shared::Trigger::Event {
        event_type: EventType::AgentComplete,
        filter: json!({ "agentType": "coder" }).as_object().cloned(),
    };
    create(&app, &watcher.json()).await;
    create(
        &app,
        &WorkflowFixture::notify("Errors")
            .on_event(EventType::Error)
            .enabled(true)
            .json(),
    )
    .await;

    let event = json!({ "eventType": "agent_complete", "eventData": { "agentType": "coder", "agentId": "a7" } });
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/workflows/events", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let dispatch = read_json(response).await;
    assert_eq!(dispatch["matched"], 1);
    assert_eq!(dispatch["runs"][0]["triggeredBy"], "event");
    assert_eq!(sinks.notifications.delivered().await[0].title, "Coder done");

    let other = json!({ "eventType": "agent_complete", "eventData": { "agentType": "researcher" } });
    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows/events", &other))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["matched"], 0);
}

#[tokio::test]
#[serial]
async fn test_event_dispatch_reports_rate_limited() {
    let settings = EngineSettings {
        rate_limit_max_runs: 1,
        ..Default::default()
    };
    let (app, _, sinks) = create_test_app(settings);
    let created = create(
        &app,
        &WorkflowFixture::notify("Errors")
            .on_event(EventType::Error)
            .enabled(true)
            .json(),
    )
    .await;

    let event = json!({ "eventType": "error", "eventData": { "agentId": "a1" } });
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/workflows/events", &event))
        .await
        .unwrap();
    let first = read_json(response).await;
    assert_eq!(first["runs"].as_array().unwrap().len(), 1);
    assert!(first.get("rateLimited").is_none());

    let response = app
        .oneshot(json_request(Method::POST, "/api/v1/workflows/events", &event))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = read_json(response).await;
    assert_eq!(second["matched"], 1);
    assert!(second["runs"].as_array().unwrap().is_empty());
    assert_eq!(second["rateLimited"], json!([created["id"]]));
    assert_eq!(sinks.notifications.delivered().await.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_audit_log_query() {
    let (app, _, _) = create_test_app(EngineSettings::default());
    let first = create(&app, &WorkflowFixture::notify("First").json()).await;
    create(&app, &WorkflowFixture::notify("Second").json()).await;

    let id = first["id"].as_str().unwrap();
    app.clone()
        .oneshot(empty_request(Method::DELETE, &format!("/api/v1/workflows/{}", id)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("/api/v1/workflows/audit?workflowId={}", id)))
        .await
        .unwrap();
    let audit = read_json(response).await;
    let actions: Vec<&str> = audit["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["delete", "create"]);

    let response = app
        .oneshot(empty_request(Method::GET, "/api/v1/workflows/audit?limit=2"))
        .await
        .unwrap();
    let audit = read_json(response).await;
    assert_eq!(audit["entries"].as_array().unwrap().len(), 2);
    assert_eq!(audit["entries"][0]["action"], "delete");
}

#[tokio::test]
#[serial]
async fn test_health_check() {
    let (app, _, _) = create_test_app(EngineSettings::default());
    let response = app.oneshot(empty_request(Method::GET, "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "healthy");
}
