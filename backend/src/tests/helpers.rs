use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, Response},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Once};

use super::fixtures::{RecordingSinks, recording_sinks};
use crate::config::{CommandRunnerConfig, Config};
use crate::notifications::NotificationHub;
use crate::workflows::engine::{EngineSettings, WorkflowEngine};
use crate::{app_router, AppState};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

pub fn test_config(engine: EngineSettings) -> Config {
    Config {
        server_addr: "127.0.0.1:0".to_string(),
        engine,
        scheduler_enabled: false,
        commands: CommandRunnerConfig::default(),
        channel_webhooks: HashMap::new(),
    }
}

/// Router over an engine whose side effects land in recording sinks
pub fn create_test_app(settings: EngineSettings) -> (Router, Arc<AppState>, RecordingSinks) {
    init_test_logging();

    let sinks = recording_sinks();
    let engine = Arc::new(WorkflowEngine::in_memory(sinks.as_action_sinks(), settings.clone()));
    let state = Arc::new(AppState {
        engine,
        notifications: Arc::new(NotificationHub::default()),
        config: test_config(settings),
    });

    (app_router(state.clone()), state, sinks)
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
