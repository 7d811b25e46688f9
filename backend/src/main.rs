use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod handlers;
mod jobs;
mod notifications;
mod services;
mod validation;
mod workflows;


use config::Config;
use jobs::scheduler::{SchedulerConfig, WorkflowScheduler};
use notifications::NotificationHub;
use workflows::actions::{ActionSinks, LoggingAgentOrchestrator, SandboxedCommandRunner, WebhookMessageSink};
use workflows::engine::WorkflowEngine;

pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub notifications: Arc<NotificationHub>,
    pub config: Config,
}

/// Wire the default collaborators: the in-process notification hub, webhook
/// channels, the logging agent client and the sandboxed command runner.
pub fn build_state(config: Config) -> AppState {
    let notifications = Arc::new(NotificationHub::default());

    let sinks = ActionSinks {
        notifications: notifications.clone(),
        messages: Arc::new(WebhookMessageSink::new(config.channel_webhooks.clone())),
        agents: Arc::new(LoggingAgentOrchestrator),
        commands: Arc::new(SandboxedCommandRunner::new(
            config.commands.enabled,
            config.commands.workdir.clone(),
        )),
    };

    let engine = Arc::new(WorkflowEngine::in_memory(sinks, config.engine.clone()));

    AppState {
        engine,
        notifications,
        config,
    }
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Deskflow Workflow API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/notifications", notifications::notification_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deskflow_backend=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let app_state = Arc::new(build_state(config.clone()));

    let mut scheduler = if config.scheduler_enabled {
        let scheduler =
            WorkflowScheduler::new(app_state.engine.clone(), SchedulerConfig::default()).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Workflow scheduler disabled");
        None
    };

    let app = app_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }

    Ok(())
}
