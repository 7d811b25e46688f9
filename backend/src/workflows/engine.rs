// Workflow Engine - Core workflow processing and management

use chrono::{DateTime, Utc};
use deskflow_shared::{
    ActionStatus, AuditAction, AuditLogEntry, CreateWorkflowRequest, EventType, LastRunStatus,
    RunStatus, TriggerSource, UpdateWorkflowRequest, Workflow, WorkflowRun,
};
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::actions::ActionSinks;
use super::executor::{DEFAULT_ACTION_TIMEOUT, ExecutionContext, WorkflowExecutor};
use super::history::{DEFAULT_RUN_HISTORY_LIMIT, RunHistory};
use super::store::{InMemoryWorkflowRepository, WorkflowRepository};
use super::triggers::{self, EventPayload, TriggerEvent};
use crate::services::audit::{AuditEntryBuilder, AuditService, ChangeTracker, DEFAULT_AUDIT_LOG_LIMIT};
use crate::services::rate_limiter::{
    DEFAULT_MAX_RUNS_PER_WINDOW, DEFAULT_WINDOW_SECS, RateLimitDecision, WorkflowRateLimiter,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),
    #[error("Rate limit exceeded for workflow {workflow_id}, retry after {retry_after_secs}s")]
    RateLimited {
        workflow_id: Uuid,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub run_history_limit: usize,
    pub audit_log_limit: usize,
    pub rate_limit_window_secs: i64,
    pub rate_limit_max_runs: u32,
    /// Whether scheduled and event runs also count against the limiter
    pub rate_limit_automatic_runs: bool,
    pub action_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            run_history_limit: DEFAULT_RUN_HISTORY_LIMIT,
            audit_log_limit: DEFAULT_AUDIT_LOG_LIMIT,
            rate_limit_window_secs: DEFAULT_WINDOW_SECS,
            rate_limit_max_runs: DEFAULT_MAX_RUNS_PER_WINDOW,
            rate_limit_automatic_runs: true,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }
}

/// Result of fanning an event out to matching workflows
#[derive(Debug, Clone, Default)]
pub struct EventDispatch {
    pub matched: usize,
    pub runs: Vec<WorkflowRun>,
    pub rate_limited: Vec<Uuid>,
}

pub struct WorkflowEngine {
    repository: Arc<dyn WorkflowRepository>,
    history: RunHistory,
    audit: AuditService,
    rate_limiter: WorkflowRateLimiter,
    executor: WorkflowExecutor,
    rate_limit_automatic_runs: bool,
    // Serializes read-modify-write of stored workflow records
    mutation_lock: Mutex<()>,
    // One lock per workflow so runs of the same workflow never interleave
    run_locks: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Merge a partial update onto a stored workflow. `id`, `createdAt` and run
/// statistics always come from `existing`.
pub fn apply_update(existing: &Workflow, partial: &UpdateWorkflowRequest, now: DateTime<Utc>) -> Workflow {
    let mut merged = existing.clone();

    if let Some(name) = &partial.name {
        merged.name = name.clone();
    }
    // `Some(None)` clears the description
    if let Some(description) = &partial.description {
        merged.description = description.clone();
    }
    if let Some(trigger) = &partial.trigger {
        merged.trigger = trigger.clone();
    }
    if let Some(actions) = &partial.actions {
        merged.actions = actions.clone();
    }
    if let Some(enabled) = partial.enabled {
        merged.enabled = enabled;
    }

    // Strictly later than the stored stamp, even when the clock has not moved
    merged.updated_at = now.max(existing.updated_at + chrono::Duration::microseconds(1));
    merged
}

impl WorkflowEngine {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        sinks: ActionSinks,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repository,
            history: RunHistory::new(settings.run_history_limit),
            audit: AuditService::new(settings.audit_log_limit),
            rate_limiter: WorkflowRateLimiter::new(
                settings.rate_limit_window_secs,
                settings.rate_limit_max_runs,
            ),
            executor: WorkflowExecutor::new(sinks, settings.action_timeout),
            rate_limit_automatic_runs: settings.rate_limit_automatic_runs,
            mutation_lock: Mutex::new(()),
            run_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Engine backed by the in-memory repository
    pub fn in_memory(sinks: ActionSinks, settings: EngineSettings) -> Self {
        Self::new(Arc::new(InMemoryWorkflowRepository::new()), sinks, settings)
    }

    // ==================== CRUD ====================

    /// Store a new workflow. Callers validate first; this only persists and audits.
    pub async fn create_workflow(&self, input: CreateWorkflowRequest) -> Workflow {
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            trigger: input.trigger,
            actions: input.actions,
            enabled: input.enabled.unwrap_or(false),
            created_at: now,
            updated_at: now,
            last_run: None,
            last_run_status: None,
            run_count: 0,
        };

        self.repository.put(workflow.clone()).await;

        self.audit
            .log(AuditEntryBuilder::new(AuditAction::Create, &workflow).details_json(json!({
                "trigger": workflow.trigger.tag(),
                "actionCount": workflow.actions.len(),
            })))
            .await;

        info!("Created workflow '{}' ({})", workflow.name, workflow.id);
        workflow
    }

    pub async fn get_workflow(&self, id: Uuid) -> Option<Workflow> {
        self.repository.get(id).await
    }

    /// All workflows, most recently updated first
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.repository.list().await
    }

    pub async fn update_workflow(&self, id: Uuid, partial: UpdateWorkflowRequest) -> Option<Workflow> {
        let _guard = self.mutation_lock.lock().await;

        let existing = self.repository.get(id).await?;
        let merged = apply_update(&existing, &partial, Utc::now());
        self.repository.put(merged.clone()).await;

        let action = if merged.enabled != existing.enabled {
            if merged.enabled {
                AuditAction::Enable
            } else {
                AuditAction::Disable
            }
        } else {
            AuditAction::Update
        };

        let mut tracker = ChangeTracker::new();
        // Tracking only fails if a field cannot serialize, which ours always can
        let _ = tracker.track("name", &existing.name, &merged.name);
        let _ = tracker.track("description", &existing.description, &merged.description);
        let _ = tracker.track("trigger", &existing.trigger, &merged.trigger);
        let _ = tracker.track("actions", &existing.actions, &merged.actions);
        let _ = tracker.track("enabled", &existing.enabled, &merged.enabled);

        self.audit
            .log(AuditEntryBuilder::new(action, &merged).details_json(json!({
                "fields": partial.touched_fields(),
                "changes": tracker.into_json(),
            })))
            .await;

        info!("Updated workflow '{}' ({})", merged.name, merged.id);
        Some(merged)
    }

    /// Remove a workflow and its run history. Audit entries stay.
    pub async fn delete_workflow(&self, id: Uuid) -> bool {
        let removed = {
            let _guard = self.mutation_lock.lock().await;
            self.repository.delete(id).await
        };

        let Some(workflow) = removed else {
            return false;
        };

        self.history.remove_workflow(id).await;
        self.rate_limiter.forget(id);
        self.run_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);

        self.audit
            .log(AuditEntryBuilder::new(AuditAction::Delete, &workflow))
            .await;

        info!("Deleted workflow '{}' ({})", workflow.name, id);
        true
    }

    // ==================== Execution ====================

    pub fn check_rate_limit(&self, id: Uuid) -> RateLimitDecision {
        self.rate_limiter.check(id)
    }

    /// Gatekeeper entry point used by the API, scheduler and event bus. Checks
    /// the limiter, then executes.
    pub async fn trigger_workflow(
        &self,
        id: Uuid,
        triggered_by: TriggerSource,
    ) -> Result<WorkflowRun, EngineError> {
        if self.repository.get(id).await.is_none() {
            return Err(EngineError::WorkflowNotFound(id));
        }

        let gated = triggered_by == TriggerSource::Manual || self.rate_limit_automatic_runs;
        if gated {
            match self.check_rate_limit(id) {
                RateLimitDecision::Allowed { remaining } => {
                    debug!("Workflow {} admitted, {} runs left in window", id, remaining);
                }
                RateLimitDecision::Limited { retry_after_secs } => {
                    warn!(
                        "Rate limit hit for workflow {} ({} run), retry after {}s",
                        id,
                        triggered_by.as_str(),
                        retry_after_secs
                    );
                    return Err(EngineError::RateLimited {
                        workflow_id: id,
                        retry_after_secs,
                    });
                }
            }
        }

        self.execute_workflow(id, triggered_by).await
    }

    /// Run every action of a workflow in order. Action failures are recorded
    /// on the run; the only error is a missing workflow.
    pub async fn execute_workflow(
        &self,
        id: Uuid,
        triggered_by: TriggerSource,
    ) -> Result<WorkflowRun, EngineError> {
        let run_lock = self.run_lock(id);
        let _run_guard = run_lock.lock().await;

        let workflow = self
            .repository
            .get(id)
            .await
            .ok_or(EngineError::WorkflowNotFound(id))?;

        let mut run = WorkflowRun {
            id: Uuid::new_v4(),
            workflow_id: id,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            triggered_by,
            results: Vec::with_capacity(workflow.actions.len()),
        };
        self.history.push_front(run.clone()).await;

        let context = ExecutionContext {
            run_id: run.id,
            workflow_id: id,
            workflow_name: workflow.name.clone(),
        };

        info!(
            "Running workflow '{}' ({} actions, {})",
            workflow.name,
            workflow.actions.len(),
            triggered_by.as_str()
        );

        for (index, action) in workflow.actions.iter().enumerate() {
            let result = self.executor.execute_action(index, action, &context).await;
            run.results.push(result);
            self.history.update(&run).await;
        }

        let failed = run
            .results
            .iter()
            .any(|r| r.status == ActionStatus::Failed);
        run.status = if failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.completed_at = Some(Utc::now());
        self.history.update(&run).await;

        {
            let _guard = self.mutation_lock.lock().await;
            // The workflow may have been deleted mid-run; then there is nothing to update
            if let Some(mut current) = self.repository.get(id).await {
                current.last_run = run.completed_at;
                current.last_run_status = Some(if failed {
                    LastRunStatus::Failed
                } else {
                    LastRunStatus::Success
                });
                current.run_count += 1;
                self.repository.put(current).await;
            }
        }

        let summary: Vec<_> = run
            .results
            .iter()
            .map(|r| json!({ "type": r.action_type, "status": r.status }))
            .collect();
        self.audit
            .log(AuditEntryBuilder::new(AuditAction::Run, &workflow).details_json(json!({
                "runId": run.id,
                "triggeredBy": triggered_by,
                "status": run.status,
                "results": summary,
            })))
            .await;

        if failed {
            warn!("Workflow '{}' finished with failures (run {})", workflow.name, run.id);
        } else {
            info!("Workflow '{}' completed (run {})", workflow.name, run.id);
        }

        Ok(run)
    }

    fn run_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.run_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_default()
            .clone()
    }

    pub async fn get_workflow_runs(&self, id: Uuid) -> Vec<WorkflowRun> {
        self.history.list(id).await
    }

    // ==================== Trigger selection ====================

    pub async fn match_event_trigger(
        &self,
        event_type: EventType,
        event_data: Option<&EventPayload>,
    ) -> Vec<Workflow> {
        let workflows = self.repository.list().await;
        triggers::match_event_trigger(&workflows, event_type, event_data)
    }

    pub async fn get_scheduled_workflows(&self) -> Vec<Workflow> {
        let workflows = self.repository.list().await;
        triggers::scheduled_workflows(&workflows)
    }

    /// Run every workflow matching `event`. Distinct workflows run concurrently.
    pub async fn dispatch_event(&self, event: TriggerEvent) -> EventDispatch {
        let matches = self
            .match_event_trigger(event.event_type, event.payload.as_ref())
            .await;

        info!(
            "Event {} ({}) matched {} workflow(s)",
            event.event_id,
            event.event_type.as_str(),
            matches.len()
        );

        let outcomes = join_all(
            matches
                .iter()
                .map(|workflow| self.trigger_workflow(workflow.id, TriggerSource::Event)),
        )
        .await;

        let mut dispatch = EventDispatch {
            matched: matches.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(run) => dispatch.runs.push(run),
                Err(EngineError::RateLimited { workflow_id, .. }) => {
                    dispatch.rate_limited.push(workflow_id)
                }
                // Deleted between matching and running
                Err(EngineError::WorkflowNotFound(_)) => {}
            }
        }
        dispatch
    }

    // ==================== Audit ====================

    pub async fn audit_log(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.audit.recent(limit).await
    }

    pub async fn audit_log_for(&self, id: Uuid, limit: usize) -> Vec<AuditLogEntry> {
        self.audit.for_workflow(id, limit).await
    }

    pub fn rate_limiter(&self) -> &WorkflowRateLimiter {
        &self.rate_limiter
    }
}
