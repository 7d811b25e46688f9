// Job Scheduler - Runs schedule-triggered workflows and engine housekeeping

use deskflow_shared::{Trigger, TriggerSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::workflows::engine::{EngineError, WorkflowEngine};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Workflow {workflow_id} has an unschedulable cron expression '{cron}'")]
    InvalidSchedule { workflow_id: Uuid, cron: String },
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often workflow schedules are re-read from the engine
    pub reconcile_interval: Duration,
    /// How often expired rate-limit windows are pruned
    pub housekeeping_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            housekeeping_interval: Duration::from_secs(60),
        }
    }
}

/// Workflow cron expressions are five fields; the scheduler wants a leading
/// seconds field. Six-field expressions are passed through.
pub fn to_scheduler_expression(cron: &str) -> String {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    job_id: Uuid,
    cron: String,
}

/// Changes made by one reconcile pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub skipped: Vec<Uuid>,
}

/// Keeps one cron job per enabled, schedule-triggered workflow
#[derive(Clone)]
struct ScheduleRegistry {
    engine: Arc<WorkflowEngine>,
    jobs: Arc<Mutex<HashMap<Uuid, ScheduledJob>>>,
}

impl ScheduleRegistry {
    async fn reconcile(&self, scheduler: &TokioScheduler) -> JobResult<ReconcileReport> {
        let desired: HashMap<Uuid, String> = self
            .engine
            .get_scheduled_workflows()
            .await
            .into_iter()
            .filter_map(|workflow| match workflow.trigger {
                Trigger::Schedule { cron, .. } => Some((workflow.id, cron)),
                _ => None,
            })
            .collect();

        let mut jobs = self.jobs.lock().await;
        let mut report = ReconcileReport::default();

        let stale: Vec<Uuid> = jobs
            .iter()
            .filter(|(id, job)| desired.get(*id) != Some(&job.cron))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(job) = jobs.remove(&id) {
                scheduler.remove(&job.job_id).await?;
                report.removed += 1;
            }
        }

        for (id, cron) in desired {
            if jobs.contains_key(&id) {
                continue;
            }
            match self.workflow_job(id, &cron) {
                Ok(job) => {
                    let job_id = scheduler.add(job).await?;
                    jobs.insert(id, ScheduledJob { job_id, cron });
                    report.added += 1;
                }
                Err(e) => {
                    warn!("Skipping schedule: {}", e);
                    report.skipped.push(id);
                }
            }
        }

        if report.added > 0 || report.removed > 0 {
            info!(
                "Schedules reconciled: {} added, {} removed, {} active",
                report.added,
                report.removed,
                jobs.len()
            );
        }
        Ok(report)
    }

    fn workflow_job(&self, workflow_id: Uuid, cron: &str) -> JobResult<Job> {
        let expression = to_scheduler_expression(cron);
        let engine = self.engine.clone();

        Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                match engine
                    .trigger_workflow(workflow_id, TriggerSource::Scheduled)
                    .await
                {
                    Ok(run) => info!(
                        "Scheduled run {} of workflow {} finished: {:?}",
                        run.id, workflow_id, run.status
                    ),
                    Err(EngineError::RateLimited {
                        retry_after_secs, ..
                    }) => warn!(
                        "Scheduled run of workflow {} skipped, rate limited for {}s",
                        workflow_id, retry_after_secs
                    ),
                    // Deleted since the last reconcile; the next pass drops the job
                    Err(EngineError::WorkflowNotFound(_)) => {}
                }
            })
        })
        .map_err(|_| JobError::InvalidSchedule {
            workflow_id,
            cron: cron.to_string(),
        })
    }

    #[cfg(test)]
    async fn active(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

pub struct WorkflowScheduler {
    scheduler: TokioScheduler,
    registry: ScheduleRegistry,
    config: SchedulerConfig,
}

impl WorkflowScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, config: SchedulerConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            registry: ScheduleRegistry {
                engine,
                jobs: Arc::new(Mutex::new(HashMap::new())),
            },
            config,
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting workflow scheduler");

        self.reconcile().await?;
        self.schedule_reconcile().await?;
        self.schedule_housekeeping().await?;

        self.scheduler.start().await?;

        info!("Workflow scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down workflow scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    /// Bring registered cron jobs in line with the engine's scheduled workflows
    pub async fn reconcile(&self) -> JobResult<ReconcileReport> {
        self.registry.reconcile(&self.scheduler).await
    }

    /// Number of workflows with a registered cron job
    #[cfg(test)]
    pub async fn active_schedules(&self) -> usize {
        self.registry.active().await
    }

    async fn schedule_reconcile(&self) -> JobResult<()> {
        let registry = self.registry.clone();

        let job = Job::new_repeated_async(self.config.reconcile_interval, move |_uuid, lock| {
            let registry = registry.clone();
            Box::pin(async move {
                if let Err(e) = registry.reconcile(&lock).await {
                    error!("Schedule reconcile failed: {}", e);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }

    async fn schedule_housekeeping(&self) -> JobResult<()> {
        let engine = self.registry.engine.clone();

        let job = Job::new_repeated_async(self.config.housekeeping_interval, move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                let pruned = engine.rate_limiter().cleanup();
                if pruned > 0 {
                    info!("Pruned {} expired rate-limit windows", pruned);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }
}
