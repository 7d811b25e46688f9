// Run History - bounded, most-recent-first log of runs per workflow

use deskflow_shared::WorkflowRun;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_RUN_HISTORY_LIMIT: usize = 50;

pub struct RunHistory {
    runs: RwLock<HashMap<Uuid, VecDeque<WorkflowRun>>>,
    limit: usize,
}

impl RunHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    /// Record a new run at the front, dropping the oldest beyond the cap
    pub async fn push_front(&self, run: WorkflowRun) {
        let mut runs = self.runs.write().await;
        let entries = runs.entry(run.workflow_id).or_default();
        entries.push_front(run);
        entries.truncate(self.limit);
    }

    /// Replace a stored run in place. Returns false if it has already been
    /// evicted or its workflow deleted.
    pub async fn update(&self, run: &WorkflowRun) -> bool {
        let mut runs = self.runs.write().await;
        let Some(entries) = runs.get_mut(&run.workflow_id) else {
            return false;
        };

        match entries.iter_mut().find(|r| r.id == run.id) {
            Some(stored) => {
                *stored = run.clone();
                true
            }
            None => false,
        }
    }

    pub async fn list(&self, workflow_id: Uuid) -> Vec<WorkflowRun> {
        self.runs
            .read()
            .await
            .get(&workflow_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn remove_workflow(&self, workflow_id: Uuid) {
        self.runs.write().await.remove(&workflow_id);
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_HISTORY_LIMIT)
    }
}
