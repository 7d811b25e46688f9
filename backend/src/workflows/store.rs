// Workflow Store - storage port for workflow definitions
//
// The engine only talks to `WorkflowRepository`; the in-memory map below is
// the default backing and what the tests run against.

use async_trait::async_trait;
use deskflow_shared::Workflow;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<Workflow>;

    /// Insert or replace by id
    async fn put(&self, workflow: Workflow);

    /// Returns the removed workflow, if there was one
    async fn delete(&self, id: Uuid) -> Option<Workflow>;

    /// All workflows, most recently updated first
    async fn list(&self) -> Vec<Workflow>;
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get(&self, id: Uuid) -> Option<Workflow> {
        self.workflows.read().await.get(&id).cloned()
    }

    async fn put(&self, workflow: Workflow) {
        self.workflows.write().await.insert(workflow.id, workflow);
    }

    async fn delete(&self, id: Uuid) -> Option<Workflow> {
        self.workflows.write().await.remove(&id)
    }

    async fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        workflows
    }
}
