use chrono::Utc;
use deskflow_shared::{AuditAction, AuditLogEntry, Workflow};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 1000;

/// Process-wide audit trail for workflow operations.
///
/// Entries carry a snapshot of the workflow id and name, so they outlive the
/// workflow they describe. Append-only: there is no removal API.
pub struct AuditService {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    limit: usize,
}

/// Builder for creating audit log entries
pub struct AuditEntryBuilder {
    action: AuditAction,
    workflow_id: Uuid,
    workflow_name: String,
    details: Option<JsonValue>,
}

impl AuditEntryBuilder {
    pub fn new(action: AuditAction, workflow: &Workflow) -> Self {
        Self::for_workflow(action, workflow.id, workflow.name.clone())
    }

    pub fn for_workflow(action: AuditAction, workflow_id: Uuid, workflow_name: impl Into<String>) -> Self {
        Self {
            action,
            workflow_id,
            workflow_name: workflow_name.into(),
            details: None,
        }
    }

    pub fn details_json(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    fn build(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            workflow_id: self.workflow_id,
            workflow_name: self.workflow_name,
            action: self.action,
            details: self.details,
        }
    }
}

/// Represents changes made during an update operation
#[derive(Debug, Serialize)]
pub struct FieldChange {
    pub old: JsonValue,
    pub new: JsonValue,
}

impl FieldChange {
    pub fn new<T: Serialize>(old: &T, new: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            old: serde_json::to_value(old)?,
            new: serde_json::to_value(new)?,
        })
    }
}

/// Helper to track changes between old and new values
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: serde_json::Map<String, JsonValue>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<T: Serialize + PartialEq>(
        &mut self,
        field: &str,
        old: &T,
        new: &T,
    ) -> Result<bool, serde_json::Error> {
        if old != new {
            let change = FieldChange::new(old, new)?;
            self.changes.insert(field.to_string(), serde_json::to_value(change)?);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    #[cfg(test)]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn into_json(self) -> JsonValue {
        JsonValue::Object(self.changes)
    }
}

impl AuditService {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    /// Append an entry, evicting the oldest once the cap is reached
    pub async fn log(&self, entry: AuditEntryBuilder) -> AuditLogEntry {
        let entry = entry.build();

        tracing::info!(
            target: "audit",
            action = entry.action.as_str(),
            workflow_id = %entry.workflow_id,
            workflow_name = %entry.workflow_name,
            "workflow audit event"
        );

        let mut entries = self.entries.write().await;
        entries.push_front(entry.clone());
        entries.truncate(self.limit);

        entry
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: usize) -> Vec<AuditLogEntry> {
        self.entries.read().await.iter().take(limit).cloned().collect()
    }

    pub async fn for_workflow(&self, workflow_id: Uuid, limit: usize) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .take(limit)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for AuditService {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_LOG_LIMIT)
    }
}
