// Workflow Triggers - event matching and schedule selection
//
// Both selectors are pure reads over a workflow list; deciding *when* a
// schedule is due belongs to the scheduler job.

use chrono::{DateTime, Utc};
use deskflow_shared::{EventType, Trigger, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload for trigger events
pub type EventPayload = Map<String, Value>;

/// An event raised by the agent runtime that may start workflows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub payload: Option<EventPayload>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(event_type: EventType, payload: Option<EventPayload>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Create a cost threshold event
    #[cfg(test)]
    pub fn cost_threshold(period: &str, spent_usd: f64, threshold_usd: f64) -> Self {
        Self::new(
            EventType::CostThreshold,
            object(serde_json::json!({
                "period": period,
                "spent": spent_usd,
                "threshold": threshold_usd,
            })),
        )
    }

    #[cfg(test)]
    pub fn agent_complete(agent_id: &str, agent_type: &str) -> Self {
        Self::new(
            EventType::AgentComplete,
            object(serde_json::json!({
                "agentId": agent_id,
                "agentType": agent_type,
            })),
        )
    }
}

#[cfg(test)]
fn object(value: Value) -> Option<EventPayload> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Every filter key must be present in the event data with an equal value
pub fn filter_matches(filter: &EventPayload, data: &EventPayload) -> bool {
    filter
        .iter()
        .all(|(key, expected)| data.get(key).is_some_and(|actual| actual == expected))
}

/// Enabled workflows listening for `event_type` whose filter accepts `data`.
///
/// A filter only applies when the event carries data; a filtered workflow
/// still matches a data-less event of its type.
pub fn match_event_trigger<'a>(
    workflows: impl IntoIterator<Item = &'a Workflow>,
    event_type: EventType,
    data: Option<&EventPayload>,
) -> Vec<Workflow> {
    workflows
        .into_iter()
        .filter(|workflow| workflow.enabled)
        .filter(|workflow| match &workflow.trigger {
            Trigger::Event {
                event_type: wanted,
                filter,
            } => {
                if *wanted != event_type {
                    return false;
                }
                match (filter, data) {
                    (Some(filter), Some(data)) => filter_matches(filter, data),
                    _ => true,
                }
            }
            _ => false,
        })
        .cloned()
        .collect()
}

/// Enabled workflows on a recurring schedule
pub fn scheduled_workflows<'a>(workflows: impl IntoIterator<Item = &'a Workflow>) -> Vec<Workflow> {
    workflows
        .into_iter()
        .filter(|workflow| workflow.enabled && matches!(workflow.trigger, Trigger::Schedule { .. }))
        .cloned()
        .collect()
}
