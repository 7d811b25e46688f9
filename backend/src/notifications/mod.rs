use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use deskflow_shared::Notification;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::workflows::actions::{ActionOutcome, NotificationSink};
use crate::AppState;

pub const DEFAULT_NOTIFICATION_LIMIT: usize = 200;

/// In-process notification center: keeps the latest notifications for the
/// UI to poll and fans them out to live subscribers.
pub struct NotificationHub {
    recent: RwLock<VecDeque<Notification>>,
    sender: broadcast::Sender<Notification>,
    limit: usize,
}

impl NotificationHub {
    pub fn new(limit: usize) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            recent: RwLock::new(VecDeque::new()),
            sender,
            limit: limit.max(1),
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub async fn recent(&self, limit: usize) -> Vec<Notification> {
        self.recent.read().await.iter().take(limit).cloned().collect()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_LIMIT)
    }
}

#[async_trait]
impl NotificationSink for NotificationHub {
    async fn deliver(&self, notification: Notification) -> ActionOutcome {
        let id = notification.id;
        {
            let mut recent = self.recent.write().await;
            recent.push_front(notification.clone());
            recent.truncate(self.limit);
        }

        // No subscribers is fine; the notification is still kept for polling
        let receivers = self.sender.send(notification).unwrap_or(0);

        Ok(serde_json::json!({
            "notificationId": id,
            "receivers": receivers,
        }))
    }
}

pub fn notification_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_notifications))
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListNotificationsQuery>,
) -> Json<NotificationListResponse> {
    let limit = query.limit.unwrap_or(50).min(DEFAULT_NOTIFICATION_LIMIT);
    Json(NotificationListResponse {
        notifications: state.notifications.recent(limit).await,
    })
}
