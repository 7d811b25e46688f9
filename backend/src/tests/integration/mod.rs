mod api_notifications;
mod api_workflows;
