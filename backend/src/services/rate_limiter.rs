use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_WINDOW_SECS: i64 = 60;
pub const DEFAULT_MAX_RUNS_PER_WINDOW: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    #[cfg(test)]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window execution limiter, one window per workflow
pub struct WorkflowRateLimiter {
    windows: RwLock<HashMap<Uuid, Window>>,
    window: Duration,
    max_per_window: u32,
}

impl WorkflowRateLimiter {
    pub fn new(window_secs: i64, max_per_window: u32) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window: Duration::seconds(window_secs.max(1)),
            max_per_window: max_per_window.max(1),
        }
    }

    pub fn check(&self, workflow_id: Uuid) -> RateLimitDecision {
        self.check_at(workflow_id, Utc::now())
    }

    /// Count one execution attempt at `now`
    pub fn check_at(&self, workflow_id: Uuid, now: DateTime<Utc>) -> RateLimitDecision {
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());

        match windows.get_mut(&workflow_id) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.max_per_window {
                    let remaining_ms = (window.reset_at - now).num_milliseconds().max(0) as u64;
                    return RateLimitDecision::Limited {
                        retry_after_secs: remaining_ms.div_ceil(1000),
                    };
                }
                window.count += 1;
                RateLimitDecision::Allowed {
                    remaining: self.max_per_window - window.count,
                }
            }
            _ => {
                windows.insert(
                    workflow_id,
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                RateLimitDecision::Allowed {
                    remaining: self.max_per_window - 1,
                }
            }
        }
    }

    /// Drop expired windows
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut windows = self.windows.write().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|_, window| now < window.reset_at);
        before - windows.len()
    }

    pub fn forget(&self, workflow_id: Uuid) {
        self.windows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&workflow_id);
    }
}

impl Default for WorkflowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_MAX_RUNS_PER_WINDOW)
    }
}
