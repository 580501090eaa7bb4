//! Transient feedback toasts
//!
//! Every toast owns its own expiry task, so dismissing or expiring one never
//! touches another's countdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(3000);

pub type ToastId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: ToastId,
    pub kind: ToastKind,
    pub message: String,
    /// Zero means the toast stays until dismissed
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct ToastState {
    toasts: Vec<Toast>,
    timers: HashMap<ToastId, JoinHandle<()>>,
}

pub struct ToastQueue {
    state: Arc<Mutex<ToastState>>,
    next_id: AtomicU64,
    default_duration: Duration,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_DURATION)
    }
}

impl ToastQueue {
    pub fn new(default_duration: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ToastState::default())),
            next_id: AtomicU64::new(1),
            default_duration,
        }
    }

    pub fn show_success(&self, message: impl Into<String>, duration: Option<Duration>) -> ToastId {
        self.show(ToastKind::Success, message.into(), duration)
    }

    pub fn show_error(&self, message: impl Into<String>, duration: Option<Duration>) -> ToastId {
        self.show(ToastKind::Error, message.into(), duration)
    }

    pub fn show_warning(&self, message: impl Into<String>, duration: Option<Duration>) -> ToastId {
        self.show(ToastKind::Warning, message.into(), duration)
    }

    pub fn show_info(&self, message: impl Into<String>, duration: Option<Duration>) -> ToastId {
        self.show(ToastKind::Info, message.into(), duration)
    }

    /// Must be called from within a tokio runtime unless the toast is sticky
    pub fn show(&self, kind: ToastKind, message: String, duration: Option<Duration>) -> ToastId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let duration = duration.unwrap_or(self.default_duration);
        debug!(id, kind = ?kind, duration_ms = duration.as_millis() as u64, "Toast shown");

        let mut state = lock(&self.state);
        state.toasts.push(Toast {
            id,
            kind,
            message,
            duration,
            created_at: Utc::now(),
        });

        if !duration.is_zero() {
            let shared = Arc::clone(&self.state);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let mut state = lock(&shared);
                state.toasts.retain(|t| t.id != id);
                state.timers.remove(&id);
            });
            state.timers.insert(id, timer);
        }
        id
    }

    /// Remove one toast and cancel only its timer. Returns false if already gone.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timers.remove(&id) {
            timer.abort();
        }
        let before = state.toasts.len();
        state.toasts.retain(|t| t.id != id);
        state.toasts.len() != before
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.toasts.clear();
    }

    /// Live toasts in insertion order
    pub fn active(&self) -> Vec<Toast> {
        lock(&self.state).toasts.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ToastQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

fn lock(state: &Mutex<ToastState>) -> MutexGuard<'_, ToastState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn ids(queue: &ToastQueue) -> Vec<ToastId> {
        queue.active().iter().map(|t| t.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_expiry() {
        let queue = ToastQueue::default();
        let short = queue.show_success("Saved", Some(Duration::from_millis(1000)));
        let long = queue.show_info("Sync scheduled", Some(Duration::from_millis(5000)));
        assert_eq!(ids(&queue), vec![short, long]);

        sleep(Duration::from_millis(1200)).await;
        assert_eq!(ids(&queue), vec![long]);

        sleep(Duration::from_millis(4000)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_does_not_affect_other_timers() {
        let queue = ToastQueue::default();
        let first = queue.show_warning("Low stock", Some(Duration::from_millis(2000)));
        let second = queue.show_error("Save failed", Some(Duration::from_millis(2000)));

        assert!(queue.dismiss(first));
        assert!(!queue.dismiss(first));
        assert_eq!(ids(&queue), vec![second]);

        sleep(Duration::from_millis(1999)).await;
        assert_eq!(ids(&queue), vec![second]);
        sleep(Duration::from_millis(2)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_is_sticky() {
        let queue = ToastQueue::default();
        let sticky = queue.show_error("Backend unreachable", Some(Duration::ZERO));
        let _default = queue.show_info("Hello", None);

        sleep(DEFAULT_TOAST_DURATION + Duration::from_millis(10)).await;
        assert_eq!(ids(&queue), vec![sticky]);
        assert!(queue.dismiss(sticky));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_ordered() {
        let queue = ToastQueue::default();
        let a = queue.show_info("a", None);
        let b = queue.show_info("b", None);
        let c = queue.show_info("c", None);
        assert!(a < b && b < c);
        assert_eq!(queue.active()[1].message, "b");
        queue.clear();
        assert!(queue.is_empty());
    }
}
