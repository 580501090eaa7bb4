//! Client-side mirror of backend-persisted notifications
//!
//! The backend is the source of truth. The store keeps the last fetched list
//! plus optimistic local edits, and derives counts from it on demand.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Notification, NotificationCounts, NotificationDraft, NotificationFilter};
use crate::error::{BackendError, StoreError};

/// Persistence operations the store relies on
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Every notification of the current tenant, newest first
    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError>;
    /// Persist a draft and return the stored record
    async fn create_notification(&self, draft: &NotificationDraft) -> Result<Notification, BackendError>;
    async fn mark_read(&self, id: &str) -> Result<(), BackendError>;
    async fn mark_all_read(&self) -> Result<(), BackendError>;
    async fn clear_all(&self) -> Result<(), BackendError>;
}

type RefreshFuture = Shared<BoxFuture<'static, Result<usize, Arc<BackendError>>>>;

#[derive(Default)]
struct StoreState {
    notifications: Vec<Notification>,
    /// Bumped by every refresh start and by `clear_all`
    generation: u64,
    in_flight: Option<(u64, RefreshFuture)>,
}

pub struct NotificationStore {
    backend: Arc<dyn NotificationBackend>,
    state: Arc<Mutex<StoreState>>,
}

impl NotificationStore {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    /// Replace the cache with the backend list.
    ///
    /// Concurrent callers share the request already in flight. Returns the
    /// number of cached notifications once it settles.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let pending = {
            let mut state = lock(&self.state);
            match &state.in_flight {
                Some((_, pending)) => pending.clone(),
                None => self.start_refresh(&mut state),
            }
        };
        pending.await.map_err(|e| StoreError::Refresh(e.to_string()))
    }

    /// Start a new request even if one is in flight; the older result is discarded
    pub async fn force_refresh(&self) -> Result<usize, StoreError> {
        let pending = {
            let mut state = lock(&self.state);
            self.start_refresh(&mut state)
        };
        pending.await.map_err(|e| StoreError::Refresh(e.to_string()))
    }

    fn start_refresh(&self, state: &mut StoreState) -> RefreshFuture {
        state.generation += 1;
        let generation = state.generation;
        let backend = Arc::clone(&self.backend);
        let shared_state = Arc::clone(&self.state);

        let pending = async move {
            let result = backend.list_notifications().await;

            let mut state = lock(&shared_state);
            if matches!(state.in_flight, Some((g, _)) if g == generation) {
                state.in_flight = None;
            }
            match result {
                Ok(notifications) => {
                    if state.generation == generation {
                        debug!(count = notifications.len(), "Notifications refreshed");
                        state.notifications = notifications;
                    } else {
                        debug!(generation, current = state.generation, "Discarding stale refresh result");
                    }
                    Ok(state.notifications.len())
                }
                Err(e) => {
                    warn!(error = %e, "Failed to refresh notifications");
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some((generation, pending.clone()));
        pending
    }

    /// Optimistically prepend, then persist. Rolls back if the backend rejects it.
    pub async fn create_notification(&self, draft: NotificationDraft) -> Result<Notification, StoreError> {
        let provisional_id = format!("pending-{}", Uuid::new_v4());
        let provisional = draft.clone().into_notification(provisional_id.clone(), Utc::now());
        lock(&self.state).notifications.insert(0, provisional);

        match self.backend.create_notification(&draft).await {
            Ok(persisted) => {
                let mut state = lock(&self.state);
                if let Some(slot) = state.notifications.iter_mut().find(|n| n.id == provisional_id) {
                    *slot = persisted.clone();
                } else if !state.notifications.iter().any(|n| n.id == persisted.id) {
                    // A refresh replaced the cache while the create was in flight
                    state.notifications.insert(0, persisted.clone());
                }
                info!(
                    id = %persisted.id,
                    notification_type = %persisted.notification_type,
                    priority = %persisted.priority,
                    "Notification created"
                );
                Ok(persisted)
            }
            Err(e) => {
                lock(&self.state).notifications.retain(|n| n.id != provisional_id);
                warn!(notification_type = %draft.notification_type, error = %e, "Notification rolled back");
                Err(e.into())
            }
        }
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        if !lock(&self.state).notifications.iter().any(|n| n.id == id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.backend.mark_read(id).await?;
        if let Some(n) = lock(&self.state).notifications.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), StoreError> {
        self.backend.mark_all_read().await?;
        for n in lock(&self.state).notifications.iter_mut() {
            n.read = true;
        }
        Ok(())
    }

    /// Delete everything server-side, then empty the cache
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.backend.clear_all().await?;
        let mut state = lock(&self.state);
        state.generation += 1;
        state.in_flight = None;
        state.notifications.clear();
        info!("Notifications cleared");
        Ok(())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).notifications.clone()
    }

    pub fn filter(&self, filter: &NotificationFilter) -> Vec<Notification> {
        lock(&self.state)
            .notifications
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect()
    }

    pub fn get_notification_counts(&self) -> NotificationCounts {
        NotificationCounts::from_notifications(&lock(&self.state).notifications)
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
