//! Application context
//!
//! Owns the event bus, notification store, toast queue, webhook normalizer
//! and classifier registry, and wires the trigger -> classify -> persist path.
//! Dispatch is synchronous; each resulting draft is persisted in its own task.

use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{ConfigError, StoreError};
use crate::event::{DispatchReport, DraftCollector, Event, EventBus, EventType};
use crate::notification::{
    default_bindings, ClassifierRegistry, Notification, NotificationBackend, NotificationCounts, NotificationDraft,
    NotificationStore, NotificationType,
};
use crate::toast::ToastQueue;
use crate::webhook::{WebhookNormalizer, WebhookOutcome, WebhookPayload};

/// Persistence tasks started by one dispatch
#[derive(Debug, Default)]
pub struct PendingNotifications {
    pub report: DispatchReport,
    tasks: Vec<JoinHandle<Result<Notification, StoreError>>>,
}

impl PendingNotifications {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every persistence task, in dispatch order
    pub async fn settled(self) -> Vec<Result<Notification, StoreError>> {
        join_all(self.tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(StoreError::Aborted(e.to_string()))))
            .collect()
    }
}

pub struct NotificationCenter {
    config: AppConfig,
    bus: EventBus,
    store: Arc<NotificationStore>,
    toasts: ToastQueue,
    normalizer: Mutex<WebhookNormalizer>,
    classifiers: ClassifierRegistry,
}

impl NotificationCenter {
    pub fn new(config: AppConfig, backend: Arc<dyn NotificationBackend>) -> Result<Self, ConfigError> {
        config.webhook.validate()?;
        let classifiers = ClassifierRegistry::builtin()?;
        Ok(Self {
            bus: EventBus::new(),
            store: Arc::new(NotificationStore::new(backend)),
            toasts: ToastQueue::new(config.toast_duration()),
            normalizer: Mutex::new(WebhookNormalizer::new(config.webhook.clone())),
            classifiers,
            config,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Bind the default event -> handler table for a consumer
    pub fn install_default_handlers(&self, consumer_id: &str) -> usize {
        let bindings = default_bindings();
        for (event_type, key) in &bindings {
            self.bus.register_handler(consumer_id, *event_type, *key);
        }
        info!(consumer = %consumer_id, handlers = bindings.len(), "Default handlers installed");
        bindings.len()
    }

    /// String entry point. Unknown event types reach zero handlers.
    pub fn trigger_event(&self, event_type: &str, payload: Value, source: &str) -> PendingNotifications {
        match event_type.parse::<EventType>() {
            Ok(t) => self.dispatch(Event::new(t, payload).with_source(source)),
            Err(_) => {
                debug!(event_type = %event_type, "Ignoring unknown event type");
                PendingNotifications::default()
            }
        }
    }

    /// Dispatch synchronously, then persist each draft in its own task
    pub fn dispatch(&self, mut event: Event) -> PendingNotifications {
        if event.tenant_id.is_empty() {
            if let Some(tenant) = &self.config.tenant_id {
                event.tenant_id = tenant.clone();
            }
        }

        let collector = DraftCollector::new();
        let report = self.bus.trigger_event(&event, &collector);
        let tasks = collector
            .into_drafts()
            .into_iter()
            .map(|draft| self.spawn_persist(draft))
            .collect();
        PendingNotifications { report, tasks }
    }

    /// Normalize a device webhook; a draft is persisted, an event is dispatched
    pub fn process_webhook(&self, payload: &WebhookPayload) -> (WebhookOutcome, PendingNotifications) {
        let outcome = match self.normalizer.lock() {
            Ok(mut normalizer) => normalizer.process(payload),
            Err(poisoned) => poisoned.into_inner().process(payload),
        };
        let pending = self.route(&outcome);
        (outcome, pending)
    }

    /// Same as [`process_webhook`](Self::process_webhook) for an unparsed body
    pub fn process_webhook_json(&self, body: &Value) -> (WebhookOutcome, PendingNotifications) {
        let outcome = match self.normalizer.lock() {
            Ok(mut normalizer) => normalizer.process_json(body),
            Err(poisoned) => poisoned.into_inner().process_json(body),
        };
        let pending = self.route(&outcome);
        (outcome, pending)
    }

    fn route(&self, outcome: &WebhookOutcome) -> PendingNotifications {
        match outcome {
            WebhookOutcome::Notification(draft) => PendingNotifications {
                report: DispatchReport::default(),
                tasks: vec![self.spawn_persist(draft.clone())],
            },
            WebhookOutcome::Event(event) => self.dispatch(event.clone()),
            WebhookOutcome::NoAction | WebhookOutcome::Dropped { .. } => PendingNotifications::default(),
        }
    }

    fn spawn_persist(&self, draft: NotificationDraft) -> JoinHandle<Result<Notification, StoreError>> {
        let draft = self.with_default_tenant(draft);
        let store = Arc::clone(&self.store);
        // Background path: failures are logged by the store, never toasted
        tokio::spawn(async move { store.create_notification(draft).await })
    }

    fn with_default_tenant(&self, draft: NotificationDraft) -> NotificationDraft {
        match &self.config.tenant_id {
            Some(tenant) if draft.tenant_id.is_empty() => draft.with_tenant(tenant.clone()),
            _ => draft,
        }
    }

    /// Classify with the validated registry and persist. User-initiated.
    pub async fn notify(&self, notification_type: NotificationType, context: &Value) -> Result<Notification, StoreError> {
        let draft = self.classifiers.classify(notification_type, context);
        self.submit_notification(draft).await
    }

    /// User-initiated create; a failure raises an error toast
    pub async fn submit_notification(&self, draft: NotificationDraft) -> Result<Notification, StoreError> {
        let draft = self.with_default_tenant(draft);
        self.store
            .create_notification(draft)
            .await
            .map_err(|e| self.toast_error("Failed to create notification", e))
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        self.store
            .mark_read(id)
            .await
            .map_err(|e| self.toast_error("Failed to mark notification as read", e))
    }

    pub async fn mark_all_read(&self) -> Result<(), StoreError> {
        self.store
            .mark_all_read()
            .await
            .map_err(|e| self.toast_error("Failed to mark notifications as read", e))
    }

    pub async fn clear_all(&self) -> Result<(), StoreError> {
        self.store
            .clear_all()
            .await
            .map_err(|e| self.toast_error("Failed to clear notifications", e))
    }

    /// Background refresh; errors are returned but not toasted
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        self.store.refresh().await
    }

    pub fn counts(&self) -> NotificationCounts {
        self.store.get_notification_counts()
    }

    fn toast_error(&self, action: &str, error: StoreError) -> StoreError {
        self.toasts.show_error(format!("{}: {}", action, error), None);
        error
    }
}
