//! Fermentum Notify - brewery notification pipeline and integration sync monitoring

pub mod api;
pub mod center;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod notification;
pub mod sync_monitor;
pub mod toast;
pub mod webhook;

pub use api::{ApiClient, ApiConfig};
pub use center::{NotificationCenter, PendingNotifications};
pub use config::AppConfig;
pub use error::{BackendError, ConfigError, MalformedPayload, StoreError};
pub use event::{ConsumerScope, DispatchReport, DraftCollector, Event, EventBus, EventType, NotificationSink};
pub use notification::{
    classify, ClassifierRegistry, HandlerKey, Notification, NotificationBackend, NotificationCounts, NotificationDraft,
    NotificationFilter, NotificationStore, NotificationType, Priority,
};
pub use sync_monitor::{LogLevel, MonitorState, SyncJobMonitor, SyncLogEntry, SyncRecord, SyncStatus, SyncStatusSource};
pub use toast::{Toast, ToastKind, ToastQueue};
pub use webhook::{DeviceReading, NormalizerConfig, WebhookNormalizer, WebhookOutcome, WebhookPayload};
