// End-to-end notification flow: bus -> handler -> classifier -> store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use fermentum_notify::{
    AppConfig, BackendError, DraftCollector, Event, EventBus, EventType, HandlerKey, Notification,
    NotificationBackend, NotificationCenter, NotificationDraft, NotificationStore, NotificationType, Priority,
    ToastQueue, WebhookOutcome,
};

#[derive(Default)]
struct MemoryBackend {
    stored: Mutex<Vec<Notification>>,
    list_calls: Mutex<usize>,
    fail_creates: bool,
}

#[async_trait]
impl NotificationBackend for MemoryBackend {
    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError> {
        *self.list_calls.lock().unwrap() += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn create_notification(&self, draft: &NotificationDraft) -> Result<Notification, BackendError> {
        if self.fail_creates {
            return Err(BackendError::Status {
                status: 500,
                body: "database unavailable".to_string(),
            });
        }
        let mut stored = self.stored.lock().unwrap();
        let n = draft
            .clone()
            .into_notification(format!("srv-{}", stored.len() + 1), chrono::Utc::now());
        stored.insert(0, n.clone());
        Ok(n)
    }

    async fn mark_read(&self, id: &str) -> Result<(), BackendError> {
        let mut stored = self.stored.lock().unwrap();
        for n in stored.iter_mut().filter(|n| n.id == id) {
            n.read = true;
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), BackendError> {
        for n in self.stored.lock().unwrap().iter_mut() {
            n.read = true;
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), BackendError> {
        self.stored.lock().unwrap().clear();
        Ok(())
    }
}

fn tenant_config() -> AppConfig {
    AppConfig {
        tenant_id: Some("brewery-42".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_temperature_reading_produces_one_critical_notification() {
    let bus = EventBus::new();
    bus.register_handler("consumer-a", EventType::TemperatureReading, HandlerKey::TemperatureAlert);

    let collector = DraftCollector::new();
    let event = Event::new(
        EventType::TemperatureReading,
        json!({"currentTemp": 78, "targetTemp": 68, "threshold": 5}),
    );
    let report = bus.trigger_event(&event, &collector);
    assert_eq!(report.invoked, 1);
    assert_eq!(report.failed, 0);

    let drafts = collector.into_drafts();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].notification_type, NotificationType::TemperatureAlert);
    assert_eq!(drafts[0].priority, Priority::Critical);
    assert!(drafts[0].message.contains("78"));
}

#[test]
fn test_consumers_are_isolated_on_cleanup() {
    let bus = EventBus::new();
    bus.register_handler("dashboard", EventType::InventoryLevelChanged, HandlerKey::InventoryLowStock);
    bus.register_handler("inventory-page", EventType::InventoryLevelChanged, HandlerKey::InventoryLowStock);

    bus.cleanup("dashboard");

    let collector = DraftCollector::new();
    let event = Event::new(
        EventType::InventoryLevelChanged,
        json!({"itemName": "Cascade Hops", "currentStock": 2, "minimumStock": 10, "unit": "lb"}),
    );
    assert_eq!(bus.trigger_event(&event, &collector).invoked, 1);
    assert_eq!(collector.len(), 1);
}

#[tokio::test]
async fn test_center_persists_with_tenant_and_counts() {
    let backend = Arc::new(MemoryBackend::default());
    let center = NotificationCenter::new(tenant_config(), backend.clone()).unwrap();
    center.install_default_handlers("dashboard");

    let pending = center.trigger_event(
        "temperature_reading",
        json!({"currentTemp": 78, "targetTemp": 68, "threshold": 5, "equipmentName": "FV-3"}),
        "fermenter-dashboard",
    );
    let results = pending.settled().await;
    assert_eq!(results.len(), 1);
    let created = results.into_iter().next().unwrap().unwrap();
    assert_eq!(created.id, "srv-1");
    assert_eq!(created.tenant_id, "brewery-42");

    let counts = center.counts();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.unread, 1);
    assert_eq!(counts.critical, 1);

    center.mark_read("srv-1").await.unwrap();
    assert_eq!(center.counts().unread, 0);
}

#[tokio::test]
async fn test_temperature_webhook_is_persisted() {
    let backend = Arc::new(MemoryBackend::default());
    let center = NotificationCenter::new(tenant_config(), backend.clone()).unwrap();

    let (outcome, pending) = center.process_webhook_json(&json!({
        "deviceType": "temperature_sensor",
        "rawPayload": {"temperature": 74},
        "deviceMeta": {"deviceId": "probe-1", "name": "FV-1", "thresholds": {"min": 60, "max": 70, "target": 65}}
    }));
    assert!(matches!(outcome, WebhookOutcome::Notification(_)));
    assert_eq!(pending.len(), 1);

    pending.settled().await;
    let stored = backend.stored.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].notification_type, NotificationType::TemperatureAlert);
    assert!(stored[0].message.contains("74"));
}

#[tokio::test]
async fn test_unknown_device_is_dropped_without_persisting() {
    let backend = Arc::new(MemoryBackend::default());
    let center = NotificationCenter::new(tenant_config(), backend.clone()).unwrap();

    let (outcome, pending) = center.process_webhook_json(&json!({
        "deviceType": "flux_capacitor",
        "rawPayload": {},
        "deviceMeta": {"deviceId": "x"}
    }));
    assert!(matches!(outcome, WebhookOutcome::Dropped { .. }));
    assert!(pending.is_empty());
    assert!(backend.stored.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_submit_raises_error_toast() {
    let backend = Arc::new(MemoryBackend {
        fail_creates: true,
        ..Default::default()
    });
    let center = NotificationCenter::new(tenant_config(), backend).unwrap();

    let result = center
        .notify(NotificationType::SystemUpdate, &json!({"version": "2.0"}))
        .await;
    assert!(result.is_err());
    assert!(center.store().notifications().is_empty());

    let toasts = center.toasts().active();
    assert_eq!(toasts.len(), 1);
    assert!(toasts[0].message.starts_with("Failed to create notification"));
}

#[tokio::test]
async fn test_concurrent_refresh_issues_one_call() {
    let backend = Arc::new(MemoryBackend::default());
    let store = NotificationStore::new(backend.clone());

    let (a, b) = tokio::join!(store.refresh(), store.refresh());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(*backend.list_calls.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toasts_expire_independently() {
    let toasts = ToastQueue::default();
    toasts.show_info("Batch saved", Some(Duration::from_millis(1000)));
    toasts.show_warning("Sync delayed", Some(Duration::from_millis(5000)));

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let active = toasts.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].message, "Sync delayed");
}
