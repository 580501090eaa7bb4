//! Domain events and the in-process event bus
//!
//! Events are ephemeral: they exist only while being dispatched and are never
//! persisted. Handlers turn them into notification drafts.

pub mod bus;

pub use bus::{ConsumerScope, DispatchReport, EventBus, HandlerFn, HandlerKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::notification::NotificationDraft;

/// Closed set of events producers may raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Inventory
    InventoryLevelChanged,
    IngredientAdded,
    IngredientUsed,
    ExpirationCheck,
    // Production
    BatchCreated,
    BatchStepStarted,
    BatchStepCompleted,
    FermentationStarted,
    FermentationEnded,
    TemperatureReading,
    QcSampleDue,
    // Equipment
    EquipmentStatusChanged,
    MaintenanceDue,
    EquipmentError,
    // Business
    OrderPlaced,
    PaymentReceived,
    SubscriptionChanged,
    TeamMemberJoined,
    // System
    IntegrationStatusChanged,
    BackupCompleted,
    SystemError,
}

impl EventType {
    pub const ALL: [EventType; 21] = [
        EventType::InventoryLevelChanged,
        EventType::IngredientAdded,
        EventType::IngredientUsed,
        EventType::ExpirationCheck,
        EventType::BatchCreated,
        EventType::BatchStepStarted,
        EventType::BatchStepCompleted,
        EventType::FermentationStarted,
        EventType::FermentationEnded,
        EventType::TemperatureReading,
        EventType::QcSampleDue,
        EventType::EquipmentStatusChanged,
        EventType::MaintenanceDue,
        EventType::EquipmentError,
        EventType::OrderPlaced,
        EventType::PaymentReceived,
        EventType::SubscriptionChanged,
        EventType::TeamMemberJoined,
        EventType::IntegrationStatusChanged,
        EventType::BackupCompleted,
        EventType::SystemError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InventoryLevelChanged => "inventory_level_changed",
            EventType::IngredientAdded => "ingredient_added",
            EventType::IngredientUsed => "ingredient_used",
            EventType::ExpirationCheck => "expiration_check",
            EventType::BatchCreated => "batch_created",
            EventType::BatchStepStarted => "batch_step_started",
            EventType::BatchStepCompleted => "batch_step_completed",
            EventType::FermentationStarted => "fermentation_started",
            EventType::FermentationEnded => "fermentation_ended",
            EventType::TemperatureReading => "temperature_reading",
            EventType::QcSampleDue => "qc_sample_due",
            EventType::EquipmentStatusChanged => "equipment_status_changed",
            EventType::MaintenanceDue => "maintenance_due",
            EventType::EquipmentError => "equipment_error",
            EventType::OrderPlaced => "order_placed",
            EventType::PaymentReceived => "payment_received",
            EventType::SubscriptionChanged => "subscription_changed",
            EventType::TeamMemberJoined => "team_member_joined",
            EventType::IntegrationStatusChanged => "integration_status_changed",
            EventType::BackupCompleted => "backup_completed",
            EventType::SystemError => "system_error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `temperature_reading` as well as `TEMPERATURE_READING`
impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

/// One occurrence broadcast to registered handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Map<String, Value>,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_component_id: String,
}

impl Event {
    /// Non-object payloads are wrapped under a `value` key
    pub fn new(event_type: EventType, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let tenant_id = payload
            .get("tenantId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            event_type,
            payload,
            tenant_id,
            timestamp: Utc::now(),
            source_component_id: String::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_component_id = source.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Payload as a JSON value, with the event tenant filled in when absent
    pub fn context(&self) -> Value {
        let mut map = self.payload.clone();
        if !self.tenant_id.is_empty() && !map.contains_key("tenantId") {
            map.insert("tenantId".to_string(), Value::String(self.tenant_id.clone()));
        }
        Value::Object(map)
    }
}

/// Where handlers hand off the drafts they produce
pub trait NotificationSink {
    fn create_notification(&self, draft: NotificationDraft);
}

/// Sink that buffers drafts for the caller to persist after dispatch
#[derive(Debug, Default)]
pub struct DraftCollector {
    drafts: Mutex<Vec<NotificationDraft>>,
}

impl DraftCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.drafts.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_drafts(self) -> Vec<NotificationDraft> {
        self.drafts.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationSink for DraftCollector {
    fn create_notification(&self, draft: NotificationDraft) {
        match self.drafts.lock() {
            Ok(mut drafts) => drafts.push(draft),
            Err(poisoned) => poisoned.into_inner().push(draft),
        }
    }
}
