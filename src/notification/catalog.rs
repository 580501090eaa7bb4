//! Built-in named handlers
//!
//! Each handler checks its firing condition against the event payload and
//! hands the classified draft to the sink. A condition field that is absent
//! does not suppress the notification; the classifier then fails closed.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::classifier::{classify, num, text};
use super::types::NotificationType;
use crate::event::{Event, EventType, NotificationSink};

/// Expiring ingredients within this many days
pub const EXPIRY_WINDOW_DAYS: f64 = 7.0;
/// Maintenance due within this many days
pub const MAINTENANCE_WINDOW_DAYS: f64 = 7.0;
/// Subscriptions ending within this many days
pub const SUBSCRIPTION_WINDOW_DAYS: f64 = 14.0;

/// Integration statuses that do not warrant an error notification
const HEALTHY_INTEGRATION_STATUSES: [&str; 4] = ["connected", "active", "ok", "healthy"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    InventoryLowStock,
    IngredientExpiring,
    BatchStepDue,
    QualityControlDue,
    TemperatureAlert,
    FermentationComplete,
    EquipmentMaintenance,
    OrderReceived,
    PaymentDue,
    SubscriptionExpiring,
    IntegrationError,
    SystemUpdate,
}

impl HandlerKey {
    pub const ALL: [HandlerKey; 12] = [
        HandlerKey::InventoryLowStock,
        HandlerKey::IngredientExpiring,
        HandlerKey::BatchStepDue,
        HandlerKey::QualityControlDue,
        HandlerKey::TemperatureAlert,
        HandlerKey::FermentationComplete,
        HandlerKey::EquipmentMaintenance,
        HandlerKey::OrderReceived,
        HandlerKey::PaymentDue,
        HandlerKey::SubscriptionExpiring,
        HandlerKey::IntegrationError,
        HandlerKey::SystemUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKey::InventoryLowStock => "inventory_low_stock",
            HandlerKey::IngredientExpiring => "ingredient_expiring",
            HandlerKey::BatchStepDue => "batch_step_due",
            HandlerKey::QualityControlDue => "quality_control_due",
            HandlerKey::TemperatureAlert => "temperature_alert",
            HandlerKey::FermentationComplete => "fermentation_complete",
            HandlerKey::EquipmentMaintenance => "equipment_maintenance",
            HandlerKey::OrderReceived => "order_received",
            HandlerKey::PaymentDue => "payment_due",
            HandlerKey::SubscriptionExpiring => "subscription_expiring",
            HandlerKey::IntegrationError => "integration_error",
            HandlerKey::SystemUpdate => "system_update",
        }
    }

    /// Run the handler against one event
    pub fn handle(&self, event: &Event, sink: &dyn NotificationSink) -> Result<()> {
        let ctx = event.context();
        let emit = |t: NotificationType, ctx: &Value| sink.create_notification(classify(t, ctx));

        match self {
            HandlerKey::InventoryLowStock => {
                let stock = num(&ctx, "currentStock");
                let minimum = num(&ctx, "minimumStock");
                if fires_at_most(stock, minimum) {
                    emit(NotificationType::InventoryLowStock, &ctx);
                }
                if stock == Some(0.0) {
                    emit(NotificationType::InventoryOutOfStock, &ctx);
                }
            }
            HandlerKey::IngredientExpiring => {
                if fires_at_most(num(&ctx, "daysUntilExpiry"), Some(EXPIRY_WINDOW_DAYS)) {
                    emit(NotificationType::IngredientExpiring, &ctx);
                }
            }
            HandlerKey::BatchStepDue => emit(NotificationType::BatchStepDue, &ctx),
            HandlerKey::QualityControlDue => emit(NotificationType::QcCheckRequired, &ctx),
            HandlerKey::TemperatureAlert => {
                let delta = match (num(&ctx, "currentTemp"), num(&ctx, "targetTemp")) {
                    (Some(current), Some(target)) => Some((current - target).abs()),
                    _ => None,
                };
                let fires = match (delta, num(&ctx, "threshold")) {
                    (Some(delta), Some(threshold)) => delta > threshold,
                    _ => true,
                };
                if fires {
                    emit(NotificationType::TemperatureAlert, &ctx);
                }
            }
            HandlerKey::FermentationComplete => emit(NotificationType::FermentationComplete, &ctx),
            HandlerKey::EquipmentMaintenance => {
                let mut ctx = ctx;
                let days = match num(&ctx, "daysUntilDue") {
                    Some(days) => Some(days),
                    None => match text(&ctx, "dueDate") {
                        Some(due) => Some(days_until(&due, event.timestamp)? as f64),
                        None => None,
                    },
                };
                if let (Some(days), Value::Object(map)) = (days, &mut ctx) {
                    map.insert("daysUntilDue".to_string(), Value::from(days));
                }
                if fires_at_most(days, Some(MAINTENANCE_WINDOW_DAYS)) {
                    emit(NotificationType::EquipmentMaintenance, &ctx);
                }
            }
            HandlerKey::OrderReceived => emit(NotificationType::OrderReceived, &ctx),
            HandlerKey::PaymentDue => emit(NotificationType::PaymentDue, &ctx),
            HandlerKey::SubscriptionExpiring => {
                if fires_at_most(num(&ctx, "daysUntilExpiry"), Some(SUBSCRIPTION_WINDOW_DAYS)) {
                    emit(NotificationType::SubscriptionExpiring, &ctx);
                }
            }
            HandlerKey::IntegrationError => {
                let healthy = text(&ctx, "status")
                    .map(|s| HEALTHY_INTEGRATION_STATUSES.contains(&s.to_lowercase().as_str()))
                    .unwrap_or(false);
                if !healthy {
                    emit(NotificationType::IntegrationError, &ctx);
                }
            }
            HandlerKey::SystemUpdate => emit(NotificationType::SystemUpdate, &ctx),
        }
        Ok(())
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Also accepts the camelCase names (`temperatureAlert`)
impl FromStr for HandlerKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .flat_map(|c| {
                if c.is_ascii_uppercase() {
                    vec!['_', c.to_ascii_lowercase()]
                } else {
                    vec![c]
                }
            })
            .collect();
        let normalized = normalized.trim_start_matches('_');
        HandlerKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown handler: {}", s))
    }
}

/// Event -> handler table installed for a consumer by default
pub fn default_bindings() -> Vec<(EventType, HandlerKey)> {
    vec![
        (EventType::InventoryLevelChanged, HandlerKey::InventoryLowStock),
        (EventType::ExpirationCheck, HandlerKey::IngredientExpiring),
        (EventType::BatchStepStarted, HandlerKey::BatchStepDue),
        (EventType::QcSampleDue, HandlerKey::QualityControlDue),
        (EventType::TemperatureReading, HandlerKey::TemperatureAlert),
        (EventType::FermentationEnded, HandlerKey::FermentationComplete),
        (EventType::MaintenanceDue, HandlerKey::EquipmentMaintenance),
        (EventType::OrderPlaced, HandlerKey::OrderReceived),
        (EventType::SubscriptionChanged, HandlerKey::SubscriptionExpiring),
        (EventType::IntegrationStatusChanged, HandlerKey::IntegrationError),
    ]
}

/// `value <= limit`, firing when either side is unknown
fn fires_at_most(value: Option<f64>, limit: Option<f64>) -> bool {
    match (value, limit) {
        (Some(value), Some(limit)) => value <= limit,
        _ => true,
    }
}

/// Whole days from `now` until `due` (RFC 3339 or `YYYY-MM-DD`), rounded up
fn days_until(due: &str, now: DateTime<Utc>) -> Result<i64> {
    let due = if let Ok(ts) = DateTime::parse_from_rfc3339(due) {
        ts.with_timezone(&Utc)
    } else if let Ok(date) = NaiveDate::parse_from_str(due, "%Y-%m-%d") {
        match date.and_hms_opt(0, 0, 0) {
            Some(dt) => dt.and_utc(),
            None => bail!("invalid dueDate: {}", due),
        }
    } else {
        bail!("invalid dueDate: {}", due);
    };
    let seconds = (due - now).num_seconds();
    Ok((seconds as f64 / 86_400.0).ceil() as i64)
}
