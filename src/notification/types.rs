//! Notification domain types
//!
//! `NotificationType` and `Priority` string forms are a stable contract with
//! the presentation layer and the backend; do not rename variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of persisted, user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Production & brewing
    BatchStepDue,
    QcCheckRequired,
    FermentationComplete,
    TemperatureAlert,
    EquipmentMaintenance,
    // Inventory
    InventoryLowStock,
    InventoryOutOfStock,
    IngredientExpiring,
    ReorderReminder,
    // Administrative
    PaymentDue,
    SubscriptionExpiring,
    ComplianceCheck,
    TeamInvitation,
    // Sales & orders
    OrderReceived,
    OrderReadyToShip,
    CustomerPayment,
    // System
    SystemUpdate,
    IntegrationError,
    BackupComplete,
}

impl NotificationType {
    pub const ALL: [NotificationType; 19] = [
        NotificationType::BatchStepDue,
        NotificationType::QcCheckRequired,
        NotificationType::FermentationComplete,
        NotificationType::TemperatureAlert,
        NotificationType::EquipmentMaintenance,
        NotificationType::InventoryLowStock,
        NotificationType::InventoryOutOfStock,
        NotificationType::IngredientExpiring,
        NotificationType::ReorderReminder,
        NotificationType::PaymentDue,
        NotificationType::SubscriptionExpiring,
        NotificationType::ComplianceCheck,
        NotificationType::TeamInvitation,
        NotificationType::OrderReceived,
        NotificationType::OrderReadyToShip,
        NotificationType::CustomerPayment,
        NotificationType::SystemUpdate,
        NotificationType::IntegrationError,
        NotificationType::BackupComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BatchStepDue => "batch_step_due",
            NotificationType::QcCheckRequired => "qc_check_required",
            NotificationType::FermentationComplete => "fermentation_complete",
            NotificationType::TemperatureAlert => "temperature_alert",
            NotificationType::EquipmentMaintenance => "equipment_maintenance",
            NotificationType::InventoryLowStock => "inventory_low_stock",
            NotificationType::InventoryOutOfStock => "inventory_out_of_stock",
            NotificationType::IngredientExpiring => "ingredient_expiring",
            NotificationType::ReorderReminder => "reorder_reminder",
            NotificationType::PaymentDue => "payment_due",
            NotificationType::SubscriptionExpiring => "subscription_expiring",
            NotificationType::ComplianceCheck => "compliance_check",
            NotificationType::TeamInvitation => "team_invitation",
            NotificationType::OrderReceived => "order_received",
            NotificationType::OrderReadyToShip => "order_ready_to_ship",
            NotificationType::CustomerPayment => "customer_payment",
            NotificationType::SystemUpdate => "system_update",
            NotificationType::IntegrationError => "integration_error",
            NotificationType::BackupComplete => "backup_complete",
        }
    }

    /// Human readable label, used as the title of fail-closed drafts
    pub fn label(&self) -> &'static str {
        match self {
            NotificationType::BatchStepDue => "Batch Step Due",
            NotificationType::QcCheckRequired => "Quality Control Required",
            NotificationType::FermentationComplete => "Fermentation Complete",
            NotificationType::TemperatureAlert => "Temperature Alert",
            NotificationType::EquipmentMaintenance => "Maintenance Due",
            NotificationType::InventoryLowStock => "Low Stock Alert",
            NotificationType::InventoryOutOfStock => "Out of Stock",
            NotificationType::IngredientExpiring => "Ingredient Expiring Soon",
            NotificationType::ReorderReminder => "Reorder Reminder",
            NotificationType::PaymentDue => "Payment Overdue",
            NotificationType::SubscriptionExpiring => "Subscription Expiring",
            NotificationType::ComplianceCheck => "Compliance Check",
            NotificationType::TeamInvitation => "Team Invitation",
            NotificationType::OrderReceived => "New Order Received",
            NotificationType::OrderReadyToShip => "Order Ready to Ship",
            NotificationType::CustomerPayment => "Customer Payment",
            NotificationType::SystemUpdate => "System Updated",
            NotificationType::IntegrationError => "Integration Error",
            NotificationType::BackupComplete => "Backup Complete",
        }
    }

    /// Fixed routing table for this type
    pub fn config(&self) -> TypeConfig {
        use Category::*;
        let (priority, category, action_required, auto_expire) = match self {
            NotificationType::BatchStepDue => (Priority::High, Production, true, false),
            NotificationType::QcCheckRequired => (Priority::High, Quality, true, false),
            NotificationType::FermentationComplete => (Priority::Medium, Production, false, true),
            // Elevated to critical by the classifier when the reading warrants it
            NotificationType::TemperatureAlert => (Priority::Medium, Equipment, true, false),
            NotificationType::EquipmentMaintenance => (Priority::Medium, Maintenance, true, false),
            NotificationType::InventoryLowStock => (Priority::Medium, Inventory, true, false),
            NotificationType::InventoryOutOfStock => (Priority::High, Inventory, true, false),
            NotificationType::IngredientExpiring => (Priority::Medium, Inventory, true, false),
            NotificationType::ReorderReminder => (Priority::Low, Inventory, false, true),
            NotificationType::PaymentDue => (Priority::High, Financial, true, false),
            NotificationType::SubscriptionExpiring => (Priority::High, Administrative, true, false),
            NotificationType::ComplianceCheck => (Priority::High, Compliance, true, false),
            NotificationType::TeamInvitation => (Priority::Low, Team, false, true),
            NotificationType::OrderReceived => (Priority::Medium, Sales, false, true),
            NotificationType::OrderReadyToShip => (Priority::Medium, Fulfillment, true, false),
            NotificationType::CustomerPayment => (Priority::Low, Financial, false, true),
            NotificationType::SystemUpdate => (Priority::Info, System, false, true),
            NotificationType::IntegrationError => (Priority::High, System, true, false),
            NotificationType::BackupComplete => (Priority::Info, System, false, true),
        };
        TypeConfig {
            priority,
            category,
            action_required,
            auto_expire,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {}", s))
    }
}

/// Priority level, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Info => "info",
        }
    }

    /// Sort weight, larger is more urgent
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Critical => 5,
            Priority::High => 4,
            Priority::Medium => 3,
            Priority::Low => 2,
            Priority::Info => 1,
        }
    }

    /// Raise to `floor` if currently below it
    pub fn at_least(self, floor: Priority) -> Priority {
        if self.weight() >= floor.weight() {
            self
        } else {
            floor
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Functional area a notification belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Production,
    Quality,
    Equipment,
    Inventory,
    Maintenance,
    Financial,
    Administrative,
    Compliance,
    Team,
    Sales,
    Fulfillment,
    System,
}

/// Static per-type settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeConfig {
    pub priority: Priority,
    pub category: Category,
    pub action_required: bool,
    pub auto_expire: bool,
}

/// A fully-formed notification that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    pub source: String,
    pub priority: Priority,
    pub action_required: bool,
}

impl NotificationDraft {
    /// Materialize with a backend- or locally-assigned id
    pub fn into_notification(self, id: impl Into<String>, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: id.into(),
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            data: self.data,
            action_url: self.action_url,
            tenant_id: self.tenant_id,
            source: self.source,
            priority: self.priority,
            read: false,
            action_required: self.action_required,
            created_at,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Persisted notification as mirrored on the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub source: String,
    pub priority: Priority,
    /// Backend calls this `isRead`
    #[serde(default, alias = "isRead")]
    pub read: bool,
    #[serde(default)]
    pub action_required: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn category(&self) -> Category {
        self.notification_type.config().category
    }
}

/// Derived counters, always recomputed from the live collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub total: usize,
    pub unread: usize,
    pub action_required: usize,
    pub critical: usize,
    pub high: usize,
}

impl NotificationCounts {
    pub fn from_notifications(notifications: &[Notification]) -> Self {
        notifications.iter().fold(
            NotificationCounts {
                total: notifications.len(),
                ..Default::default()
            },
            |mut counts, n| {
                if !n.read {
                    counts.unread += 1;
                    if n.action_required {
                        counts.action_required += 1;
                    }
                    match n.priority {
                        Priority::Critical => counts.critical += 1,
                        Priority::High => counts.high += 1,
                        _ => {}
                    }
                }
                counts
            },
        )
    }
}

/// Query over the cached collection
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub unread_only: bool,
    pub action_required: bool,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        if let Some(category) = self.category {
            if n.category() != category {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if n.priority != priority {
                return false;
            }
        }
        if self.unread_only && n.read {
            return false;
        }
        if self.action_required && !(n.action_required && !n.read) {
            return false;
        }
        true
    }
}
