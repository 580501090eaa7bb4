//! Notification classifier - (type, context) -> draft
//!
//! Priority comes from the fixed per-type table in [`NotificationType::config`]
//! and is raised when the context carries an explicit severity signal:
//! - `severity: "critical"` -> CRITICAL
//! - `severity: "warning"` / `"high"` -> at least HIGH
//! - temperature alerts with `|currentTemp - targetTemp| > threshold` -> CRITICAL
//!
//! When required context fields are missing the classifier fails closed and
//! returns a generic LOW draft instead of dropping the event.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::types::{NotificationDraft, NotificationType, Priority};
use crate::error::ConfigError;

/// Type-specific part of a draft
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub source: &'static str,
}

/// Returns `None` when the context lacks required fields
pub type ClassifierFn = fn(&Value) -> Option<Classified>;

/// Classify with the built-in table. Deterministic for identical inputs.
pub fn classify(notification_type: NotificationType, context: &Value) -> NotificationDraft {
    compose(notification_type, builtin_classifier(notification_type)(context), context)
}

/// Finish a draft: priority from the table plus elevation, tenant and data from context
pub fn compose(notification_type: NotificationType, classified: Option<Classified>, context: &Value) -> NotificationDraft {
    let config = notification_type.config();
    let tenant_id = text(context, "tenantId").unwrap_or_default();

    match classified {
        Some(c) => NotificationDraft {
            notification_type,
            title: c.title,
            message: c.message,
            data: context.clone(),
            action_url: c.action_url,
            tenant_id,
            source: c.source.to_string(),
            priority: elevate(notification_type, config.priority, context),
            action_required: config.action_required,
        },
        None => {
            debug!(notification_type = %notification_type, "Incomplete context, emitting generic notification");
            NotificationDraft {
                notification_type,
                title: notification_type.label().to_string(),
                message: format!("{} (details unavailable)", notification_type.label()),
                data: context.clone(),
                action_url: None,
                tenant_id,
                source: "notification-classifier".to_string(),
                priority: Priority::Low,
                action_required: config.action_required,
            }
        }
    }
}

fn elevate(notification_type: NotificationType, base: Priority, context: &Value) -> Priority {
    // An explicit severity wins over derived signals
    match context.get("severity").and_then(Value::as_str) {
        Some("critical") => return Priority::Critical,
        Some("warning") | Some("high") => return base.at_least(Priority::High),
        _ => {}
    }

    if notification_type == NotificationType::TemperatureAlert {
        if let (Some(current), Some(target), Some(threshold)) =
            (num(context, "currentTemp"), num(context, "targetTemp"), num(context, "threshold"))
        {
            if (current - target).abs() > threshold {
                return Priority::Critical;
            }
        }
    }

    base
}

/// Enum-keyed classifier table, validated to cover every notification type
pub struct ClassifierRegistry {
    classifiers: HashMap<NotificationType, ClassifierFn>,
}

impl ClassifierRegistry {
    /// Built-in classifiers for all types
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_entries(NotificationType::ALL.iter().map(|t| (*t, builtin_classifier(*t))))
    }

    /// Fails if any notification type has no classifier
    pub fn from_entries(entries: impl IntoIterator<Item = (NotificationType, ClassifierFn)>) -> Result<Self, ConfigError> {
        let classifiers: HashMap<_, _> = entries.into_iter().collect();
        if let Some(missing) = NotificationType::ALL.iter().find(|t| !classifiers.contains_key(t)) {
            return Err(ConfigError::MissingClassifier(*missing));
        }
        Ok(Self { classifiers })
    }

    /// Swap in a different classifier for one type
    pub fn with_override(mut self, notification_type: NotificationType, classifier: ClassifierFn) -> Self {
        self.classifiers.insert(notification_type, classifier);
        self
    }

    pub fn classify(&self, notification_type: NotificationType, context: &Value) -> NotificationDraft {
        let classifier = self
            .classifiers
            .get(&notification_type)
            .copied()
            .unwrap_or_else(|| builtin_classifier(notification_type));
        compose(notification_type, classifier(context), context)
    }
}

fn builtin_classifier(notification_type: NotificationType) -> ClassifierFn {
    match notification_type {
        NotificationType::BatchStepDue => batch_step_due,
        NotificationType::QcCheckRequired => qc_check_required,
        NotificationType::FermentationComplete => fermentation_complete,
        NotificationType::TemperatureAlert => temperature_alert,
        NotificationType::EquipmentMaintenance => equipment_maintenance,
        NotificationType::InventoryLowStock => inventory_low_stock,
        NotificationType::InventoryOutOfStock => inventory_out_of_stock,
        NotificationType::IngredientExpiring => ingredient_expiring,
        NotificationType::ReorderReminder => reorder_reminder,
        NotificationType::PaymentDue => payment_due,
        NotificationType::SubscriptionExpiring => subscription_expiring,
        NotificationType::ComplianceCheck => compliance_check,
        NotificationType::TeamInvitation => team_invitation,
        NotificationType::OrderReceived => order_received,
        NotificationType::OrderReadyToShip => order_ready_to_ship,
        NotificationType::CustomerPayment => customer_payment,
        NotificationType::SystemUpdate => system_update,
        NotificationType::IntegrationError => integration_error,
        NotificationType::BackupComplete => backup_complete,
    }
}

// ============================================================================
// Context accessors
// ============================================================================

/// Look up a dotted path, e.g. `item.name`
pub(crate) fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |v, key| v.get(key)).filter(|v| !v.is_null())
}

/// String or number rendered as text
pub(crate) fn text(context: &Value, path: &str) -> Option<String> {
    match lookup(context, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Number, also accepting numeric strings
pub(crate) fn num(context: &Value, path: &str) -> Option<f64> {
    match lookup(context, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Number formatted without a trailing `.0`
fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn url_with_id(prefix: &str, context: &Value, path: &str) -> Option<String> {
    text(context, path).map(|id| format!("{}{}", prefix, id))
}

// ============================================================================
// Built-in classifiers
// ============================================================================

fn batch_step_due(ctx: &Value) -> Option<Classified> {
    let step = text(ctx, "step.name")?;
    let batch = text(ctx, "batch.name")?;
    let action_url = match (text(ctx, "batch.id"), text(ctx, "step.id")) {
        (Some(b), Some(s)) => Some(format!("/production/batches/{}?step={}", b, s)),
        (Some(b), None) => Some(format!("/production/batches/{}", b)),
        _ => None,
    };
    Some(Classified {
        title: "Batch Step Due".to_string(),
        message: format!("{} is due for batch {}", step, batch),
        action_url,
        source: "production-system",
    })
}

fn qc_check_required(ctx: &Value) -> Option<Classified> {
    let check = text(ctx, "qcCheck.name")?;
    let batch = text(ctx, "batch.name")?;
    Some(Classified {
        title: "Quality Control Required".to_string(),
        message: format!("{} needed for batch {}", check, batch),
        action_url: text(ctx, "batch.id").map(|id| format!("/production/batches/{}/quality-control", id)),
        source: "quality-control-system",
    })
}

fn fermentation_complete(ctx: &Value) -> Option<Classified> {
    let batch = text(ctx, "batch.name")?;
    Some(Classified {
        title: "Fermentation Complete".to_string(),
        message: format!("Fermentation completed for batch {}", batch),
        action_url: url_with_id("/production/batches/", ctx, "batch.id"),
        source: "production-system",
    })
}

fn temperature_alert(ctx: &Value) -> Option<Classified> {
    let current = num(ctx, "currentTemp")?;
    let target = num(ctx, "targetTemp")?;
    let name = text(ctx, "equipment.name").unwrap_or_else(|| "Equipment".to_string());
    Some(Classified {
        title: "Temperature Alert".to_string(),
        message: format!(
            "{} temperature is {}°F (target: {}°F)",
            name,
            fmt_num(current),
            fmt_num(target)
        ),
        action_url: url_with_id("/equipment/", ctx, "equipment.id"),
        source: "equipment-monitoring",
    })
}

fn equipment_maintenance(ctx: &Value) -> Option<Classified> {
    let equipment = text(ctx, "equipment.name")?;
    let kind = text(ctx, "maintenanceType").unwrap_or_else(|| "Maintenance".to_string());
    let message = match num(ctx, "daysUntilDue") {
        Some(days) => format!("{} due for {} in {} days", kind, equipment, fmt_num(days)),
        None => text(ctx, "message").unwrap_or_else(|| format!("{} due for {}", kind, equipment)),
    };
    Some(Classified {
        title: text(ctx, "title").unwrap_or_else(|| "Maintenance Due".to_string()),
        message,
        action_url: text(ctx, "equipment.id").map(|id| format!("/equipment/{}/maintenance", id)),
        source: "maintenance-system",
    })
}

fn inventory_low_stock(ctx: &Value) -> Option<Classified> {
    let item = text(ctx, "item.name")?;
    let stock = num(ctx, "currentStock")?;
    let unit = text(ctx, "item.unit").map(|u| format!(" {}", u)).unwrap_or_default();
    Some(Classified {
        title: text(ctx, "title").unwrap_or_else(|| "Low Stock Alert".to_string()),
        message: format!("{} is running low ({}{} remaining)", item, fmt_num(stock), unit),
        action_url: url_with_id("/inventory/materials?item=", ctx, "item.id"),
        source: "inventory-system",
    })
}

fn inventory_out_of_stock(ctx: &Value) -> Option<Classified> {
    let item = text(ctx, "item.name")?;
    Some(Classified {
        title: "Out of Stock".to_string(),
        message: format!("{} is completely out of stock", item),
        action_url: url_with_id("/inventory/materials?item=", ctx, "item.id"),
        source: "inventory-system",
    })
}

fn ingredient_expiring(ctx: &Value) -> Option<Classified> {
    let ingredient = text(ctx, "ingredient.name")?;
    let days = num(ctx, "daysUntilExpiry")?;
    Some(Classified {
        title: "Ingredient Expiring Soon".to_string(),
        message: format!("{} expires in {} day(s)", ingredient, fmt_num(days)),
        action_url: url_with_id("/inventory/materials?ingredient=", ctx, "ingredient.id"),
        source: "inventory-system",
    })
}

fn reorder_reminder(ctx: &Value) -> Option<Classified> {
    let item = text(ctx, "item.name")?;
    Some(Classified {
        title: "Reorder Reminder".to_string(),
        message: format!("Time to reorder {}", item),
        action_url: url_with_id("/inventory/materials?item=", ctx, "item.id"),
        source: "inventory-system",
    })
}

fn payment_due(ctx: &Value) -> Option<Classified> {
    let invoice = text(ctx, "invoice.number")?;
    let days = num(ctx, "daysOverdue")?;
    let amount = text(ctx, "invoice.amount").map(|a| format!(" (${})", a)).unwrap_or_default();
    Some(Classified {
        title: "Payment Overdue".to_string(),
        message: format!("Invoice #{} is {} days overdue{}", invoice, fmt_num(days), amount),
        action_url: url_with_id("/finance/invoices/", ctx, "invoice.id"),
        source: "billing-system",
    })
}

fn subscription_expiring(ctx: &Value) -> Option<Classified> {
    let plan = text(ctx, "subscription.planName")?;
    let days = num(ctx, "daysUntilExpiry")?;
    Some(Classified {
        title: "Subscription Expiring".to_string(),
        message: format!("Your {} subscription expires in {} days", plan, fmt_num(days)),
        action_url: Some("/settings/billing".to_string()),
        source: "subscription-system",
    })
}

fn compliance_check(ctx: &Value) -> Option<Classified> {
    let check = text(ctx, "check.name")?;
    let due = text(ctx, "check.dueDate").map(|d| format!(" by {}", d)).unwrap_or_default();
    Some(Classified {
        title: "Compliance Check".to_string(),
        message: format!("{} must be completed{}", check, due),
        action_url: url_with_id("/compliance/checks/", ctx, "check.id"),
        source: "compliance-system",
    })
}

fn team_invitation(ctx: &Value) -> Option<Classified> {
    let member = text(ctx, "member.name")?;
    Some(Classified {
        title: "Team Invitation".to_string(),
        message: format!("{} joined the team", member),
        action_url: Some("/settings/team".to_string()),
        source: "team-system",
    })
}

fn order_received(ctx: &Value) -> Option<Classified> {
    let order = text(ctx, "order.orderNumber")?;
    let customer = text(ctx, "customer.name")?;
    let total = text(ctx, "order.total").map(|t| format!(" (${})", t)).unwrap_or_default();
    Some(Classified {
        title: "New Order Received".to_string(),
        message: format!("Order #{} from {}{}", order, customer, total),
        action_url: url_with_id("/orders/", ctx, "order.id"),
        source: "sales-system",
    })
}

fn order_ready_to_ship(ctx: &Value) -> Option<Classified> {
    let order = text(ctx, "order.orderNumber")?;
    Some(Classified {
        title: "Order Ready to Ship".to_string(),
        message: format!("Order #{} is ready to ship", order),
        action_url: url_with_id("/orders/", ctx, "order.id"),
        source: "fulfillment-system",
    })
}

fn customer_payment(ctx: &Value) -> Option<Classified> {
    let customer = text(ctx, "customer.name")?;
    let amount = text(ctx, "amount")?;
    Some(Classified {
        title: "Customer Payment".to_string(),
        message: format!("Payment of ${} received from {}", amount, customer),
        action_url: url_with_id("/finance/payments/", ctx, "paymentId"),
        source: "billing-system",
    })
}

fn system_update(ctx: &Value) -> Option<Classified> {
    let version = text(ctx, "version")?;
    Some(Classified {
        title: "System Updated".to_string(),
        message: format!("Fermentum updated to version {}", version),
        action_url: Some("/system/changelog".to_string()),
        source: "system",
    })
}

fn integration_error(ctx: &Value) -> Option<Classified> {
    let integration = text(ctx, "integration.name")?;
    let error = text(ctx, "error.message").or_else(|| text(ctx, "error"))?;
    Some(Classified {
        title: text(ctx, "title").unwrap_or_else(|| "Integration Error".to_string()),
        message: format!("{} integration failed: {}", integration, error),
        action_url: url_with_id("/settings/integrations/", ctx, "integration.id"),
        source: "integration-system",
    })
}

fn backup_complete(ctx: &Value) -> Option<Classified> {
    let message = match text(ctx, "backup.size") {
        Some(size) => format!("Backup completed successfully ({})", size),
        None => "Backup completed successfully".to_string(),
    };
    Some(Classified {
        title: "Backup Complete".to_string(),
        message,
        action_url: None,
        source: "system",
    })
}
