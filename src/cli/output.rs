//! Output formatting for CLI commands

use serde::Serialize;
use serde_json::{json, Value};

use crate::notification::{Notification, NotificationCounts};
use crate::webhook::WebhookOutcome;

/// Pretty JSON, falling back to `{}` if serialization fails
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Machine-readable view of a webhook outcome
pub fn outcome_json(outcome: &WebhookOutcome) -> Value {
    match outcome {
        WebhookOutcome::Dropped { reason } => json!({"outcome": "dropped", "reason": reason.to_string()}),
        WebhookOutcome::NoAction => json!({"outcome": "no_action"}),
        WebhookOutcome::Notification(draft) => json!({"outcome": "notification", "draft": draft}),
        WebhookOutcome::Event(event) => json!({"outcome": "event", "event": event}),
    }
}

pub fn format_outcome(outcome: &WebhookOutcome) -> String {
    match outcome {
        WebhookOutcome::Dropped { reason } => format!("Dropped: {}", reason),
        WebhookOutcome::NoAction => "No action".to_string(),
        WebhookOutcome::Notification(draft) => format!(
            "Notification [{}] {}: {}",
            draft.priority, draft.title, draft.message
        ),
        WebhookOutcome::Event(event) => format!("Event {} from {}", event.event_type, event.source_component_id),
    }
}

/// One line per notification: marker, priority, id, title, message
pub fn format_notification_line(n: &Notification) -> String {
    let marker = if n.read { " " } else { "*" };
    format!(
        "{} {:<8} {:<12} {} - {}",
        marker,
        n.priority.as_str(),
        n.id,
        n.title,
        n.message
    )
}

pub fn format_counts(counts: &NotificationCounts) -> String {
    format!(
        "total: {}  unread: {}  action required: {}  critical: {}  high: {}",
        counts.total, counts.unread, counts.action_required, counts.critical, counts.high
    )
}
