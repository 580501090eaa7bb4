//! Event bus - per-consumer handler registration and synchronous dispatch
//!
//! The bus is an ordinary value owned by the application context and passed
//! to whoever needs it; there is no process-wide registry, so tests can run
//! independent buses side by side.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Event, EventType, NotificationSink};
use crate::notification::catalog::HandlerKey;

/// Handler signature: receives the event and a sink for notification drafts
pub type HandlerFn = dyn Fn(&Event, &dyn NotificationSink) -> Result<()> + Send + Sync;

/// How a handler was bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Built-in handler from the catalog
    Named(HandlerKey),
    /// Ad-hoc closure supplied by the consumer
    Custom,
}

impl HandlerKind {
    fn same_class(&self, other: &HandlerKind) -> bool {
        matches!(
            (self, other),
            (HandlerKind::Named(_), HandlerKind::Named(_)) | (HandlerKind::Custom, HandlerKind::Custom)
        )
    }
}

struct Registration {
    consumer_id: String,
    event_type: EventType,
    kind: HandlerKind,
    handler: Arc<HandlerFn>,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that were called
    pub invoked: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Typed pub/sub with per-consumer lifecycle
#[derive(Default)]
pub struct EventBus {
    /// Kept in registration order; dispatch walks it front to back
    registrations: RwLock<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a built-in catalog handler
    pub fn register_handler(&self, consumer_id: &str, event_type: EventType, key: HandlerKey) {
        let handler: Arc<HandlerFn> =
            Arc::new(move |event: &Event, sink: &dyn NotificationSink| key.handle(event, sink));
        self.insert(consumer_id, event_type, HandlerKind::Named(key), handler);
    }

    /// Bind an ad-hoc handler
    pub fn register_custom_handler<F>(&self, consumer_id: &str, event_type: EventType, handler: F)
    where
        F: Fn(&Event, &dyn NotificationSink) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(consumer_id, event_type, HandlerKind::Custom, Arc::new(handler));
    }

    fn insert(&self, consumer_id: &str, event_type: EventType, kind: HandlerKind, handler: Arc<HandlerFn>) {
        let mut registrations = match self.registrations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let existing = registrations.iter_mut().find(|r| {
            r.consumer_id == consumer_id && r.event_type == event_type && r.kind.same_class(&kind)
        });

        match existing {
            Some(slot) => {
                slot.kind = kind;
                slot.handler = handler;
                debug!(consumer = %consumer_id, event_type = %event_type, ?kind, "Replaced event handler");
            }
            None => {
                registrations.push(Registration {
                    consumer_id: consumer_id.to_string(),
                    event_type,
                    kind,
                    handler,
                });
                info!(consumer = %consumer_id, event_type = %event_type, ?kind, "Registered event handler");
            }
        }
    }

    /// Remove a consumer's handlers for one event type
    pub fn unregister_handler(&self, consumer_id: &str, event_type: EventType) -> usize {
        self.remove_where(|r| r.consumer_id == consumer_id && r.event_type == event_type)
    }

    /// Remove every registration owned by `consumer_id`. Safe to call repeatedly.
    pub fn cleanup(&self, consumer_id: &str) -> usize {
        let removed = self.remove_where(|r| r.consumer_id == consumer_id);
        if removed > 0 {
            info!(consumer = %consumer_id, removed, "Cleaned up event handlers");
        }
        removed
    }

    fn remove_where(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        let mut registrations = match self.registrations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = registrations.len();
        registrations.retain(|r| !predicate(r));
        before - registrations.len()
    }

    /// Invoke every handler bound to `event.event_type`, in registration order.
    ///
    /// A failing handler is logged and skipped; the others still run.
    pub fn trigger_event(&self, event: &Event, sink: &dyn NotificationSink) -> DispatchReport {
        // Snapshot so handlers may register or clean up without deadlocking
        let targets: Vec<(String, Arc<HandlerFn>)> = {
            let registrations = match self.registrations.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            registrations
                .iter()
                .filter(|r| r.event_type == event.event_type)
                .map(|r| (r.consumer_id.clone(), Arc::clone(&r.handler)))
                .collect()
        };

        let mut report = DispatchReport::default();
        for (consumer_id, handler) in targets {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(event, sink))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(consumer = %consumer_id, event_type = %event.event_type, error = %e, "Event handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(consumer = %consumer_id, event_type = %event.event_type, "Event handler panicked");
                }
            }
        }

        debug!(event_type = %event.event_type, invoked = report.invoked, failed = report.failed, "Event dispatched");
        report
    }

    /// String entry point. Unknown event types reach zero handlers.
    pub fn trigger_named(&self, event_type: &str, payload: Value, sink: &dyn NotificationSink) -> DispatchReport {
        match event_type.parse::<EventType>() {
            Ok(t) => self.trigger_event(&Event::new(t, payload), sink),
            Err(_) => {
                debug!(event_type = %event_type, "Ignoring unknown event type");
                DispatchReport::default()
            }
        }
    }

    /// Number of handlers bound to an event type
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.registrations
            .read()
            .map(|r| r.iter().filter(|r| r.event_type == event_type).count())
            .unwrap_or(0)
    }

    /// Registrations owned by one consumer, in order
    pub fn registrations_for(&self, consumer_id: &str) -> Vec<(EventType, HandlerKind)> {
        self.registrations
            .read()
            .map(|r| {
                r.iter()
                    .filter(|r| r.consumer_id == consumer_id)
                    .map(|r| (r.event_type, r.kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registration guard that cleans up when dropped
    pub fn scope(&self, consumer_id: impl Into<String>) -> ConsumerScope<'_> {
        ConsumerScope {
            bus: self,
            consumer_id: consumer_id.into(),
        }
    }
}

/// Ties a consumer's registrations to a lexical lifetime
pub struct ConsumerScope<'a> {
    bus: &'a EventBus,
    consumer_id: String,
}

impl ConsumerScope<'_> {
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn register_handler(&self, event_type: EventType, key: HandlerKey) -> &Self {
        self.bus.register_handler(&self.consumer_id, event_type, key);
        self
    }

    pub fn register_custom_handler<F>(&self, event_type: EventType, handler: F) -> &Self
    where
        F: Fn(&Event, &dyn NotificationSink) -> Result<()> + Send + Sync + 'static,
    {
        self.bus.register_custom_handler(&self.consumer_id, event_type, handler);
        self
    }
}

impl Drop for ConsumerScope<'_> {
    fn drop(&mut self) {
        self.bus.cleanup(&self.consumer_id);
    }
}
