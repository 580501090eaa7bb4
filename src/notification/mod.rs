//! Notifications - classification, named handlers and the client-side store
//!
//! # Flow
//! 1. A handler from [`catalog`] checks its firing condition
//! 2. [`classifier::classify`] turns (type, context) into a [`NotificationDraft`]
//! 3. [`NotificationStore`] persists the draft through a [`NotificationBackend`]
//!    and keeps the mirrored collection from which counts are derived
//!
//! # Example
//! ```ignore
//! use fermentum_notify::notification::{classify, NotificationType};
//!
//! let draft = classify(NotificationType::TemperatureAlert, &context);
//! store.create_notification(draft).await?;
//! ```

pub mod catalog;
pub mod classifier;
pub mod store;
pub mod types;

pub use catalog::{default_bindings, HandlerKey};
pub use classifier::{classify, ClassifierRegistry};
pub use store::{NotificationBackend, NotificationStore};
pub use types::{
    Category, Notification, NotificationCounts, NotificationDraft, NotificationFilter, NotificationType, Priority,
    TypeConfig,
};
