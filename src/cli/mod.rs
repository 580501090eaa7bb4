//! CLI command handling

pub mod context;
pub mod notifications;
pub mod output;
pub mod sync;
pub mod trigger;
pub mod webhook;

pub use context::*;
pub use notifications::*;
pub use output::*;
pub use sync::*;
pub use trigger::*;
pub use webhook::*;
