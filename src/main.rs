//! Fermentum Notify CLI
//!
//! Device webhooks, domain events and plugin sync monitoring for a Fermentum tenant

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use fermentum_notify::cli::{
    handle_notifications, handle_sync_monitor, handle_trigger, handle_webhook, resolve_config, GlobalArgs,
    NotificationsArgs, SyncMonitorArgs, TriggerArgs, WebhookArgs,
};

#[derive(Parser)]
#[command(name = "fermentum-notify")]
#[command(about = "Fermentum Notify - brewery notifications from devices and domain events")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a device webhook payload and persist the resulting notification
    Webhook(WebhookArgs),
    /// Raise a domain event through the default notification handlers
    Trigger(TriggerArgs),
    /// List, count and acknowledge notifications
    Notifications(NotificationsArgs),
    /// Follow a plugin sync job until it finishes
    SyncMonitor(SyncMonitorArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=fermentum_notify=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fermentum_notify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli.global)?;
    debug!(tenant = ?config.tenant_id, "Starting fermentum-notify");

    match cli.command {
        Commands::Webhook(args) => handle_webhook(args, &config).await?,
        Commands::Trigger(args) => handle_trigger(args, &config).await?,
        Commands::Notifications(args) => handle_notifications(args, &config).await?,
        Commands::SyncMonitor(args) => handle_sync_monitor(args, &config).await?,
    }

    Ok(())
}
