//! `sync-monitor` command - stream a plugin sync job's log

use anyhow::Result;
use clap::Args;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::warn;

use super::build_client;
use crate::config::AppConfig;
use crate::sync_monitor::{SyncJobMonitor, SyncLogEntry};

#[derive(Args, Debug)]
pub struct SyncMonitorArgs {
    /// Tenant plugin id whose sync history is polled
    pub tenant_plugin_id: String,
}

/// Prints log lines until the job reaches a terminal status or Ctrl-C
pub async fn handle_sync_monitor(args: SyncMonitorArgs, config: &AppConfig) -> Result<()> {
    let client = build_client(config)?;
    let monitor = SyncJobMonitor::new(client)
        .with_interval(config.sync_poll_interval())
        .with_history_limit(config.sync_history_limit);

    let mut entries = monitor.subscribe();
    monitor.start(&args.tenant_plugin_id);

    loop {
        tokio::select! {
            received = entries.recv() => match received {
                Ok(entry) => {
                    println!("{}", entry);
                    if !monitor.is_polling() {
                        drain(&mut entries);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Sync log output lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                monitor.stop();
                drain(&mut entries);
                break;
            }
        }
    }
    Ok(())
}

/// Print whatever the poller already queued, e.g. the final "stopped" line
fn drain(entries: &mut Receiver<SyncLogEntry>) {
    while let Ok(entry) = entries.try_recv() {
        println!("{}", entry);
    }
}
