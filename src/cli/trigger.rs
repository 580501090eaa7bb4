//! `trigger` command - raise a domain event through the default handlers

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use super::{build_center, format_json};
use crate::config::AppConfig;

#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Event type, e.g. temperature_reading
    pub event_type: String,
    /// Event payload as JSON
    #[arg(long, short, default_value = "{}")]
    pub payload: String,
    /// Source component id recorded on the event
    #[arg(long, default_value = "cli")]
    pub source: String,
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_trigger(args: TriggerArgs, config: &AppConfig) -> Result<()> {
    let payload: Value = serde_json::from_str(&args.payload).context("--payload is not valid JSON")?;

    let center = build_center(config)?;
    center.install_default_handlers("cli");
    let pending = center.trigger_event(&args.event_type, payload, &args.source);
    let report = pending.report;

    let mut created = Vec::new();
    let mut failed = Vec::new();
    for result in pending.settled().await {
        match result {
            Ok(n) => created.push(n),
            Err(e) => failed.push(e.to_string()),
        }
    }

    if args.json {
        println!(
            "{}",
            format_json(&serde_json::json!({
                "invoked": report.invoked,
                "handlerFailures": report.failed,
                "created": created,
                "errors": failed,
            }))
        );
    } else {
        println!(
            "{} handler(s) invoked, {} failed, {} notification(s) created",
            report.invoked,
            report.failed,
            created.len()
        );
        for n in &created {
            println!("  [{}] {} ({})", n.priority, n.title, n.id);
        }
        for e in &failed {
            println!("  error: {}", e);
        }
    }
    Ok(())
}
