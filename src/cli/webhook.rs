//! `webhook` command - normalize a stream of device payloads
//!
//! Input is one JSON body per line (or any whitespace-separated sequence of
//! JSON values). All bodies go through the same normalizer, so per-device
//! history such as gravity streaks and tank bands carries across them.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::{info, warn};

use super::{build_center, format_json, format_outcome, outcome_json};
use crate::center::NotificationCenter;
use crate::config::AppConfig;
use crate::notification::Notification;
use crate::webhook::{WebhookNormalizer, WebhookOutcome};

#[derive(Args, Debug)]
pub struct WebhookArgs {
    /// Read payloads from a file instead of stdin
    #[arg(long, short)]
    pub file: Option<PathBuf>,
    /// Only normalize and print; do not persist or dispatch
    #[arg(long)]
    pub dry_run: bool,
    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

/// One processed body and whatever it persisted
#[derive(Debug)]
pub struct ProcessedWebhook {
    pub outcome: WebhookOutcome,
    pub persisted: Vec<Notification>,
}

fn read_input(args: &WebhookArgs) -> Result<String> {
    match &args.file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("Cannot read stdin")?;
            Ok(buf)
        }
    }
}

/// Split the input into JSON bodies, in order
pub fn parse_bodies(raw: &str) -> Result<Vec<Value>> {
    serde_json::Deserializer::from_str(raw)
        .into_iter::<Value>()
        .enumerate()
        .map(|(i, body)| body.with_context(|| format!("Webhook body #{} is not valid JSON", i + 1)))
        .collect()
}

/// Run every body through one center and wait for its notifications to persist
pub async fn process_stream(center: &NotificationCenter, bodies: &[Value]) -> Vec<ProcessedWebhook> {
    let mut processed = Vec::with_capacity(bodies.len());
    for body in bodies {
        let (outcome, pending) = center.process_webhook_json(body);
        let mut persisted = Vec::new();
        for result in pending.settled().await {
            match result {
                Ok(n) => {
                    info!(id = %n.id, notification_type = %n.notification_type, "Notification persisted");
                    persisted.push(n);
                }
                Err(e) => warn!(error = %e, "Notification not persisted"),
            }
        }
        processed.push(ProcessedWebhook { outcome, persisted });
    }
    processed
}

pub async fn handle_webhook(args: WebhookArgs, config: &AppConfig) -> Result<()> {
    let bodies = parse_bodies(&read_input(&args)?)?;

    if args.dry_run {
        let mut normalizer = WebhookNormalizer::new(config.webhook.clone());
        for body in &bodies {
            print_outcome(&normalizer.process_json(body), args.json);
        }
        return Ok(());
    }

    let center = build_center(config)?;
    center.install_default_handlers("cli-webhook");
    for processed in process_stream(&center, &bodies).await {
        print_outcome(&processed.outcome, args.json);
    }
    Ok(())
}

fn print_outcome(outcome: &WebhookOutcome, json: bool) {
    if json {
        println!("{}", format_json(&outcome_json(outcome)));
    } else {
        println!("{}", format_outcome(outcome));
    }
}
