//! `notifications` command - inspect and manage persisted notifications

use anyhow::Result;
use clap::{Args, Subcommand};

use super::{build_center, format_counts, format_json, format_notification_line};
use crate::config::AppConfig;
use crate::notification::NotificationFilter;

#[derive(Args, Debug)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub action: NotificationsAction,
}

#[derive(Subcommand, Debug)]
pub enum NotificationsAction {
    /// List notifications, newest first
    List {
        /// Only unread
        #[arg(long)]
        unread: bool,
        /// Only unread items that need action
        #[arg(long)]
        action_required: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show derived counts
    Counts {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark one notification as read
    Read {
        /// Notification id
        id: String,
    },
    /// Mark every notification as read
    ReadAll,
    /// Delete all notifications
    Clear,
}

pub async fn handle_notifications(args: NotificationsArgs, config: &AppConfig) -> Result<()> {
    let center = build_center(config)?;
    center.refresh().await?;

    match args.action {
        NotificationsAction::List {
            unread,
            action_required,
            json,
        } => {
            let items = center.store().filter(&NotificationFilter {
                unread_only: unread,
                action_required,
                ..Default::default()
            });
            if json {
                println!("{}", format_json(&items));
            } else if items.is_empty() {
                println!("No notifications");
            } else {
                for n in &items {
                    println!("{}", format_notification_line(n));
                }
            }
        }
        NotificationsAction::Counts { json } => {
            let counts = center.counts();
            if json {
                println!("{}", format_json(&counts));
            } else {
                println!("{}", format_counts(&counts));
            }
        }
        NotificationsAction::Read { id } => {
            center.mark_read(&id).await?;
            println!("Marked {} as read", id);
        }
        NotificationsAction::ReadAll => {
            center.mark_all_read().await?;
            println!("Marked all notifications as read");
        }
        NotificationsAction::Clear => {
            center.clear_all().await?;
            println!("Cleared all notifications");
        }
    }
    Ok(())
}
