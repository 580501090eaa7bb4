//! Sync job monitor - turns backend sync status into a live log feed
//!
//! State machine: `Idle -> Polling { job_id } -> Idle`. Polling stops when
//! `stop()` is called or a terminal status (`completed` / `failed`) is seen.
//! There is at most one poll task per monitor; a generation counter keeps a
//! superseded task from writing after it has been replaced.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::BackendError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

const LOG_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Scheduled => "scheduled",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a plugin's sync history, most recent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub status: SyncStatus,
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for SyncLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<5} {}", self.timestamp.format("%H:%M:%S"), self.level, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling { job_id: String },
}

/// Where sync status comes from; polling today, a push source could replace it
#[async_trait]
pub trait SyncStatusSource: Send + Sync {
    async fn fetch_sync_history(&self, tenant_plugin_id: &str, limit: usize) -> Result<Vec<SyncRecord>, BackendError>;
}

struct MonitorShared {
    state: MonitorState,
    logs: Vec<SyncLogEntry>,
    task: Option<JoinHandle<()>>,
    generation: u64,
    last_status: Option<SyncStatus>,
}

struct Inner {
    shared: Mutex<MonitorShared>,
    events: broadcast::Sender<SyncLogEntry>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, MonitorShared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, shared: &mut MonitorShared, level: LogLevel, message: impl Into<String>) {
        let entry = SyncLogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        match level {
            LogLevel::Error | LogLevel::Warn => warn!(message = %entry.message, "sync monitor"),
            _ => debug!(level = %level, message = %entry.message, "sync monitor"),
        }
        // No subscribers is fine
        let _ = self.events.send(entry.clone());
        shared.logs.push(entry);
    }

    /// Returns whether a poller was active
    fn stop_locked(&self, shared: &mut MonitorShared) -> bool {
        let was_polling = matches!(shared.state, MonitorState::Polling { .. });
        if let Some(task) = shared.task.take() {
            task.abort();
        }
        shared.generation += 1;
        shared.state = MonitorState::Idle;
        if was_polling {
            self.push(shared, LogLevel::Info, "Sync monitoring stopped.");
        }
        was_polling
    }
}

pub struct SyncJobMonitor {
    source: Arc<dyn SyncStatusSource>,
    interval: Duration,
    history_limit: usize,
    inner: Arc<Inner>,
}

impl SyncJobMonitor {
    pub fn new(source: Arc<dyn SyncStatusSource>) -> Self {
        let (events, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
            history_limit: DEFAULT_HISTORY_LIMIT,
            inner: Arc::new(Inner {
                shared: Mutex::new(MonitorShared {
                    state: MonitorState::Idle,
                    logs: Vec::new(),
                    task: None,
                    generation: 0,
                    last_status: None,
                }),
                events,
            }),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Begin polling `job_id`. Returns false (and does nothing) if that job
    /// is already being polled. Must be called within a tokio runtime.
    pub fn start(&self, job_id: &str) -> bool {
        let mut shared = self.inner.lock();
        if let MonitorState::Polling { job_id: current } = &shared.state {
            if current == job_id {
                debug!(job_id, "Sync monitor already polling, ignoring start");
                return false;
            }
        }

        self.inner.stop_locked(&mut shared);
        shared.logs.clear();
        shared.last_status = None;
        let generation = shared.generation;
        self.inner.push(&mut shared, LogLevel::Info, "Starting sync status monitoring...");
        shared.state = MonitorState::Polling {
            job_id: job_id.to_string(),
        };
        info!(job_id, interval_ms = self.interval.as_millis() as u64, "Sync monitor started");

        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            Arc::clone(&self.source),
            job_id.to_string(),
            generation,
            self.interval,
            self.history_limit,
        ));
        shared.task = Some(task);
        true
    }

    /// Cancel polling. Idempotent; logs a line only if a poller was active.
    pub fn stop(&self) -> bool {
        let mut shared = self.inner.lock();
        let stopped = self.inner.stop_locked(&mut shared);
        if stopped {
            info!("Sync monitor stopped");
        }
        stopped
    }

    /// Empty the log buffer; polling is unaffected
    pub fn clear_logs(&self) {
        self.inner.lock().logs.clear();
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.inner.lock().logs.clone()
    }

    pub fn state(&self) -> MonitorState {
        self.inner.lock().state.clone()
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.inner.lock().state, MonitorState::Polling { .. })
    }

    /// Stream of log entries appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncLogEntry> {
        self.inner.events.subscribe()
    }
}

impl Drop for SyncJobMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock().task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(
    inner: Arc<Inner>,
    source: Arc<dyn SyncStatusSource>,
    job_id: String,
    generation: u64,
    period: Duration,
    limit: usize,
) {
    // First tick fires after one full period
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let result = source.fetch_sync_history(&job_id, limit).await;

        let mut shared = inner.lock();
        if shared.generation != generation {
            return;
        }

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                debug!(job_id = %job_id, transient = e.is_transient(), "Sync poll failed, retrying next tick");
                inner.push(&mut shared, LogLevel::Error, format!("Failed to fetch sync status: {}", e));
                continue;
            }
        };
        let Some(latest) = history.first() else {
            inner.push(&mut shared, LogLevel::Info, "No sync history available yet...");
            continue;
        };

        if shared.last_status != Some(latest.status) {
            let previous = shared.last_status.map(|s| s.as_str()).unwrap_or("none");
            inner.push(
                &mut shared,
                LogLevel::Debug,
                format!("Status changed: {} -> {}", previous, latest.status),
            );
            shared.last_status = Some(latest.status);
        }

        match latest.status {
            SyncStatus::Scheduled => {
                inner.push(&mut shared, LogLevel::Info, "Sync scheduled, waiting to start...");
            }
            SyncStatus::InProgress => {
                inner.push(
                    &mut shared,
                    LogLevel::Info,
                    format!("Sync in progress... ({} records so far)", latest.records_processed),
                );
            }
            SyncStatus::Completed | SyncStatus::Failed => {
                inner.push(
                    &mut shared,
                    LogLevel::Info,
                    format!("Sync {}: Processed {} records", latest.status, latest.records_processed),
                );
                if latest.status == SyncStatus::Failed {
                    if let Some(message) = latest.error_message.as_deref().filter(|m| !m.is_empty()) {
                        inner.push(&mut shared, LogLevel::Error, message);
                    }
                }
                info!(
                    job_id = %job_id,
                    status = %latest.status,
                    records = latest.records_processed,
                    "Sync job finished"
                );
                // Detach our own handle; we return right after
                shared.task = None;
                shared.generation += 1;
                shared.state = MonitorState::Idle;
                inner.push(&mut shared, LogLevel::Info, "Sync monitoring stopped.");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[derive(Default)]
    struct ScriptedSource {
        calls: AtomicUsize,
        responses: Mutex<VecDeque<Result<Vec<SyncRecord>, BackendError>>>,
    }

    impl ScriptedSource {
        fn with(responses: Vec<Result<Vec<SyncRecord>, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncStatusSource for ScriptedSource {
        async fn fetch_sync_history(&self, _id: &str, _limit: usize) -> Result<Vec<SyncRecord>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn record(status: SyncStatus, records: u64) -> SyncRecord {
        SyncRecord {
            status,
            records_processed: records,
            error_message: None,
            timestamp: None,
        }
    }

    fn lines(monitor: &SyncJobMonitor, level: LogLevel) -> Vec<String> {
        monitor
            .logs()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    const TICK: Duration = Duration::from_millis(2000);
    const SLACK: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_progress_then_completion() {
        let source = ScriptedSource::with(vec![
            Ok(vec![record(SyncStatus::InProgress, 10)]),
            Ok(vec![record(SyncStatus::Completed, 50), record(SyncStatus::Failed, 0)]),
        ]);
        let monitor = SyncJobMonitor::new(source.clone());

        assert!(monitor.start("p1"));
        assert_eq!(lines(&monitor, LogLevel::Info), vec!["Starting sync status monitoring..."]);

        sleep(TICK + SLACK).await;
        let info = lines(&monitor, LogLevel::Info);
        assert_eq!(info.iter().filter(|l| l.contains("10")).count(), 1);
        assert_eq!(info.last().map(String::as_str), Some("Sync in progress... (10 records so far)"));
        assert_eq!(lines(&monitor, LogLevel::Debug), vec!["Status changed: none -> in_progress"]);

        sleep(TICK).await;
        let info = lines(&monitor, LogLevel::Info);
        assert!(info.contains(&"Sync completed: Processed 50 records".to_string()));
        assert_eq!(info.last().map(String::as_str), Some("Sync monitoring stopped."));
        assert_eq!(monitor.state(), MonitorState::Idle);

        // no further polling once idle
        sleep(TICK * 3).await;
        assert_eq!(source.calls(), 2);

        assert!(monitor.start("p1"));
        assert_eq!(lines(&monitor, LogLevel::Info), vec!["Starting sync status monitoring..."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_is_noop() {
        let source = ScriptedSource::with(vec![]);
        let monitor = SyncJobMonitor::new(source.clone());

        assert!(monitor.start("p1"));
        assert!(!monitor.start("p1"));
        let starts = monitor
            .logs()
            .iter()
            .filter(|e| e.message == "Starting sync status monitoring...")
            .count();
        assert_eq!(starts, 1);

        sleep(TICK + SLACK).await;
        assert_eq!(source.calls(), 1);
        sleep(TICK).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(lines(&monitor, LogLevel::Info).last().map(String::as_str), Some("No sync history available yet..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_error_keeps_polling() {
        let source = ScriptedSource::with(vec![
            Err(BackendError::Transport("connection reset".to_string())),
            Ok(vec![record(SyncStatus::Scheduled, 0)]),
        ]);
        let monitor = SyncJobMonitor::new(source.clone());
        monitor.start("p1");

        sleep(TICK + SLACK).await;
        let errors = lines(&monitor, LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to fetch sync status:"));
        assert!(monitor.is_polling());

        sleep(TICK).await;
        assert_eq!(source.calls(), 2);
        assert!(monitor.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_logs_error_message() {
        let mut failed = record(SyncStatus::Failed, 7);
        failed.error_message = Some("QuickBooks token expired".to_string());
        let source = ScriptedSource::with(vec![Ok(vec![failed])]);
        let monitor = SyncJobMonitor::new(source);
        monitor.start("p1");

        sleep(TICK + SLACK).await;
        assert_eq!(lines(&monitor, LogLevel::Error), vec!["QuickBooks token expired"]);
        assert!(lines(&monitor, LogLevel::Info).contains(&"Sync failed: Processed 7 records".to_string()));
        assert!(!monitor.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let monitor = SyncJobMonitor::new(ScriptedSource::with(vec![]));
        assert!(!monitor.stop());
        assert!(monitor.logs().is_empty());

        monitor.start("p1");
        assert!(monitor.stop());
        assert!(!monitor.stop());
        let stopped = monitor
            .logs()
            .iter()
            .filter(|e| e.message == "Sync monitoring stopped.")
            .count();
        assert_eq!(stopped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_polling() {
        let source = ScriptedSource::with(vec![]);
        let monitor = SyncJobMonitor::new(source.clone());
        monitor.start("p1");
        monitor.stop();

        sleep(TICK * 3).await;
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_logs_keeps_polling() {
        let source = ScriptedSource::with(vec![]);
        let monitor = SyncJobMonitor::new(source.clone());
        monitor.start("p1");
        monitor.clear_logs();
        assert!(monitor.logs().is_empty());
        assert!(monitor.is_polling());

        sleep(TICK + SLACK).await;
        assert_eq!(monitor.logs().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_jobs_replaces_poller() {
        let source = ScriptedSource::with(vec![]);
        let monitor = SyncJobMonitor::new(source.clone());
        monitor.start("p1");
        assert!(monitor.start("p2"));
        assert_eq!(
            monitor.state(),
            MonitorState::Polling {
                job_id: "p2".to_string()
            }
        );

        sleep(TICK + SLACK).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_streams_entries() {
        let source = ScriptedSource::with(vec![Ok(vec![record(SyncStatus::Completed, 3)])]);
        let monitor = SyncJobMonitor::new(source);
        let mut rx = monitor.subscribe();
        monitor.start("p1");

        let mut seen = Vec::new();
        while let Ok(entry) = rx.recv().await {
            let done = entry.message == "Sync monitoring stopped.";
            seen.push(entry.message);
            if done {
                break;
            }
        }
        assert_eq!(seen.first().map(String::as_str), Some("Starting sync status monitoring..."));
        assert!(seen.contains(&"Sync completed: Processed 3 records".to_string()));
    }

    #[test]
    fn test_sync_record_parsing() {
        let record: SyncRecord = serde_json::from_str(
            r#"{"status": "in_progress", "recordsProcessed": 12, "timestamp": "2026-02-01T08:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.status, SyncStatus::InProgress);
        assert_eq!(record.records_processed, 12);
        assert!(record.error_message.is_none());
    }
}
