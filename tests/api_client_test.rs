// ApiClient against a mock backend: notifications CRUD and sync polling

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fermentum_notify::{
    classify, ApiClient, ApiConfig, BackendError, LogLevel, MonitorState, NotificationBackend, NotificationStore,
    NotificationType, SyncJobMonitor, SyncStatus, SyncStatusSource,
};

async fn setup() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::new(ApiConfig {
        base_url: format!("{}/api", server.uri()),
        token: Some("secret-token".to_string()),
        tenant_id: Some("brewery-42".to_string()),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    (server, client)
}

fn notification_json(id: &str, read: bool) -> serde_json::Value {
    json!({
        "id": id,
        "type": "inventory_low_stock",
        "title": "Low Stock Alert",
        "message": "Cascade Hops is running low (2 lb remaining)",
        "tenantId": "brewery-42",
        "source": "inventory",
        "priority": "high",
        "isRead": read,
        "actionRequired": true,
        "createdAt": "2026-03-01T10:00:00Z"
    })
}

#[tokio::test]
async fn test_list_sends_auth_and_tenant_headers() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(header("X-Tenant-Id", "brewery-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [notification_json("n-1", false), notification_json("n-2", true)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let notifications = client.list_notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].id, "n-1");
    assert_eq!(notifications[0].notification_type, NotificationType::InventoryLowStock);
    assert!(notifications[1].read);
}

#[tokio::test]
async fn test_create_uses_returned_id() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/notifications"))
        .and(body_partial_json(json!({"type": "system_update"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"notificationId": 917})))
        .mount(&server)
        .await;

    let draft = classify(NotificationType::SystemUpdate, &json!({"version": "3.1"}));
    let created = client.create_notification(&draft).await.unwrap();
    assert_eq!(created.id, "917");
    assert_eq!(created.title, draft.title);
    assert!(!created.read);
}

#[tokio::test]
async fn test_error_status_surfaces_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/api/notifications/read-all"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    match client.mark_all_read().await {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_store_over_http_marks_read() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([notification_json("n-1", false)])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/n-1/read"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = NotificationStore::new(Arc::new(client));
    assert_eq!(store.refresh().await.unwrap(), 1);
    assert_eq!(store.get_notification_counts().unread, 1);

    store.mark_read("n-1").await.unwrap();
    assert_eq!(store.get_notification_counts().unread, 0);
}

#[tokio::test]
async fn test_sync_history_bare_and_wrapped() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/plugins/p1/sync-history"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"status": "in_progress", "recordsProcessed": 10}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/plugins/p2/sync-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"status": "failed", "recordsProcessed": 3, "errorMessage": "token expired"}]
        })))
        .mount(&server)
        .await;

    let bare = client.fetch_sync_history("p1", 5).await.unwrap();
    assert_eq!(bare[0].status, SyncStatus::InProgress);
    assert_eq!(bare[0].records_processed, 10);

    let wrapped = client.fetch_sync_history("p2", 5).await.unwrap();
    assert_eq!(wrapped[0].status, SyncStatus::Failed);
    assert_eq!(wrapped[0].error_message.as_deref(), Some("token expired"));
}

#[tokio::test]
async fn test_sync_monitor_follows_job_to_completion() {
    let (server, client) = setup().await;

    // First poll sees the job running, every later poll sees it finished
    Mock::given(method("GET"))
        .and(path("/api/plugins/p1/sync-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"status": "in_progress", "recordsProcessed": 10}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/plugins/p1/sync-history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"status": "completed", "recordsProcessed": 50}
        ])))
        .mount(&server)
        .await;

    let monitor = SyncJobMonitor::new(Arc::new(client)).with_interval(Duration::from_millis(25));
    let mut entries = monitor.subscribe();
    assert!(monitor.start("p1"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(entry) = entries.recv().await {
            if entry.message == "Sync monitoring stopped." {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(monitor.state(), MonitorState::Idle);
    let info: Vec<String> = monitor
        .logs()
        .into_iter()
        .filter(|e| e.level == LogLevel::Info)
        .map(|e| e.message)
        .collect();
    assert!(info.iter().any(|m| m.contains("10")));
    assert!(info.iter().any(|m| m == "Sync completed: Processed 50 records"));

    assert!(monitor.start("p1"));
    let logs = monitor.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.starts_with("Starting"));
    monitor.stop();
}
