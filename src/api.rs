//! REST client for the notification and plugin endpoints

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::BackendError;
use crate::notification::{Notification, NotificationBackend, NotificationDraft};
use crate::sync_monitor::{SyncRecord, SyncStatusSource};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub tenant_id: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            token: config.api_token.clone(),
            tenant_id: config.tenant_id.clone(),
            timeout: config.request_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Responses come either bare or wrapped as `{success, data, message}`;
/// an object without `success` is treated as bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiResponse<T> {
    Envelope {
        success: bool,
        data: Option<T>,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(T),
}

impl<T> ApiResponse<T> {
    fn into_data(self) -> Result<T, BackendError> {
        match self {
            ApiResponse::Bare(data) => Ok(data),
            ApiResponse::Envelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiResponse::Envelope { message, .. } => Err(BackendError::Decode(
                message.unwrap_or_else(|| "response envelope carried no data".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    notification_id: Value,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(tenant) = self.config.tenant_id.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.header("X-Tenant-Id", tenant);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(builder).await?;
        let body = response.text().await?;
        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        parsed.into_data()
    }
}

#[async_trait]
impl NotificationBackend for ApiClient {
    async fn list_notifications(&self) -> Result<Vec<Notification>, BackendError> {
        let notifications: Vec<Notification> = self.fetch(self.request(Method::GET, "/notifications")).await?;
        debug!(count = notifications.len(), "Fetched notifications");
        Ok(notifications)
    }

    async fn create_notification(&self, draft: &NotificationDraft) -> Result<Notification, BackendError> {
        let created: Created = self
            .fetch(self.request(Method::POST, "/notifications").json(draft))
            .await?;
        let id = match created.notification_id {
            Value::String(id) => id,
            other => other.to_string(),
        };
        Ok(draft.clone().into_notification(id, Utc::now()))
    }

    async fn mark_read(&self, id: &str) -> Result<(), BackendError> {
        self.send(self.request(Method::PUT, &format!("/notifications/{}/read", id)))
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), BackendError> {
        self.send(self.request(Method::PUT, "/notifications/read-all")).await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), BackendError> {
        self.send(self.request(Method::DELETE, "/notifications")).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncStatusSource for ApiClient {
    async fn fetch_sync_history(&self, tenant_plugin_id: &str, limit: usize) -> Result<Vec<SyncRecord>, BackendError> {
        let builder = self
            .request(Method::GET, &format!("/plugins/{}/sync-history", tenant_plugin_id))
            .query(&[("limit", limit)]);
        self.fetch(builder).await
    }
}
