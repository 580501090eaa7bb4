//! Shared CLI setup: config resolution and backend construction

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::debug;

use crate::api::{ApiClient, ApiConfig};
use crate::center::NotificationCenter;
use crate::config::AppConfig;

/// Connection flags accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Backend base URL (overrides config and FERMENTUM_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Bearer token (overrides config and FERMENTUM_API_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,
    /// Tenant id (overrides config and FERMENTUM_TENANT_ID)
    #[arg(long, global = true)]
    pub tenant: Option<String>,
}

impl GlobalArgs {
    /// Flags win over env, env over file
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.api_token = Some(token.clone());
        }
        if let Some(tenant) = &self.tenant {
            config.tenant_id = Some(tenant.clone());
        }
    }
}

pub fn resolve_config(args: &GlobalArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load()?;
    args.apply(&mut config);
    config.validate()?;
    debug!(api = %config.api_base_url, tenant = ?config.tenant_id, "Resolved configuration");
    Ok(config)
}

pub fn build_client(config: &AppConfig) -> Result<Arc<ApiClient>> {
    Ok(Arc::new(ApiClient::new(ApiConfig::from_app_config(config))?))
}

pub fn build_center(config: &AppConfig) -> Result<NotificationCenter> {
    let client = build_client(config)?;
    Ok(NotificationCenter::new(config.clone(), client)?)
}
