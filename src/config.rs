//! Configuration management for zonesync.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cloudflare API token (or environment variable name if prefixed with $).
    pub api_token: String,

    /// Account ID; required only for access-policy synchronization.
    #[serde(default)]
    pub account_id: Option<String>,

    /// Update interval in minutes (default: 5).
    #[serde(default = "default_interval_mins")]
    pub update_interval_mins: u64,

    /// IPv4 lookup services, tried in order.
    #[serde(default = "default_ipv4_services")]
    pub ipv4_services: Vec<String>,

    /// IPv6 lookup services, tried in order.
    #[serde(default = "default_ipv6_services")]
    pub ipv6_services: Vec<String>,

    /// Zones whose records are kept synchronized.
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,

    /// Access policies kept synchronized (requires account_id).
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,

    /// Webhook endpoints notified with each pass summary.
    #[serde(default)]
    pub notify_endpoints: Vec<String>,
}

fn default_interval_mins() -> u64 {
    5
}

fn default_ipv4_services() -> Vec<String> {
    vec![
        "https://api.ipify.org".to_string(),
        "https://ipv4.icanhazip.com".to_string(),
        "https://ifconfig.me/ip".to_string(),
    ]
}

fn default_ipv6_services() -> Vec<String> {
    vec![
        "https://api6.ipify.org".to_string(),
        "https://ipv6.icanhazip.com".to_string(),
        "https://v6.ident.me".to_string(),
    ]
}

/// A zone and the subset of its records to keep synchronized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone ID.
    pub zone_id: String,
    /// Zone name (e.g., "example.com"), for display only.
    pub zone_name: String,
    /// IDs of the records to manage; other records in the zone are untouched.
    #[serde(default)]
    pub record_ids: Vec<String>,
}

/// An access policy to keep pointed at the current IPv4 address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Access application ID.
    pub app_id: String,
    /// Access application name, for display only.
    pub app_name: String,
    /// Policy ID within the application.
    pub policy_id: String,
    /// Policy name, for display only.
    pub policy_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            account_id: None,
            update_interval_mins: default_interval_mins(),
            ipv4_services: default_ipv4_services(),
            ipv6_services: default_ipv6_services(),
            zones: Vec::new(),
            policies: Vec::new(),
            notify_endpoints: Vec::new(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("zonesync").join("config.toml"))
    }

    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file is an error: every command needs a configuration and
    /// running against an implicit empty one would silently do nothing.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "No configuration found at {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.resolved_api_token().is_empty() {
            return Err(SyncError::Config("api_token must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !seen.insert(zone.zone_id.as_str()) {
                return Err(SyncError::Config(format!(
                    "Duplicate zone_id {} in configuration",
                    zone.zone_id
                )));
            }
        }

        if !self.policies.is_empty() && self.account_id.is_none() {
            tracing::warn!("policies configured without account_id; policy sync will be skipped");
        }

        Ok(())
    }

    /// API token with environment variable references resolved.
    pub fn resolved_api_token(&self) -> String {
        resolve_env(&self.api_token)
    }

    /// Whether policy synchronization is enabled.
    pub fn policy_sync_enabled(&self) -> bool {
        self.account_id.is_some() && !self.policies.is_empty()
    }

    /// Update interval as a duration.
    pub fn update_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.update_interval_mins * 60)
    }

    /// Generate example configuration.
    pub fn example() -> Self {
        Self {
            api_token: "$CF_API_TOKEN".to_string(),
            account_id: Some("your-account-id".to_string()),
            update_interval_mins: 5,
            ipv4_services: default_ipv4_services(),
            ipv6_services: default_ipv6_services(),
            zones: vec![ZoneConfig {
                zone_id: "your-zone-id".to_string(),
                zone_name: "example.com".to_string(),
                record_ids: vec!["your-record-id".to_string()],
            }],
            policies: vec![PolicyConfig {
                app_id: "your-app-id".to_string(),
                app_name: "Home Lab".to_string(),
                policy_id: "your-policy-id".to_string(),
                policy_name: "Allow home IP".to_string(),
            }],
            notify_endpoints: Vec::new(),
        }
    }
}

/// Resolve environment variable references (values starting with $).
pub(crate) fn resolve_env(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} not set", var_name);
            value.to_string()
        })
    } else {
        value.to_string()
    }
}
