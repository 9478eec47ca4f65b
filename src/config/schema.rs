use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{OfficeflowError, Result};

/// Feature flag that switches the tool layer from pure simulation to real
/// HTTP calls against the configured endpoints.
pub const FEATURE_LIVE_TOOL_CALLS: &str = "live_tool_calls";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Extra directory of JSON workflow definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows_dir: Option<PathBuf>,

    /// Local HTTP API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// External tool stub layer settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Feature switches (name -> enabled)
    #[serde(default)]
    pub features: HashMap<String, bool>,

    /// Per-service provider configuration.
    ///
    /// Each service table names a `provider` and carries one sub-table per
    /// provider, e.g. `[services.crm_service] provider = "salesforce"` plus
    /// `[services.crm_service.salesforce] api_key = "..."`.
    #[serde(default)]
    pub services: HashMap<String, toml::Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Start the HTTP API on launch
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port on 127.0.0.1
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Required value of the X-API-Key header (none = open)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Base URL that relative tool endpoints (e.g. "/api/email") resolve against
    #[serde(default = "default_tools_base_url")]
    pub base_url: String,

    /// Request timeout for live tool calls
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// Replace a failed live call with a simulated response instead of
    /// failing the step
    #[serde(default = "default_true")]
    pub fallback_to_simulation: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: default_tools_base_url(),
            timeout_secs: default_tool_timeout(),
            fallback_to_simulation: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    38480
}

fn default_tools_base_url() -> String {
    "http://127.0.0.1:38481".to_string()
}

fn default_tool_timeout() -> u64 {
    30
}

/// Provider settings for one service, as returned by [`AppConfig::get_api_config`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiConfig {
    pub provider: String,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ApiConfig {
    /// String setting by key.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

impl AppConfig {
    /// Look up a value by dotted path (e.g. `services.slack.bot.api_key`).
    pub fn get(&self, path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current.clone())
    }

    /// Set a value by dotted path, creating intermediate tables as needed.
    ///
    /// The result must still deserialize as an `AppConfig`; a value of the
    /// wrong shape for a typed field is rejected and `self` is left untouched.
    pub fn set(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        let keys: Vec<&str> = path.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(OfficeflowError::Config(format!("Invalid config path: '{}'", path)));
        }

        let mut root = serde_json::to_value(&*self)?;
        let mut current = &mut root;
        for key in &keys[..keys.len() - 1] {
            let map = current.as_object_mut().ok_or_else(|| {
                OfficeflowError::Config(format!("Invalid config path: '{}'", path))
            })?;
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(serde_json::Map::new());
            }
            current = entry;
        }

        let last = keys[keys.len() - 1];
        current
            .as_object_mut()
            .ok_or_else(|| OfficeflowError::Config(format!("Invalid config path: '{}'", path)))?
            .insert(last.to_string(), value);

        *self = serde_json::from_value(root)
            .map_err(|e| OfficeflowError::Config(format!("Invalid value for '{}': {}", path, e)))?;
        Ok(())
    }

    /// Whether `features.<name>` is explicitly `true`.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }

    /// Provider configuration for a service.
    pub fn get_api_config(&self, service: &str) -> Result<ApiConfig> {
        let table = self.services.get(service).ok_or_else(|| {
            OfficeflowError::Config(format!("No provider configured for {}", service))
        })?;

        let provider = table
            .get("provider")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OfficeflowError::Config(format!("No provider configured for {}", service))
            })?
            .to_string();

        let provider_table = table
            .get(&provider)
            .and_then(|v| v.as_table())
            .ok_or_else(|| {
                OfficeflowError::Config(format!(
                    "No configuration found for {}.{}",
                    service, provider
                ))
            })?;

        let settings = match serde_json::to_value(provider_table)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(ApiConfig { provider, settings })
    }
}
