//! HTTP client for tool integrations, with simulated fallback.

use crate::config::{AppConfig, FEATURE_LIVE_TOOL_CALLS};
use crate::error::{OfficeflowError, Result, StepError};
use crate::tools::simulate::simulate_action;
use crate::tools::ToolIntegration;
use serde_json::{Map, Value};
use std::time::Duration;

/// Why a tool call was answered with a simulated payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationReason {
    /// No integration lists the action.
    NoIntegration,
    /// Live calls are switched off (`features.live_tool_calls`).
    LiveCallsDisabled,
    /// The tool needs a connection and has none.
    NotConnected,
    /// The live call was attempted and failed.
    CallFailed(String),
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Live(Value),
    Simulated {
        value: Value,
        reason: SimulationReason,
    },
}

impl ToolOutcome {
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::Live(value) => value,
            ToolOutcome::Simulated { value, .. } => value,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ToolOutcome::Simulated { .. })
    }
}

/// Calls tool endpoints, or simulates them.
#[derive(Clone)]
pub struct ToolClient {
    client: reqwest::Client,
    base_url: String,
    live: bool,
    fallback_to_simulation: bool,
}

impl ToolClient {
    /// Fails when the HTTP client cannot be built with the configured timeout.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.tools.timeout_secs.max(1)))
            .build()
            .map_err(|e| OfficeflowError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.tools.base_url.trim_end_matches('/').to_string(),
            live: config.is_feature_enabled(FEATURE_LIVE_TOOL_CALLS),
            fallback_to_simulation: config.tools.fallback_to_simulation,
        })
    }

    /// A client that never touches the network.
    pub fn simulated() -> Self {
        let config = AppConfig::default();
        Self {
            client: reqwest::Client::new(),
            base_url: config.tools.base_url.trim_end_matches('/').to_string(),
            live: false,
            fallback_to_simulation: config.tools.fallback_to_simulation,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Full URL for a tool endpoint.
    pub fn endpoint_url(&self, tool: &ToolIntegration) -> String {
        if tool.endpoint.starts_with("http://") || tool.endpoint.starts_with("https://") {
            tool.endpoint.clone()
        } else {
            format!("{}/{}", self.base_url, tool.endpoint.trim_start_matches('/'))
        }
    }

    /// Invoke `action` on `tool`.
    ///
    /// Only fails when a live call fails and fallback is disabled.
    pub async fn invoke(
        &self,
        tool: Option<&ToolIntegration>,
        action: &str,
        parameters: &Map<String, Value>,
    ) -> std::result::Result<ToolOutcome, StepError> {
        let Some(tool) = tool else {
            return Ok(ToolOutcome::Simulated {
                value: simulate_action(None, action, parameters),
                reason: SimulationReason::NoIntegration,
            });
        };

        if !self.live {
            return Ok(ToolOutcome::Simulated {
                value: simulate_action(Some(&tool.name), action, parameters),
                reason: SimulationReason::LiveCallsDisabled,
            });
        }

        match self.call_live(tool, action, parameters).await {
            Ok(value) => Ok(ToolOutcome::Live(value)),
            Err(e) if self.fallback_to_simulation => {
                tracing::warn!(
                    "External API call to {} failed, using simulation: {}",
                    tool.id,
                    e
                );
                Ok(ToolOutcome::Simulated {
                    value: simulate_action(Some(&tool.name), action, parameters),
                    reason: SimulationReason::CallFailed(e),
                })
            }
            Err(e) => Err(StepError::ExternalCallFailed {
                tool: tool.id.clone(),
                message: e,
            }),
        }
    }

    async fn call_live(
        &self,
        tool: &ToolIntegration,
        action: &str,
        parameters: &Map<String, Value>,
    ) -> std::result::Result<Value, String> {
        let url = self.endpoint_url(tool);
        let body = serde_json::json!({
            "action": action,
            "parameters": parameters,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(tool.authenticate())
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("External API error: {}", resp.status()));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| format!("Invalid JSON from {}: {}", url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config(base_url: &str, fallback: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config
            .features
            .insert(FEATURE_LIVE_TOOL_CALLS.to_string(), true);
        config.tools.base_url = base_url.to_string();
        config.tools.timeout_secs = 2;
        config.tools.fallback_to_simulation = fallback;
        config
    }

    fn email_tool() -> ToolIntegration {
        ToolIntegration::new("email_service", "Email Service", "communication", &["send_email"], "/api/email")
    }

    #[test]
    fn test_endpoint_url_resolution() {
        let client = ToolClient::new(&live_config("http://127.0.0.1:9000/", true)).unwrap();
        assert_eq!(client.endpoint_url(&email_tool()), "http://127.0.0.1:9000/api/email");

        let absolute = ToolIntegration::new("slack", "Slack", "communication", &[], "https://slack.com/api");
        assert_eq!(client.endpoint_url(&absolute), "https://slack.com/api");
    }

    #[tokio::test]
    async fn test_configured_timeout_bounds_live_calls() {
        use axum::{routing::post, Router};

        // Accepts the call but never answers within the timeout.
        let app = Router::new().route(
            "/api/email",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let mut config = live_config(&format!("http://{}", addr), false);
        config.tools.timeout_secs = 1;
        let client = ToolClient::new(&config).unwrap();
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            client.invoke(Some(&email_tool()), "send_email", &Map::new()),
        )
        .await
        .expect("call was not bounded by the configured timeout")
        .unwrap_err();
        assert!(matches!(err, StepError::ExternalCallFailed { .. }));
    }

    #[tokio::test]
    async fn test_no_integration_is_simulated() {
        let client = ToolClient::simulated();
        let out = client.invoke(None, "validate_email", &Map::new()).await.unwrap();
        assert!(matches!(
            out,
            ToolOutcome::Simulated { reason: SimulationReason::NoIntegration, .. }
        ));
    }

    #[tokio::test]
    async fn test_live_disabled_is_simulated() {
        let client = ToolClient::simulated();
        assert!(!client.is_live());
        let out = client
            .invoke(Some(&email_tool()), "send_email", &Map::new())
            .await
            .unwrap();
        match out {
            ToolOutcome::Simulated { value, reason } => {
                assert_eq!(reason, SimulationReason::LiveCallsDisabled);
                assert_eq!(value["tool"], "Email Service");
            }
            other => panic!("expected simulation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_live_call_falls_back() {
        // Nothing listens on port 1.
        let client = ToolClient::new(&live_config("http://127.0.0.1:1", true)).unwrap();
        let out = client
            .invoke(Some(&email_tool()), "send_email", &Map::new())
            .await
            .unwrap();
        match out {
            ToolOutcome::Simulated { value, reason } => {
                assert!(matches!(reason, SimulationReason::CallFailed(_)));
                assert_eq!(value["success"], true);
            }
            other => panic!("expected simulation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_live_call_without_fallback() {
        let client = ToolClient::new(&live_config("http://127.0.0.1:1", false)).unwrap();
        let err = client
            .invoke(Some(&email_tool()), "send_email", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::ExternalCallFailed { ref tool, .. } if tool == "email_service"));
    }

    #[tokio::test]
    async fn test_live_call_success() {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route(
            "/api/email",
            post(|Json(body): Json<Value>| async move {
                Json(serde_json::json!({ "echo": body["action"], "live": true }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = ToolClient::new(&live_config(&format!("http://{}", addr), false)).unwrap();
        let out = client
            .invoke(Some(&email_tool()), "send_email", &Map::new())
            .await
            .unwrap();
        assert_eq!(out, ToolOutcome::Live(serde_json::json!({ "echo": "send_email", "live": true })));
    }
}
