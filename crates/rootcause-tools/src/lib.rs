//! Tool gateway for rootcause workers.
//!
//! [`HttpToolGateway`] forwards each tool call as `POST {base}/tools/{name}`
//! with the arguments as the JSON body, and hands the JSON answer back to the
//! worker as an opaque observation.

mod catalog;

pub use catalog::{allow_list, default_catalog};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use rootcause_core::{ToolError, ToolGateway, ToolSpec};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Gateway
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpToolGateway {
    client: Client,
    base_url: String,
    catalog: Vec<ToolSpec>,
}

impl HttpToolGateway {
    /// Creates a gateway serving [`default_catalog`].
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::unavailable("gateway", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            catalog: default_catalog(),
        })
    }

    pub fn with_catalog(mut self, catalog: Vec<ToolSpec>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(tool: &str, err: reqwest::Error, started: Instant) -> ToolError {
        if err.is_timeout() {
            return ToolError::Timeout {
                tool: tool.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
        }
        ToolError::unavailable(tool, err)
    }
}

#[async_trait]
impl ToolGateway for HttpToolGateway {
    fn catalog(&self) -> Vec<ToolSpec> {
        self.catalog.clone()
    }

    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        if !self.has_tool(tool) {
            return Err(ToolError::unavailable(tool, "not in the gateway catalog"));
        }

        let url = format!("{}/tools/{}", self.base_url, tool);
        let started = Instant::now();
        debug!(tool, %url, "Invoking tool");

        let response = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|e| Self::classify(tool, e, started))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(tool, e, started))?;

        if status.is_server_error() {
            warn!(tool, status = status.as_u16(), "Tool backend failed");
            return Err(ToolError::unavailable(tool, format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));
        if status.is_client_error() {
            // The tool answered; a rejected request is still an observation.
            return Ok(json!({"error": payload, "status": status.as_u16()}));
        }
        Ok(payload)
    }
}
