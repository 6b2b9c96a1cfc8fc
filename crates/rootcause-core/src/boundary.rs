//! Traits at the two external seams: the reasoning oracle and the tool gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::StageContext;
use crate::error::{OracleError, ToolError};

/// Converts a stage context into a raw structured action.
///
/// Implementations return the envelope unvalidated; each stage owns
/// validation and its retry policy.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn decide(&self, context: &StageContext) -> Result<serde_json::Value, OracleError>;
}

/// A tool the gateway can run, as advertised to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Structured access to metrics, traces, logs and the cluster API.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Tools this gateway accepts.
    fn catalog(&self) -> Vec<ToolSpec>;

    async fn invoke(&self, tool: &str, args: &serde_json::Value) -> Result<serde_json::Value, ToolError>;

    fn has_tool(&self, tool: &str) -> bool {
        self.catalog().iter().any(|spec| spec.name == tool)
    }
}
