//! Error taxonomy shared by every stage.

use thiserror::Error;

/// Malformed dependency graph definition. Fatal: the run aborts before dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphParseError {
    /// Two resources share the same id.
    #[error("duplicate resource id: {0}")]
    DuplicateNode(String),

    /// An edge points at a resource that was never declared.
    #[error("edge {from} -> {to} references unknown resource `{missing}`")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    /// A resource was declared with an empty id.
    #[error("resource id must not be empty")]
    EmptyId,

    /// The definition document itself could not be read.
    #[error("malformed graph definition: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for GraphParseError {
    fn from(err: serde_json::Error) -> Self {
        GraphParseError::Malformed(err.to_string())
    }
}

/// Failures raised by the tool gateway. Local to one worker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool `{tool}` unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("tool `{tool}` timed out after {elapsed_ms} ms")]
    Timeout { tool: String, elapsed_ms: u64 },
}

impl ToolError {
    pub fn unavailable(tool: impl Into<String>, reason: impl ToString) -> Self {
        ToolError::Unavailable {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures raised by the reasoning oracle or while validating its output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The returned structure does not conform to the stage's action schema.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// The reasoning backend itself failed (transport, quota, ...).
    #[error("reasoning backend failed: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        OracleError::SchemaValidation(err.to_string())
    }
}

/// Errors that escape a stage and reach the caller of the engine.
#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error(transparent)]
    Graph(#[from] GraphParseError),

    /// Triage could not obtain observability data for any resource.
    #[error("insufficient observability data: {0}")]
    InsufficientData(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
