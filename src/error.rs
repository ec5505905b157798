//! Error types for flowcanvas.
//!
//! Every variant maps to a stable code so callers (CLI, UI bridges) can
//! branch on the failure class without string matching.

use thiserror::Error;

/// Result type alias for flowcanvas operations.
pub type Result<T> = std::result::Result<T, Error>;

/// flowcanvas error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Structurally invalid graph (duplicate ids, dangling edges, self-loops).
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("No runnable generator nodes in workflow")]
    NoRunnableNodes,

    #[error("Start node '{0}' is not a generator node of this workflow")]
    InvalidStartNode(String),

    #[error("Execution {0} is already running")]
    AlreadyRunning(String),

    #[error("Node '{node_id}' is invalid: {message}")]
    Validation { node_id: String, message: String },

    #[error("Job submission failed: {0}")]
    Submission(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Graph(_) => "GRAPH_ERROR",
            Error::CycleDetected { .. } => "CYCLE_DETECTED",
            Error::NoRunnableNodes => "NO_RUNNABLE_NODES",
            Error::InvalidStartNode(_) => "INVALID_START_NODE",
            Error::AlreadyRunning(_) => "ALREADY_RUNNING",
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::Submission(_) => "SUBMISSION_ERROR",
            Error::JobFailed(_) => "JOB_FAILED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Cancelled => "CANCELLED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the error aborts a run before any node is started.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::Graph(_)
                | Error::CycleDetected { .. }
                | Error::NoRunnableNodes
                | Error::InvalidStartNode(_)
                | Error::AlreadyRunning(_)
        )
    }

    /// Convert to a JSON error body.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        if let Error::CycleDetected { path } = self {
            body["error"]["cycle_path"] = serde_json::json!(path);
        }
        if let Error::Validation { node_id, .. } = self {
            body["error"]["node_id"] = serde_json::json!(node_id);
        }
        body
    }
}
