//! Generation back-end contract.
//!
//! The engine only needs two calls: submit a job, and poll it. Anything that
//! speaks that contract (an HTTP proxy, an in-process fake) can drive a run.

mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::workflow::GeneratorKind;

pub use http::HttpBackend;

/// Handle returned by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub external_job_id: String,
}

/// Remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One poll response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPoll {
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobPoll {
    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            output_ref: None,
            error_message: None,
        }
    }

    pub fn succeeded(output_ref: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            output_ref: Some(output_ref.into()),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            output_ref: None,
            error_message: Some(message.into()),
        }
    }
}

/// Submit/poll contract with a generation provider.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Create a job.
    ///
    /// # Errors
    /// `Error::Submission` when the provider refuses the request.
    async fn submit_job(&self, kind: GeneratorKind, params: &Value) -> Result<SubmittedJob>;

    /// Query a job's status.
    async fn poll_job(&self, external_job_id: &str) -> Result<JobPoll>;
}
