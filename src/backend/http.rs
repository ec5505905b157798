//! HTTP back-end - talks to a generation proxy over JSON.
//!
//! - `POST {base_url}/{kind}` with the params as body, answers `{ "id": ... }`
//! - `GET {base_url}/jobs/{id}` answers `{ "status", "output"?, "error"? }`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{GenerationBackend, JobPoll, JobStatus, SubmittedJob};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::workflow::GeneratorKind;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Generation back-end reached over HTTP.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn submit_url(&self, kind: GeneratorKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str())
    }

    fn poll_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.base_url, job_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "jobId", alias = "job_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a submission body into a job handle.
fn parse_submit_body(body: &str) -> Result<SubmittedJob> {
    let response: SubmitResponse = serde_json::from_str(body)
        .map_err(|e| Error::Submission(format!("Malformed submit response: {}", e)))?;
    if response.id.is_empty() {
        return Err(Error::Submission("Submit response has an empty job id".into()));
    }
    Ok(SubmittedJob {
        external_job_id: response.id,
    })
}

/// Parse a status body. Unknown statuses count as still processing.
fn parse_poll_body(body: &str) -> Result<JobPoll> {
    let response: PollResponse = serde_json::from_str(body)?;

    let status = match response.status.to_lowercase().as_str() {
        "starting" | "queued" | "pending" => JobStatus::Starting,
        "succeeded" | "completed" | "success" => JobStatus::Succeeded,
        "failed" | "error" | "canceled" | "cancelled" => JobStatus::Failed,
        _ => JobStatus::Processing,
    };

    let output_ref = response.output.as_ref().and_then(first_string);
    let error_message = response.error.as_ref().map(|e| match e {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    Ok(JobPoll {
        status,
        output_ref,
        error_message,
    })
}

/// Providers answer with either a single URL or a list of them.
fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn submit_job(&self, kind: GeneratorKind, params: &Value) -> Result<SubmittedJob> {
        let url = self.submit_url(kind);
        debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .json(params)
            .send()
            .await
            .map_err(|e| Error::Submission(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Submission(format!("POST {} body read failed: {}", url, e)))?;
        if !status.is_success() {
            return Err(Error::Submission(format!(
                "POST {} -> {}: {}",
                url,
                status.as_u16(),
                body
            )));
        }

        parse_submit_body(&body)
    }

    async fn poll_job(&self, external_job_id: &str) -> Result<JobPoll> {
        let url = self.poll_url(external_job_id);
        let response = self.authorize(self.client.get(&url)).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Transient poll errors keep the job alive; the attempt budget
            // bounds how long that can last.
            warn!("GET {} -> {}", url, status.as_u16());
            return Ok(JobPoll::processing());
        }

        parse_poll_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "https://gen.example.com/api/".into(),
            api_key: None,
            timeout_seconds: 5,
        });
        assert_eq!(
            backend.submit_url(GeneratorKind::Video),
            "https://gen.example.com/api/video"
        );
        assert_eq!(backend.poll_url("abc"), "https://gen.example.com/api/jobs/abc");
    }

    #[test]
    fn test_parse_submit_aliases() {
        assert_eq!(parse_submit_body(r#"{"id":"j1"}"#).unwrap().external_job_id, "j1");
        assert_eq!(parse_submit_body(r#"{"jobId":"j2"}"#).unwrap().external_job_id, "j2");
        assert_eq!(parse_submit_body(r#"{"job_id":"j3"}"#).unwrap().external_job_id, "j3");
    }

    #[test]
    fn test_parse_submit_errors() {
        assert_eq!(parse_submit_body("{}").unwrap_err().code(), "SUBMISSION_ERROR");
        assert_eq!(parse_submit_body(r#"{"id":""}"#).unwrap_err().code(), "SUBMISSION_ERROR");
    }

    #[test]
    fn test_parse_poll_success_with_list_output() {
        let poll = parse_poll_body(r#"{"status":"succeeded","output":["a.png","b.png"]}"#).unwrap();
        assert_eq!(poll, JobPoll::succeeded("a.png"));
    }

    #[test]
    fn test_parse_poll_failure() {
        let poll = parse_poll_body(r#"{"status":"failed","error":"content policy"}"#).unwrap();
        assert_eq!(poll.status, JobStatus::Failed);
        assert_eq!(poll.error_message.as_deref(), Some("content policy"));

        let poll = parse_poll_body(r#"{"status":"error","error":{"code":42}}"#).unwrap();
        assert_eq!(poll.error_message.as_deref(), Some(r#"{"code":42}"#));
    }

    #[test]
    fn test_parse_poll_in_progress() {
        assert_eq!(
            parse_poll_body(r#"{"status":"starting"}"#).unwrap().status,
            JobStatus::Starting
        );
        assert_eq!(
            parse_poll_body(r#"{"status":"rendering"}"#).unwrap().status,
            JobStatus::Processing
        );
        assert!(!JobStatus::Processing.is_terminal());
    }

    fn backend_for(server: &mockito::Server, api_key: Option<&str>) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url: server.url(),
            api_key: api_key.map(String::from),
            timeout_seconds: 5,
        })
    }

    #[tokio::test]
    async fn test_submit_sends_bearer_and_reads_job_id_alias() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/image")
            .match_header("authorization", "Bearer secret-key")
            .match_body(Matcher::PartialJson(json!({"prompt": "a cat"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jobId":"job-7"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server, Some("secret-key"));
        let job = backend
            .submit_job(GeneratorKind::Image, &json!({"prompt": "a cat"}))
            .await
            .unwrap();
        assert_eq!(job.external_job_id, "job-7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_without_key_sends_no_authorization() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/upscale")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"job_id":"u1"}"#)
            .create_async()
            .await;

        let backend = backend_for(&server, None);
        let job = backend.submit_job(GeneratorKind::Upscale, &json!({})).await.unwrap();
        assert_eq!(job.external_job_id, "u1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_server_error_is_submission_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/video")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let backend = backend_for(&server, None);
        let err = backend
            .submit_job(GeneratorKind::Video, &json!({"prompt": "waves"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SUBMISSION_ERROR");
        assert!(err.to_string().contains("500"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_server_error_counts_as_processing() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/jobs/job-1")
            .with_status(503)
            .create_async()
            .await;

        let backend = backend_for(&server, Some("secret-key"));
        let poll = backend.poll_job("job-1").await.unwrap();
        assert_eq!(poll.status, JobStatus::Processing);
        assert!(poll.output_ref.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_succeeded_takes_first_output() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/jobs/job-2")
            .match_header("authorization", "Bearer secret-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"succeeded","output":["/out/1.png","/out/2.png"]}"#)
            .create_async()
            .await;

        let backend = backend_for(&server, Some("secret-key"));
        let poll = backend.poll_job("job-2").await.unwrap();
        assert_eq!(poll, JobPoll::succeeded("/out/1.png"));
        mock.assert_async().await;
    }
}
