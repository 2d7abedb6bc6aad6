//! Scoring Service Client - batch scoring job protocol
//!
//! The remote service runs the clustering model over an uploaded input and
//! leaves the scored CSV in blob storage. `ScoringService` is the seam the
//! job driver talks to; `HttpScoringClient` speaks the REST dialect.

use crate::config::ScoringConfig;
use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const API_VERSION: &str = "2.0";

/// Job status as reported by the scoring service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteStatus {
    NotStarted,
    Running,
    Failed,
    Cancelled,
    Finished,
}

impl RemoteStatus {
    /// Accepts both the symbolic and the numeric encoding of StatusCode
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => match s.as_str() {
                "NotStarted" => Some(RemoteStatus::NotStarted),
                "Running" => Some(RemoteStatus::Running),
                "Failed" => Some(RemoteStatus::Failed),
                "Cancelled" => Some(RemoteStatus::Cancelled),
                "Finished" => Some(RemoteStatus::Finished),
                _ => None,
            },
            Value::Number(n) => match n.as_u64()? {
                0 => Some(RemoteStatus::NotStarted),
                1 => Some(RemoteStatus::Running),
                2 => Some(RemoteStatus::Failed),
                3 => Some(RemoteStatus::Cancelled),
                4 => Some(RemoteStatus::Finished),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Failed | RemoteStatus::Cancelled | RemoteStatus::Finished
        )
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A blob addressed the way the scoring service reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct BlobLocation {
    #[serde(default)]
    pub base_location: String,
    pub relative_location: String,
    #[serde(default)]
    pub sas_blob_token: String,
}

impl BlobLocation {
    pub fn url(&self) -> String {
        format!("{}{}{}", self.base_location, self.relative_location, self.sas_blob_token)
    }
}

/// Body of a job submission
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct JobRequest {
    pub inputs: HashMap<String, BlobLocation>,
    pub outputs: HashMap<String, BlobLocation>,
    pub global_parameters: HashMap<String, String>,
}

/// One poll result
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub status: RemoteStatus,
    pub result_location: Option<BlobLocation>,
    pub details: Option<String>,
}

impl JobStatus {
    pub fn new(status: RemoteStatus) -> Self {
        Self {
            status,
            result_location: None,
            details: None,
        }
    }
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Register a job; returns its id
    async fn submit(&self, request: &JobRequest) -> Result<String>;

    async fn start(&self, job_id: &str) -> Result<()>;

    async fn poll(&self, job_id: &str) -> Result<JobStatus>;

    /// Download the scored CSV text
    async fn fetch(&self, location: &BlobLocation) -> Result<String>;

    async fn delete(&self, job_id: &str) -> Result<()>;
}

pub struct HttpScoringClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    output_name: String,
}

impl HttpScoringClient {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            output_name: config.output_name.clone(),
        }
    }

    fn jobs_url(&self, suffix: &str) -> String {
        format!("{}/jobs{}?api-version={}", self.api_url, suffix, API_VERSION)
    }

    /// Pull status, result location and details out of a job status body
    pub fn parse_status(&self, body: &Value) -> Result<JobStatus> {
        let status = body
            .get("StatusCode")
            .and_then(RemoteStatus::from_value)
            .ok_or_else(|| AnalysisError::Remote {
                status: 200,
                body: format!("unrecognized job status: {}", body),
            })?;

        let result_location = body
            .get("Results")
            .and_then(|results| {
                results
                    .get(&self.output_name)
                    .or_else(|| results.as_object().and_then(|m| m.values().next()))
            })
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value::<BlobLocation>(v.clone()))
            .transpose()?;

        let details = match body.get("Details") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        Ok(JobStatus {
            status,
            result_location,
            details,
        })
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AnalysisError::Remote {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ScoringService for HttpScoringClient {
    async fn submit(&self, request: &JobRequest) -> Result<String> {
        let response = self
            .client
            .post(self.jobs_url(""))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let job_id: String = ensure_success(response).await?.json().await?;
        debug!("Submitted scoring job {}", job_id);
        Ok(job_id)
    }

    async fn start(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.jobs_url(&format!("/{}/start", job_id)))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .client
            .get(self.jobs_url(&format!("/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        self.parse_status(&body)
    }

    async fn fetch(&self, location: &BlobLocation) -> Result<String> {
        let response = self.client.get(location.url()).send().await?;
        Ok(ensure_success(response).await?.text().await?)
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.jobs_url(&format!("/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
