//! Scoring Job Driver
//!
//! Drives one remote scoring job through an explicit state machine:
//!
//! Submitted -> Started -> Polling -> Finished | Failed | Cancelled | TimedOut
//!
//! The driver sleeps between polls and the whole polling phase runs under a
//! deadline. When the deadline passes the pending poll is dropped and the
//! remote job is deleted on a best-effort basis.

use crate::config::ScoringConfig;
use crate::error::{AnalysisError, Result};
use crate::scoring::client::{BlobLocation, JobRequest, RemoteStatus, ScoringService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Submitted,
    Started,
    Polling,
    Finished,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finished | JobState::Failed | JobState::Cancelled | JobState::TimedOut
        )
    }
}

/// What happened to one job, for logs and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Option<String>,
    pub state: Option<JobState>,
    pub history: Vec<JobState>,
    pub polls: usize,
    pub submitted_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub struct ScoringJob<'a> {
    service: &'a dyn ScoringService,
    poll_interval: Duration,
    timeout: Duration,
    report: JobReport,
}

impl<'a> ScoringJob<'a> {
    pub fn new(service: &'a dyn ScoringService, config: &ScoringConfig) -> Self {
        Self::with_timing(service, config.poll_interval, config.timeout)
    }

    pub fn with_timing(
        service: &'a dyn ScoringService,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            poll_interval,
            timeout,
            report: JobReport {
                job_id: None,
                state: None,
                history: Vec::new(),
                polls: 0,
                submitted_at: None,
                ended_at: None,
            },
        }
    }

    pub fn state(&self) -> Option<JobState> {
        self.report.state
    }

    pub fn report(&self) -> &JobReport {
        &self.report
    }

    fn transition(&mut self, next: JobState) {
        // Polling repeats once per attempt; record it once
        if self.report.state == Some(next) {
            return;
        }
        info!(
            "Scoring job {}: {:?} -> {:?}",
            self.report.job_id.as_deref().unwrap_or("-"),
            self.report.state,
            next
        );
        self.report.state = Some(next);
        self.report.history.push(next);
        if next.is_terminal() {
            self.report.ended_at = Some(Utc::now());
        }
    }

    /// Run the job to completion and return the scored CSV text.
    ///
    /// The result is fetched exactly once, and only after the service reports
    /// `Finished`. The job itself only becomes `Finished` once that fetch
    /// succeeds; a failed fetch, or a finished job without a result location,
    /// ends it as `Failed`.
    pub async fn run(&mut self, request: &JobRequest) -> Result<String> {
        let job_id = self.service.submit(request).await?;
        self.report.job_id = Some(job_id.clone());
        self.report.submitted_at = Some(Utc::now());
        self.transition(JobState::Submitted);

        self.service.start(&job_id).await?;
        self.transition(JobState::Started);

        let deadline = Instant::now() + self.timeout;
        let polled = tokio::time::timeout_at(deadline, self.poll_until_terminal(&job_id)).await;
        let location = match polled {
            Ok(Ok(location)) => location,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                self.transition(JobState::TimedOut);
                if let Err(e) = self.service.delete(&job_id).await {
                    warn!("Failed to delete timed out job {}: {}", job_id, e);
                }
                return Err(AnalysisError::Timeout {
                    job_id,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        match self.service.fetch(&location).await {
            Ok(text) => {
                self.transition(JobState::Finished);
                Ok(text)
            }
            Err(e) => {
                warn!("Failed to fetch result of job {}: {}", job_id, e);
                self.transition(JobState::Failed);
                Err(e)
            }
        }
    }

    async fn poll_until_terminal(&mut self, job_id: &str) -> Result<BlobLocation> {
        loop {
            self.transition(JobState::Polling);
            self.report.polls += 1;
            let status = self.service.poll(job_id).await?;

            match status.status {
                RemoteStatus::NotStarted | RemoteStatus::Running => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                RemoteStatus::Failed | RemoteStatus::Cancelled => {
                    self.transition(if status.status == RemoteStatus::Failed {
                        JobState::Failed
                    } else {
                        JobState::Cancelled
                    });
                    return Err(AnalysisError::JobFailed {
                        job_id: job_id.to_string(),
                        status: status.status.to_string(),
                        details: status.details.unwrap_or_default(),
                    });
                }
                RemoteStatus::Finished => match status.result_location {
                    Some(location) => return Ok(location),
                    None => {
                        self.transition(JobState::Failed);
                        return Err(AnalysisError::JobFailed {
                            job_id: job_id.to_string(),
                            status: status.status.to_string(),
                            details: "finished without a result location".to_string(),
                        });
                    }
                },
            }
        }
    }
}
