use async_trait::async_trait;
use cluster_anomaly::scoring::{
    BlobLocation, JobRequest, JobState, JobStatus, RemoteStatus, ScoringJob, ScoringService,
};
use cluster_anomaly::sink::MemorySink;
use cluster_anomaly::{score_and_analyze, AnalysisConfig, AnalysisError, ScoringConfig};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const RESULT_TEXT: &str = "a,Cluster Label,d0,d1\nx,0,1.0,5.0\ny,0,1.2,5.0\nz,0,1.1,5.0\nw,1,6.0,0.5\n";

/// Replays a fixed sequence of poll results; keeps reporting Running once the
/// script is exhausted.
struct ScriptedService {
    statuses: Mutex<VecDeque<JobStatus>>,
    calls: Mutex<Vec<String>>,
    fetch_fails: bool,
}

impl ScriptedService {
    fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            calls: Mutex::new(Vec::new()),
            fetch_fails: false,
        }
    }

    fn failing_fetch(statuses: Vec<JobStatus>) -> Self {
        Self {
            fetch_fails: true,
            ..Self::new(statuses)
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl ScoringService for ScriptedService {
    async fn submit(&self, _request: &JobRequest) -> cluster_anomaly::Result<String> {
        self.record("submit");
        Ok("job-1".to_string())
    }

    async fn start(&self, job_id: &str) -> cluster_anomaly::Result<()> {
        assert_eq!(job_id, "job-1");
        self.record("start");
        Ok(())
    }

    async fn poll(&self, _job_id: &str) -> cluster_anomaly::Result<JobStatus> {
        self.record("poll");
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| JobStatus::new(RemoteStatus::Running)))
    }

    async fn fetch(&self, location: &BlobLocation) -> cluster_anomaly::Result<String> {
        assert_eq!(location.relative_location, "/out/result.csv");
        self.record("fetch");
        if self.fetch_fails {
            return Err(AnalysisError::Remote {
                status: 403,
                body: "AuthenticationFailed".to_string(),
            });
        }
        Ok(RESULT_TEXT.to_string())
    }

    async fn delete(&self, _job_id: &str) -> cluster_anomaly::Result<()> {
        self.record("delete");
        Ok(())
    }
}

fn finished() -> JobStatus {
    JobStatus {
        status: RemoteStatus::Finished,
        result_location: Some(BlobLocation {
            base_location: "https://store.example.net".to_string(),
            relative_location: "/out/result.csv".to_string(),
            sas_blob_token: String::new(),
        }),
        details: None,
    }
}

fn fast_config() -> ScoringConfig {
    let mut config =
        ScoringConfig::new("https://scoring.example.net".to_string(), "key".to_string());
    config.poll_interval = Duration::from_millis(5);
    config.timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn test_finished_job_is_analyzed_once() {
    let service = ScriptedService::new(vec![
        JobStatus::new(RemoteStatus::NotStarted),
        JobStatus::new(RemoteStatus::Running),
        finished(),
    ]);
    let sink = MemorySink::new();

    let (report, result) = score_and_analyze(
        &service,
        &fast_config(),
        &JobRequest::default(),
        &AnalysisConfig::default(),
        &sink,
    )
    .await;
    let outcome = result.unwrap();

    assert_eq!(
        report.history,
        vec![JobState::Submitted, JobState::Started, JobState::Polling, JobState::Finished]
    );
    assert_eq!(report.polls, 3);
    assert_eq!(service.count("fetch"), 1);
    assert_eq!(service.count("delete"), 0);
    assert_eq!(outcome.collection.total_valid_points(), 4);
    assert_eq!(sink.stored().len(), 2);
}

#[tokio::test]
async fn test_failed_job_skips_analysis() {
    let mut failed = JobStatus::new(RemoteStatus::Failed);
    failed.details = Some("model crashed".to_string());
    let service = ScriptedService::new(vec![JobStatus::new(RemoteStatus::Running), failed]);
    let sink = MemorySink::new();

    let (report, result) = score_and_analyze(
        &service,
        &fast_config(),
        &JobRequest::default(),
        &AnalysisConfig::default(),
        &sink,
    )
    .await;

    match result {
        Err(AnalysisError::JobFailed { status, details, .. }) => {
            assert_eq!(status, "Failed");
            assert_eq!(details, "model crashed");
        }
        other => panic!("unexpected result: {:?}", other.map(|o| o.run_id)),
    }
    assert_eq!(report.state, Some(JobState::Failed));
    assert_eq!(service.count("fetch"), 0);
    assert!(sink.stored().is_empty());
}

#[tokio::test]
async fn test_cancelled_job_is_terminal() {
    let service = ScriptedService::new(vec![JobStatus::new(RemoteStatus::Cancelled)]);
    let mut job = ScoringJob::new(&service, &fast_config());

    let err = job.run(&JobRequest::default()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::JobFailed { .. }));
    assert_eq!(job.state(), Some(JobState::Cancelled));
    assert_eq!(service.calls(), vec!["submit", "start", "poll"]);
}

#[tokio::test]
async fn test_deadline_deletes_remote_job() {
    let service = ScriptedService::new(vec![]);
    let mut job =
        ScoringJob::with_timing(&service, Duration::from_millis(10), Duration::from_millis(60));

    let err = job.run(&JobRequest::default()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Timeout { .. }));
    assert_eq!(job.state(), Some(JobState::TimedOut));
    assert_eq!(service.count("delete"), 1);
    assert_eq!(service.count("fetch"), 0);
    assert!(job.report().polls >= 2);
}

#[tokio::test]
async fn test_failed_fetch_ends_job_as_failed() {
    let service = ScriptedService::failing_fetch(vec![finished()]);
    let sink = MemorySink::new();

    let (report, result) = score_and_analyze(
        &service,
        &fast_config(),
        &JobRequest::default(),
        &AnalysisConfig::default(),
        &sink,
    )
    .await;

    assert!(matches!(result, Err(AnalysisError::Remote { status: 403, .. })));
    assert_eq!(report.state, Some(JobState::Failed));
    assert!(!report.history.contains(&JobState::Finished));
    assert_eq!(service.count("fetch"), 1);
    assert!(sink.stored().is_empty());
}

#[tokio::test]
async fn test_finished_without_location_is_failed() {
    let service = ScriptedService::new(vec![JobStatus::new(RemoteStatus::Finished)]);
    let mut job = ScoringJob::new(&service, &fast_config());

    let err = job.run(&JobRequest::default()).await.unwrap_err();
    assert!(matches!(err, AnalysisError::JobFailed { .. }));
    assert_eq!(job.state(), Some(JobState::Failed));
    assert_eq!(service.count("fetch"), 0);
}
