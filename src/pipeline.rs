//! Analysis Pipeline
//!
//! raw text -> schema -> clusters -> anomaly flags -> artifacts -> sink

use crate::classifier::{AnomalyClassifier, ClassificationSummary};
use crate::config::{AnalysisConfig, ScoringConfig};
use crate::error::Result;
use crate::ingestion::ingest;
use crate::model::ClusterCollection;
use crate::output::Artifacts;
use crate::scoring::{JobReport, JobRequest, ScoringJob, ScoringService};
use crate::sink::ArtifactSink;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Everything one analysis run produced
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub run_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub collection: ClusterCollection,
    pub summary: ClassificationSummary,
    pub dropped_rows: usize,
    pub artifacts: Artifacts,
}

/// Analyze one complete scored result text.
///
/// All-or-nothing: any error aborts before artifacts exist.
pub fn analyze(raw_text: &str, config: &AnalysisConfig) -> Result<AnalysisOutcome> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    info!("Analysis run {} started ({} bytes)", run_id, raw_text.len());

    let ingested = ingest(raw_text, config)?;
    let mut collection = ingested.collection;
    let summary = AnomalyClassifier::new(config).classify(&mut collection)?;
    let artifacts = Artifacts::render(&collection)?;

    Ok(AnalysisOutcome {
        run_id,
        analyzed_at: Utc::now(),
        collection,
        summary,
        dropped_rows: ingested.dropped_rows,
        artifacts,
    })
}

/// Store both artifacts, JSON summary first
pub async fn publish(artifacts: &Artifacts, sink: &dyn ArtifactSink) -> Result<()> {
    for (name, content) in artifacts.named() {
        sink.store(name, content).await?;
    }
    info!("Published artifacts to {}", sink.describe());
    Ok(())
}

/// Run a remote scoring job, then analyze and publish its result.
///
/// Failed, cancelled or timed out jobs never reach the analysis.
pub async fn score_and_analyze(
    service: &dyn ScoringService,
    scoring: &ScoringConfig,
    request: &JobRequest,
    config: &AnalysisConfig,
    sink: &dyn ArtifactSink,
) -> (JobReport, Result<AnalysisOutcome>) {
    let mut job = ScoringJob::new(service, scoring);
    let result = match job.run(request).await {
        Ok(raw_text) => match analyze(&raw_text, config) {
            Ok(outcome) => publish(&outcome.artifacts, sink).await.map(|_| outcome),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    (job.report().clone(), result)
}
