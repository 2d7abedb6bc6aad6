//! Post-processing of clustering results.
//!
//! Takes the scored CSV produced by a remote clustering service, groups points
//! by cluster label, flags anomalous clusters and points, and renders a JSON
//! summary plus a flat CSV table.

pub mod classifier;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod scoring;
pub mod sink;

pub use classifier::{AnomalyClassifier, ClassificationSummary, ClusterDecision};
pub use config::{AnalysisConfig, DistanceModel, ReferencePolicy, ScoringConfig};
pub use error::{AnalysisError, Result};
pub use model::{Cluster, ClusterCollection, Distance, Point};
pub use output::Artifacts;
pub use pipeline::{analyze, publish, score_and_analyze, AnalysisOutcome};
