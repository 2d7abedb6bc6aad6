//! Anomaly Classifier
//!
//! Runs once over a finished cluster collection. Scarce clusters are flagged
//! as a whole by the population-ratio rules; every other cluster has its
//! points checked against a z-score band around the cluster's mean distance.

use crate::config::{AnalysisConfig, ReferencePolicy};
use crate::error::{AnalysisError, Result};
use crate::model::{Cluster, ClusterCollection};
use serde::Serialize;
use tracing::{debug, info};

/// Which rule decided a cluster's outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ClusterDecision {
    /// size / reference fell below the cluster ratio threshold
    RatioRule { ratio: f64 },
    /// size / total fell below the population ratio threshold
    PopulationRule { share: f64 },
    /// Points checked individually; `flagged` lie outside the band
    PointOutliers { flagged: usize, mean: f64, std_dev: f64 },
}

impl ClusterDecision {
    pub fn flags_cluster(&self) -> bool {
        !matches!(self, ClusterDecision::PointOutliers { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterVerdict {
    pub cluster_id: String,
    pub size: usize,
    pub decision: ClusterDecision,
}

/// Per-run record of what the classifier decided
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSummary {
    pub reference_policy: ReferencePolicy,
    pub reference_size: f64,
    pub total_valid_points: usize,
    pub verdicts: Vec<ClusterVerdict>,
}

impl ClassificationSummary {
    pub fn anomalous_clusters(&self) -> usize {
        self.verdicts.iter().filter(|v| v.decision.flags_cluster()).count()
    }

    /// Points flagged by the z-score rule (cluster-level flags not counted)
    pub fn outlier_points(&self) -> usize {
        self.verdicts
            .iter()
            .map(|v| match v.decision {
                ClusterDecision::PointOutliers { flagged, .. } => flagged,
                _ => 0,
            })
            .sum()
    }
}

pub struct AnomalyClassifier {
    reference_policy: ReferencePolicy,
    population_rule: bool,
    cluster_ratio_threshold: f64,
    population_ratio_threshold: f64,
    z_score_threshold: f64,
}

impl AnomalyClassifier {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            reference_policy: config.reference_policy,
            // the population rule only exists alongside the mean reference
            population_rule: config.secondary_population_rule
                && config.reference_policy == ReferencePolicy::MeanClusterSize,
            cluster_ratio_threshold: config.cluster_ratio_threshold,
            population_ratio_threshold: config.population_ratio_threshold,
            z_score_threshold: config.z_score_threshold,
        }
    }

    /// Size every cluster is compared against by the ratio rule
    pub fn reference_size(&self, collection: &ClusterCollection) -> f64 {
        match self.reference_policy {
            ReferencePolicy::BiggestCluster => collection.largest_cluster_size() as f64,
            ReferencePolicy::MeanClusterSize => {
                collection.total_valid_points() as f64 / collection.len() as f64
            }
        }
    }

    /// Set anomaly flags on `collection`. Flags are only ever raised, so a
    /// second pass over the same collection leaves them unchanged.
    pub fn classify(&self, collection: &mut ClusterCollection) -> Result<ClassificationSummary> {
        if collection.is_empty() || collection.total_valid_points() == 0 {
            return Err(AnalysisError::EmptyCollection);
        }

        let reference_size = self.reference_size(collection);
        let total = collection.total_valid_points() as f64;
        info!(
            "Classifying {} clusters ({:?} reference size {:.2})",
            collection.len(),
            self.reference_policy,
            reference_size
        );

        let mut verdicts = Vec::with_capacity(collection.len());
        for cluster in collection.iter_mut() {
            let decision = self.decide(cluster, reference_size, total);
            debug!("Cluster '{}' ({} points): {:?}", cluster.id(), cluster.size(), decision);
            verdicts.push(ClusterVerdict {
                cluster_id: cluster.id().to_string(),
                size: cluster.size(),
                decision,
            });
        }

        let summary = ClassificationSummary {
            reference_policy: self.reference_policy,
            reference_size,
            total_valid_points: collection.total_valid_points(),
            verdicts,
        };
        info!(
            "{} anomalous clusters, {} outlier points",
            summary.anomalous_clusters(),
            summary.outlier_points()
        );
        Ok(summary)
    }

    fn decide(&self, cluster: &mut Cluster, reference_size: f64, total: f64) -> ClusterDecision {
        let size = cluster.size() as f64;

        let ratio = size / reference_size;
        if ratio < self.cluster_ratio_threshold {
            cluster.mark_anomalous();
            return ClusterDecision::RatioRule { ratio };
        }

        let share = size / total;
        if self.population_rule && share < self.population_ratio_threshold {
            cluster.mark_anomalous();
            return ClusterDecision::PopulationRule { share };
        }

        let stats = cluster.distance_stats();
        let band = self.z_score_threshold * stats.std_dev;
        let (lower, upper) = (stats.mean - band, stats.mean + band);
        let mut flagged = 0;
        for point in cluster.points_mut() {
            let d = point.distance().own();
            if d > upper || d < lower {
                point.mark_anomalous();
                flagged += 1;
            }
        }

        ClusterDecision::PointOutliers {
            flagged,
            mean: stats.mean,
            std_dev: stats.std_dev,
        }
    }
}
