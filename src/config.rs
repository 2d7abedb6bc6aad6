//! Configuration - analysis policy set and injected service settings
//!
//! Analysis knobs are plain data with defaults and can be loaded from a JSON
//! file. Endpoints and credentials only ever come from the environment.

use crate::error::{AnalysisError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LABEL_COLUMN: &str = "Cluster Label";

/// How the reference cluster size for the ratio rule is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Size of the single largest cluster
    BiggestCluster,
    /// Valid points divided by number of clusters
    MeanClusterSize,
}

/// Which distance columns a point carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Only the distance to the point's own centroid
    SingleNearestCentroid,
    /// Distance to every centroid column
    AllCentroidDistances,
}

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Header name of the cluster assignment column (default: "Cluster Label")
    pub label_column: String,

    /// Reference size policy for the ratio rule (default: BiggestCluster)
    pub reference_policy: ReferencePolicy,

    /// Distance layout of the scored rows (default: SingleNearestCentroid)
    pub distance_model: DistanceModel,

    /// Flag clusters holding less than `population_ratio_threshold` of all
    /// points. Only valid with `MeanClusterSize`.
    pub secondary_population_rule: bool,

    /// size / reference below this flags the cluster (default: 0.1)
    pub cluster_ratio_threshold: f64,

    /// size / total below this flags the cluster (default: 0.05)
    pub population_ratio_threshold: f64,

    /// Number of standard deviations a point may sit from its cluster mean
    /// (default: 2.0)
    pub z_score_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            reference_policy: ReferencePolicy::BiggestCluster,
            distance_model: DistanceModel::SingleNearestCentroid,
            secondary_population_rule: false,
            cluster_ratio_threshold: 0.1,
            population_ratio_threshold: 0.05,
            z_score_threshold: 2.0,
        }
    }
}

impl AnalysisConfig {
    /// Mean-cluster-size reference with the 5% population rule switched on
    pub fn mean_cluster_size() -> Self {
        Self {
            reference_policy: ReferencePolicy::MeanClusterSize,
            secondary_population_rule: true,
            ..Self::default()
        }
    }

    pub fn with_distance_model(mut self, distance_model: DistanceModel) -> Self {
        self.distance_model = distance_model;
        self
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.label_column.is_empty() {
            return Err(AnalysisError::Config("label_column must not be empty".to_string()));
        }
        if self.secondary_population_rule
            && self.reference_policy != ReferencePolicy::MeanClusterSize
        {
            return Err(AnalysisError::Config(
                "secondary_population_rule requires the mean_cluster_size reference policy"
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("cluster_ratio_threshold", self.cluster_ratio_threshold),
            ("population_ratio_threshold", self.population_ratio_threshold),
            ("z_score_threshold", self.z_score_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Remote scoring service settings
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub api_url: String,
    pub api_key: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Name of the job output holding the scored CSV
    pub output_name: String,
}

impl ScoringConfig {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            api_url,
            api_key,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
            output_name: "output1".to_string(),
        }
    }

    /// Reads SCORING_API_URL, SCORING_API_KEY, SCORING_POLL_INTERVAL_SECS,
    /// SCORING_TIMEOUT_SECS and SCORING_OUTPUT_NAME.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            required_env("SCORING_API_URL")?,
            required_env("SCORING_API_KEY")?,
        );
        if let Some(secs) = optional_secs("SCORING_POLL_INTERVAL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = optional_secs("SCORING_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(name) = std::env::var("SCORING_OUTPUT_NAME") {
            config.output_name = name;
        }
        Ok(config)
    }
}

/// Result container settings for the blob sink
#[derive(Debug, Clone)]
pub struct BlobSinkConfig {
    pub container_url: String,
    /// SAS query string, with or without the leading '?'
    pub sas_token: Option<String>,
}

impl BlobSinkConfig {
    /// Reads RESULT_CONTAINER_URL and RESULT_CONTAINER_SAS.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            container_url: required_env("RESULT_CONTAINER_URL")?,
            sas_token: std::env::var("RESULT_CONTAINER_SAS").ok(),
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| AnalysisError::Config(format!("{} must be set", name)))
}

fn optional_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| {
                AnalysisError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    name, raw
                ))
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.label_column, "Cluster Label");
        assert_eq!(config.reference_policy, ReferencePolicy::BiggestCluster);
    }

    #[test]
    fn test_population_rule_requires_mean_policy() {
        let config = AnalysisConfig {
            secondary_population_rule: true,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
        assert!(AnalysisConfig::mean_cluster_size().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"reference_policy": "mean_cluster_size", "distance_model": "all_centroid_distances"}"#,
        )
        .unwrap();
        assert_eq!(config.reference_policy, ReferencePolicy::MeanClusterSize);
        assert_eq!(config.distance_model, DistanceModel::AllCentroidDistances);
        assert_eq!(config.z_score_threshold, 2.0);
        assert!(!config.secondary_population_rule);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = AnalysisConfig {
            z_score_threshold: -1.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
