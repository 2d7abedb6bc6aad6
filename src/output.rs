//! Result Serializer - renders a classified cluster collection
//!
//! Two renderings of the same collection: a JSON summary with one record per
//! cluster, and a flat CSV table with one row per point.
//!
//! The table is written without quoting, matching how the scored input is
//! read, so feature values come back out exactly as they went in.

use crate::error::{AnalysisError, Result};
use crate::model::ClusterCollection;
use csv::{QuoteStyle, WriterBuilder};

pub const JSON_ARTIFACT: &str = "result.json";
pub const CSV_ARTIFACT: &str = "result.csv";

/// Both artifacts of one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub json: String,
    pub csv: String,
}

impl Artifacts {
    pub fn render(collection: &ClusterCollection) -> Result<Self> {
        Ok(Self {
            json: to_json_summary(collection)?,
            csv: to_flat_table(collection)?,
        })
    }

    /// (name, content) pairs in the order they are stored
    pub fn named(&self) -> [(&'static str, &str); 2] {
        [(JSON_ARTIFACT, self.json.as_str()), (CSV_ARTIFACT, self.csv.as_str())]
    }
}

pub fn to_json_summary(collection: &ClusterCollection) -> Result<String> {
    Ok(serde_json::to_string_pretty(collection)?)
}

/// Wraps the cluster id so numeric-looking ids are not parsed as numbers
/// downstream.
pub fn cluster_id_cell(id: &str) -> String {
    format!("_{}_", id)
}

pub fn to_flat_table(collection: &ClusterCollection) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());

    let mut header: Vec<&str> = collection.feature_names().iter().map(String::as_str).collect();
    header.push("anomaly");
    header.push("cluster_id");
    writer.write_record(&header)?;

    for cluster in collection.iter() {
        let id_cell = cluster_id_cell(cluster.id());
        for point in cluster.points() {
            let mut row: Vec<&str> = point.features().values().map(String::as_str).collect();
            row.push(if point.is_anomalous() { "true" } else { "false" });
            row.push(&id_cell);
            writer.write_record(&row)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AnalysisError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| AnalysisError::Sink(format!("CSV output is not UTF-8: {}", e)))
}
