//! Cluster Aggregator - folds scored CSV rows into a cluster collection

use crate::config::{AnalysisConfig, DistanceModel};
use crate::error::{AnalysisError, Result};
use crate::ingestion::schema::Schema;
use crate::model::{ClusterCollection, Distance, OrderedMap, Point};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info};

/// Outcome of one ingestion pass
#[derive(Debug)]
pub struct Ingested {
    pub schema: Schema,
    pub collection: ClusterCollection,
    /// Body rows whose field count did not match the header
    pub dropped_rows: usize,
}

pub struct ClusterAggregator<'a> {
    schema: &'a Schema,
    distance_model: DistanceModel,
}

impl<'a> ClusterAggregator<'a> {
    pub fn new(schema: &'a Schema, distance_model: DistanceModel) -> Self {
        Self {
            schema,
            distance_model,
        }
    }

    /// Build the point for one accepted row; returns it with its raw label
    pub fn build_point(&self, record: &StringRecord, row: usize) -> Result<(String, Point)> {
        let label_index = self.schema.label_index();
        let headers = self.schema.headers();

        let mut features = OrderedMap::new();
        for (name, value) in headers.iter().zip(record.iter()).take(label_index) {
            features.insert(name.clone(), value.to_string());
        }

        let label = record.get(label_index).unwrap_or_default().to_string();
        let own_index = label
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|centroid| self.schema.centroid_index(centroid))
            .ok_or_else(|| AnalysisError::CentroidOffset {
                row,
                label: label.clone(),
            })?;

        // every distance column must parse, whichever model keeps it
        let mut own = 0.0;
        let mut centroids = OrderedMap::new();
        for index in label_index + 1..self.schema.field_count() {
            let value = parse_distance(record, index, headers, row)?;
            if index == own_index {
                own = value;
            }
            centroids.insert(headers[index].clone(), value);
        }

        let distance = match self.distance_model {
            DistanceModel::SingleNearestCentroid => Distance::Nearest(own),
            DistanceModel::AllCentroidDistances => Distance::AllCentroids { own, centroids },
        };

        Ok((label, Point::new(features, distance)))
    }
}

fn parse_distance(
    record: &StringRecord,
    index: usize,
    headers: &[String],
    row: usize,
) -> Result<f64> {
    let raw = record.get(index).unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AnalysisError::Parse {
            row,
            column: headers[index].clone(),
            value: raw.to_string(),
        })
}

/// Resolve the header and aggregate every body row of `raw_text`.
///
/// Rows are split on commas without quote handling. Rows whose field count
/// differs from the header are dropped; any unreadable distance aborts.
pub fn ingest(raw_text: &str, config: &AnalysisConfig) -> Result<Ingested> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(raw_text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(AnalysisError::Schema("input has no header row".to_string())),
    };
    let schema = Schema::resolve(header.iter().map(String::from).collect(), &config.label_column)?;
    info!(
        "Resolved schema: {} fields, label '{}' at index {}",
        schema.field_count(),
        config.label_column,
        schema.label_index()
    );

    let aggregator = ClusterAggregator::new(&schema, config.distance_model);
    let mut collection = ClusterCollection::new(schema.feature_names().to_vec());
    let mut dropped_rows = 0;

    for result in records {
        let record = result?;
        let row = record.position().map(|p| p.line() as usize).unwrap_or_default();
        if record.len() != schema.field_count() {
            debug!(
                "Dropping row {}: {} fields, expected {}",
                row,
                record.len(),
                schema.field_count()
            );
            dropped_rows += 1;
            continue;
        }
        let (label, point) = aggregator.build_point(&record, row)?;
        collection.insert(&label, point);
    }

    info!(
        "Aggregated {} points into {} clusters ({} rows dropped)",
        collection.total_valid_points(),
        collection.len(),
        dropped_rows
    );

    Ok(Ingested {
        schema,
        collection,
        dropped_rows,
    })
}
