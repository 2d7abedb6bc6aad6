//! Schema Resolver - locates the cluster label column in the header row

use crate::error::{AnalysisError, Result};
use serde::Serialize;

/// Column layout of a scored result file
///
/// Columns before the label are features, columns after it are centroid
/// distances.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schema {
    label_index: usize,
    headers: Vec<String>,
}

impl Schema {
    pub fn resolve(headers: Vec<String>, label_column: &str) -> Result<Self> {
        let label_index = headers
            .iter()
            .position(|h| h == label_column)
            .ok_or_else(|| {
                AnalysisError::Schema(format!(
                    "header has no '{}' column (found: {})",
                    label_column,
                    headers.join(", ")
                ))
            })?;

        Ok(Self { label_index, headers })
    }

    pub fn label_index(&self) -> usize {
        self.label_index
    }

    /// Number of fields every accepted row must have
    pub fn field_count(&self) -> usize {
        self.headers.len()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn feature_names(&self) -> &[String] {
        &self.headers[..self.label_index]
    }

    pub fn centroid_columns(&self) -> &[String] {
        &self.headers[self.label_index + 1..]
    }

    /// Column index of the distance to centroid number `centroid`
    pub fn centroid_index(&self, centroid: usize) -> Option<usize> {
        let index = self.label_index.checked_add(1)?.checked_add(centroid)?;
        (index < self.headers.len()).then_some(index)
    }
}
