//! Ingestion Module
//!
//! Turns the raw scored CSV text into a cluster collection:
//! - Schema resolution from the header row
//! - Row shape validation (mismatched rows are dropped, not errors)
//! - Cluster aggregation in first-seen order

pub mod aggregator;
pub mod schema;

pub use aggregator::{ingest, ClusterAggregator, Ingested};
pub use schema::Schema;
