use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Parse error at row {row}, column '{column}': cannot read '{value}' as a distance")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Centroid offset error at row {row}: label '{label}' names no distance column")]
    CentroidOffset { row: usize, label: String },

    #[error("Cannot classify an empty cluster collection")]
    EmptyCollection,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Scoring job {job_id} ended as {status}: {details}")]
    JobFailed {
        job_id: String,
        status: String,
        details: String,
    },

    #[error("Scoring job {job_id} did not finish within {seconds}s")]
    Timeout { job_id: String, seconds: u64 },

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
