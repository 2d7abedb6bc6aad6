//! Scoring Module
//!
//! Client seam and job driver for the remote clustering service. Nothing in
//! here reads the scored data; the finished result text is handed to the
//! analysis pipeline unchanged.

pub mod client;
pub mod job;

pub use client::{
    BlobLocation, HttpScoringClient, JobRequest, JobStatus, RemoteStatus, ScoringService,
};
pub use job::{JobReport, JobState, ScoringJob};
