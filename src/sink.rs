//! Artifact Sinks - where result artifacts are stored
//!
//! Implementations:
//! - DirectorySink: files under a local directory
//! - MemorySink: kept in memory (tests, dry runs)
//! - BlobSink: HTTP PUT into a blob container

use crate::config::BlobSinkConfig;
use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, name: &str, content: &str) -> Result<()>;

    /// Human-readable target, used in logs
    fn describe(&self) -> String;
}

pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn store(&self, name: &str, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, content).await?;
        info!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[derive(Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything stored so far, in store order
    pub fn stored(&self) -> Vec<(String, String)> {
        self.stored.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.stored()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, content)| content)
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn store(&self, name: &str, content: &str) -> Result<()> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| AnalysisError::Sink("memory sink lock poisoned".to_string()))?;
        stored.push((name.to_string(), content.to_string()));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub struct BlobSink {
    client: reqwest::Client,
    config: BlobSinkConfig,
}

impl BlobSink {
    pub fn new(config: BlobSinkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn blob_url(&self, name: &str) -> String {
        let base = self.config.container_url.trim_end_matches('/');
        match self.config.sas_token.as_deref() {
            Some(sas) if !sas.is_empty() => {
                format!("{}/{}?{}", base, name, sas.trim_start_matches('?'))
            }
            _ => format!("{}/{}", base, name),
        }
    }
}

#[async_trait]
impl ArtifactSink for BlobSink {
    async fn store(&self, name: &str, content: &str) -> Result<()> {
        let response = self
            .client
            .put(self.blob_url(name))
            .header("x-ms-blob-type", "BlockBlob")
            .body(content.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        info!("Uploaded {} to {}", name, self.config.container_url);
        Ok(())
    }

    fn describe(&self) -> String {
        self.config.container_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.store("result.json", "[]").await.unwrap();
        sink.store("result.csv", "a\n").await.unwrap();

        let names: Vec<String> = sink.stored().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["result.json", "result.csv"]);
        assert_eq!(sink.get("result.csv").as_deref(), Some("a\n"));
    }

    #[tokio::test]
    async fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));
        sink.store("result.json", "[]").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("out/result.json")).unwrap();
        assert_eq!(written, "[]");
    }

    #[test]
    fn test_blob_url_with_sas() {
        let sink = BlobSink::new(BlobSinkConfig {
            container_url: "https://acct.blob.example.net/results/".to_string(),
            sas_token: Some("?sv=1&sig=abc".to_string()),
        });
        assert_eq!(
            sink.blob_url("result.csv"),
            "https://acct.blob.example.net/results/result.csv?sv=1&sig=abc"
        );
    }
}
