// ===============================
// src/sink.rs
// ===============================
//
// Delivery of finished category documents. `FileSink` writes one HTML
// file per category; other transports plug in behind `ReportSink`.
//

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::fs;
use tracing::info;

use crate::domain::Category;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, category: Category, subject: &str, body: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    date: NaiveDate,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self { dir: dir.into(), date }
    }

    pub fn path_for(&self, category: Category) -> PathBuf {
        self.dir
            .join(format!("{}_{}.html", category.as_str(), self.date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn deliver(&self, category: Category, subject: &str, body: &str) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io { path: self.dir.clone(), source })?;

        let path = self.path_for(category);
        fs::write(&path, body)
            .await
            .map_err(|source| SinkError::Io { path: path.clone(), source })?;

        info!(category = category.as_str(), %subject, path = %path.display(), "report written");
        Ok(())
    }
}
