use crate::config::PredictionLogConfig;
use crate::ml::models::PredictionResult;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source label used for predictions that did not come from an upload
pub const MANUAL_SOURCE: &str = "Manual";

/// One parsed prediction log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub filename: String,
    pub prediction: String,
    pub probability: f64,
}

/// Append-only, pipe-delimited prediction log
#[derive(Debug, Clone)]
pub struct PredictionLog {
    path: PathBuf,
    history_scan: usize,
    history_limit: usize,
}

impl PredictionLog {
    pub fn new(config: &PredictionLogConfig) -> Self {
        Self {
            path: config.prediction_log_path.clone(),
            history_scan: config.history_scan,
            history_limit: config.history_limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render one log line (without the trailing newline)
    pub fn format_line<Tz: TimeZone>(
        timestamp: &DateTime<Tz>,
        source: Option<&str>,
        result: &PredictionResult,
    ) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "{} | File: {} | Prediction: {} | Probability: {:.3}",
            timestamp.format(TIMESTAMP_FORMAT),
            source.filter(|s| !s.is_empty()).unwrap_or(MANUAL_SOURCE),
            result.label,
            result.probability
        )
    }

    /// Parse one log line, `None` when malformed
    pub fn parse_line(line: &str) -> Option<HistoryEntry> {
        let parts: Vec<&str> = line.trim().split(" | ").collect();
        let [timestamp, file, prediction, probability] = parts.as_slice() else {
            return None;
        };

        NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

        Some(HistoryEntry {
            timestamp: timestamp.to_string(),
            filename: file.strip_prefix("File: ")?.to_string(),
            prediction: prediction.strip_prefix("Prediction: ")?.to_string(),
            probability: probability
                .strip_prefix("Probability: ")?
                .trim()
                .parse()
                .ok()?,
        })
    }

    /// Append a prediction. Best effort: failures are logged, never returned.
    pub async fn append(&self, source: Option<&str>, result: &PredictionResult) {
        let line = format!("{}\n", Self::format_line(&Local::now(), source, result));

        if let Err(e) = self.write(&line).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write prediction log"
            );
        }
    }

    async fn write(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Most recent entries among the trailing lines of the log
    pub async fn history(&self) -> std::io::Result<Vec<HistoryEntry>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Prediction log not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let scanned = &lines[lines.len().saturating_sub(self.history_scan)..];

        let entries: Vec<HistoryEntry> = scanned
            .iter()
            .filter_map(|line| Self::parse_line(line))
            .collect();

        let skip = entries.len().saturating_sub(self.history_limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}
