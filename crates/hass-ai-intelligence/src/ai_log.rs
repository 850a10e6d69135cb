//! Daily JSONL log of every prompt, response and agent error
//!
//! Files are named `ai_interactions_YYYY-MM-DD.jsonl` (local date) and hold
//! one `{timestamp, type, data}` object per line. Logging never fails a scan:
//! write errors are reported with `warn!` and otherwise ignored.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Entries returned by [`AiLogger::recent`] by default
pub const RECENT_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Prompt,
    Response,
    Error,
}

/// One line of the interaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiLogEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub data: Value,
}

pub struct AiLogger {
    dir: PathBuf,
    provider: String,
    write_lock: Mutex<()>,
}

impl AiLogger {
    pub fn new(dir: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            provider: provider.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("ai_interactions_{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub async fn log_prompt(&self, batch_num: u32, prompt: &str, entity_ids: &[&str]) {
        let data = json!({
            "batch_num": batch_num,
            "ai_provider": self.provider,
            "prompt": prompt,
            "prompt_length": prompt.len(),
            "entity_count": entity_ids.len(),
            "entities": entity_ids,
        });
        self.append(LogKind::Prompt, data).await;
    }

    pub async fn log_response(&self, batch_num: u32, raw: &str, parsing_successful: bool) {
        let parsed_data = serde_json::from_str::<Value>(crate::parser::strip_fences(raw)).ok();
        let data = json!({
            "batch_num": batch_num,
            "ai_provider": self.provider,
            "raw_response": raw,
            "response_length": raw.len(),
            "parsed_data": parsed_data,
            "parsing_successful": parsing_successful,
        });
        self.append(LogKind::Response, data).await;
    }

    pub async fn log_error(&self, batch_num: u32, error: &str, context: &str) {
        let data = json!({
            "batch_num": batch_num,
            "ai_provider": self.provider,
            "error": error,
            "context": context,
        });
        self.append(LogKind::Error, data).await;
    }

    async fn append(&self, kind: LogKind, data: Value) {
        let now = Local::now();
        let entry = AiLogEntry {
            timestamp: now.to_rfc3339(),
            kind,
            data,
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode AI log entry");
                return;
            }
        };
        line.push('\n');

        let path = self.file_for(now.date_naive());
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.write_line(&path, &line).await {
            warn!(path = %path.display(), error = %e, "failed to write AI log");
        }
    }

    async fn write_line(&self, path: &Path, line: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Last `limit` entries of today's file, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<AiLogEntry> {
        let path = self.file_for(Local::now().date_naive());
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no AI log for today");
                return Vec::new();
            }
        };

        let entries: Vec<AiLogEntry> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let skip = entries.len().saturating_sub(limit);
        entries.into_iter().skip(skip).collect()
    }
}
