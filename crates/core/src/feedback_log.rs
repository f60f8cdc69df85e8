//! Append-only JSONL audit log for feedback events.
//!
//! Best-effort: a failed append is logged and dropped, it never fails the
//! request.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, request_id: &str, feedback: &str) {
        let entry = json!({
            "request_id": request_id,
            "feedback": feedback,
            "timestamp": Utc::now().timestamp_millis(),
        });
        match serde_json::to_string(&entry) {
            Ok(line) => {
                if let Err(err) = append_line(&self.path, &line) {
                    warn!(path = %self.path.display(), error = %err, "failed to append feedback entry");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize feedback entry"),
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
