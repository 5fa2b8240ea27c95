use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::agent_engine::state::ExecutionReport;
use crate::errors::DeskPilotResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub sequence_name: String,
    pub actions: usize,
    pub report: ExecutionReport,
}

/// Append-only JSONL log of finished runs.
pub struct RunHistory {
    file_path: PathBuf,
}

impl RunHistory {
    /// `runs.jsonl` in the user data directory.
    pub fn new() -> Self {
        Self::at(data_dir_or_cwd().join("runs.jsonl"))
    }

    pub fn at(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn append(&self, entry: &HistoryEntry) -> DeskPilotResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(
            path = %self.file_path.display(),
            sequence = %entry.report.sequence_id,
            "run history entry written"
        );
        Ok(())
    }

    /// All entries, skipping lines that no longer parse.
    pub fn load(&self) -> DeskPilotResult<Vec<HistoryEntry>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.file_path)?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable history line");
                    None
                }
            })
            .collect())
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data_local_dir>/deskpilot`, falling back to the working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        let dir = base.join("deskpilot");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::SequenceStatus;

    fn entry(id: &str, status: SequenceStatus) -> HistoryEntry {
        HistoryEntry {
            ts: 1,
            sequence_name: "demo".into(),
            actions: 2,
            report: ExecutionReport {
                sequence_id: id.into(),
                status,
                success_count: 1,
                failure_count: 1,
                elapsed_ms: 42,
                error: None,
            },
        }
    }

    #[test]
    fn append_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::at(dir.path().join("runs.jsonl"));
        assert!(history.load().unwrap().is_empty());

        history.append(&entry("a", SequenceStatus::Completed)).unwrap();
        history.append(&entry("b", SequenceStatus::Failed)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(history.path())
            .and_then(|mut f| writeln!(f, "not json"))
            .unwrap();

        let loaded = history.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], entry("b", SequenceStatus::Failed));
    }
}
