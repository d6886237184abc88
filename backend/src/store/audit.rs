use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SubmissionCreated,
    SubmissionsRead,
    SubmissionRead,
    SubmissionDeleted,
    ErasureRequest,
    ExportRequest,
    RetentionCleanup,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub details: Value,
}

/// Append-only JSON-lines log. Entries are never rewritten.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, action: AuditAction, details: Value) -> io::Result<()> {
        self.append_at(action, details, Utc::now())
    }

    pub fn append_at(&self, action: AuditAction, details: Value, now: DateTime<Utc>) -> io::Result<()> {
        let entry = AuditEntry {
            timestamp: now,
            action,
            details,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditAction, AuditEntry, AuditLog};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path().join("audit.log"));
        log.append(AuditAction::SubmissionCreated, json!({"id": "a"}))
            .expect("append");
        log.append(AuditAction::SubmissionDeleted, json!({"id": "a"}))
            .expect("append");

        let content = std::fs::read_to_string(log.path()).expect("read log");
        let entries: Vec<AuditEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid entry"))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::SubmissionCreated);
        assert_eq!(entries[1].action, AuditAction::SubmissionDeleted);
        assert!(content.contains("\"SUBMISSION_CREATED\""));
    }
}
