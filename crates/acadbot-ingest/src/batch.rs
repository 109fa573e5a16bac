//! Status tracking for multi-file uploads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Processing state of one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl FileStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Processing,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// `<name>_<size>`, unique within the batch.
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-file and overall progress of one upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchState {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileEntry>,
}

pub fn file_key(name: &str, size: u64) -> String {
    format!("{}_{}", name, size)
}

/// `batch_` + the first 12 hex chars of SHA-256 over the sorted file keys.
pub fn batch_id<'a>(files: impl IntoIterator<Item = (&'a str, u64)>) -> String {
    let mut keys: Vec<String> = files.into_iter().map(|(n, s)| file_key(n, s)).collect();
    keys.sort();
    let digest = Sha256::digest(keys.join("|").as_bytes());
    format!("batch_{}", &hex::encode(digest)[..12])
}

impl BatchState {
    /// New batch with every file pending. `files` holds (name, size) pairs.
    pub fn new(files: &[(String, u64)]) -> Self {
        Self {
            batch_id: batch_id(files.iter().map(|(n, s)| (n.as_str(), *s))),
            created_at: Utc::now(),
            files: files
                .iter()
                .map(|(name, size)| FileEntry {
                    key: file_key(name, *size),
                    filename: name.clone(),
                    size: *size,
                    status: FileStatus::Pending,
                    error: None,
                    file_id: None,
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
        }
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut FileEntry> {
        self.files.iter_mut().find(|f| f.key == key)
    }

    /// Update one file. Returns false if the key is not part of the batch.
    pub fn update(&mut self, key: &str, status: FileStatus, error: Option<String>) -> bool {
        let Some(entry) = self.entry_mut(key) else {
            return false;
        };
        entry.status = status;
        if error.is_some() {
            entry.error = error;
        }
        match status {
            FileStatus::Processing => entry.started_at = Some(Utc::now()),
            FileStatus::Success | FileStatus::Failed => entry.finished_at = Some(Utc::now()),
            FileStatus::Pending => {}
        }
        true
    }

    /// Record the registry id a file was stored under.
    pub fn set_file_id(&mut self, key: &str, file_id: impl Into<String>) {
        if let Some(entry) = self.entry_mut(key) {
            entry.file_id = Some(file_id.into());
        }
    }

    fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn success_count(&self) -> usize {
        self.count(FileStatus::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    pub fn completed_count(&self) -> usize {
        self.files.iter().filter(|f| f.status.is_finished()).count()
    }

    pub fn overall_status(&self) -> BatchStatus {
        let completed = self.completed_count();
        if completed == self.total() {
            BatchStatus::Completed
        } else if completed > 0 || self.count(FileStatus::Processing) > 0 {
            BatchStatus::Processing
        } else {
            BatchStatus::Idle
        }
    }

    /// Fraction of finished files; an empty batch is complete.
    pub fn progress(&self) -> f64 {
        if self.files.is_empty() {
            return 1.0;
        }
        self.completed_count() as f64 / self.total() as f64
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .map(|f| f.key.as_str())
            .collect()
    }

    /// e.g. `Total 3 files - success: 2 | failed: 1`.
    pub fn summary(&self) -> String {
        let success = self.success_count();
        let failed = self.failed_count();
        let pending = self.total() - success - failed;

        let mut parts = Vec::new();
        if success > 0 {
            parts.push(format!("success: {}", success));
        }
        if failed > 0 {
            parts.push(format!("failed: {}", failed));
        }
        if pending > 0 {
            parts.push(format!("pending: {}", pending));
        }

        if parts.is_empty() {
            format!("Total {} files", self.total())
        } else {
            format!("Total {} files - {}", self.total(), parts.join(" | "))
        }
    }
}
