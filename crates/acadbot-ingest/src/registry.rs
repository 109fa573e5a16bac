//! Registry of course PDFs added at runtime.
//!
//! Metadata lives in `document_metadata.json` inside the corpus directory and
//! is written only once a staged upload has been indexed successfully.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Local;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ingest::content_hash;
use acadbot_core::{Error, Result};

/// Metadata file name inside the corpus directory.
pub const METADATA_FILE: &str = "document_metadata.json";

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-]+").unwrap());

/// One registered course document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique file name in the corpus directory.
    pub file_id: String,
    pub original_filename: String,
    pub filepath: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    /// SHA-256 of the file bytes.
    pub hash: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub upload_time: String,
}

/// Human-readable size: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else {
        format!("{:.1} GB", b / (KB * KB * KB))
    }
}

/// Check an upload: `.pdf` name, non-empty, within the size limit, `%PDF-` header.
pub fn validate_pdf(name: &str, bytes: &[u8]) -> Result<()> {
    let is_pdf = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(Error::InvalidRequest(format!("{} is not a .pdf file", name)));
    }
    if bytes.is_empty() {
        return Err(Error::InvalidRequest(format!("{} is empty", name)));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(Error::InvalidRequest(format!(
            "{} is {}; the limit is {}",
            name,
            format_file_size(bytes.len() as u64),
            format_file_size(MAX_UPLOAD_BYTES as u64)
        )));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(Error::InvalidRequest(format!("{} is not a PDF document", name)));
    }
    Ok(())
}

/// `<stem>_<timestamp>_<8 hex>.pdf`, with the stem reduced to safe characters.
pub fn unique_filename(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let stem = UNSAFE_CHARS.replace_all(stem, "_");
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "document" } else { stem };

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.pdf", stem, timestamp, &suffix[..8])
}

/// Uploaded course documents and their metadata.
pub struct DocumentRegistry {
    corpus_dir: PathBuf,
    staging_dir: PathBuf,
    metadata_file: PathBuf,
    /// Content hashes staged in the corpus but not yet saved or discarded.
    /// Held while checking for duplicates and touching metadata.
    pending: Mutex<HashSet<String>>,
}

impl DocumentRegistry {
    pub fn new(corpus_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Result<Self> {
        let corpus_dir = corpus_dir.into();
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&corpus_dir)?;
        std::fs::create_dir_all(&staging_dir)?;
        Ok(Self {
            metadata_file: corpus_dir.join(METADATA_FILE),
            corpus_dir,
            staging_dir,
            pending: Mutex::new(HashSet::new()),
        })
    }

    fn load_metadata(&self) -> Result<BTreeMap<String, DocumentRecord>> {
        match std::fs::read_to_string(&self.metadata_file) {
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_metadata(&self, metadata: &BTreeMap<String, DocumentRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        let tmp = self.metadata_file.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.metadata_file)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Upload lifecycle
    // ---------------------------------------------------------------

    fn find_by_hash(&self, hash: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .load_metadata()?
            .into_values()
            .find(|r| r.hash == hash))
    }

    /// Registered document with the same content, if any.
    pub fn check_duplicate(&self, bytes: &[u8]) -> Result<Option<DocumentRecord>> {
        let _guard = self.pending.lock();
        self.find_by_hash(&content_hash(bytes))
    }

    /// Validate and write an upload into the corpus. Metadata is not saved yet.
    ///
    /// Content matching a registered document or another staged upload is
    /// rejected as a duplicate.
    pub fn stage_upload(&self, original_filename: &str, bytes: &[u8]) -> Result<DocumentRecord> {
        let original_filename = Path::new(original_filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(original_filename)
            .to_string();
        validate_pdf(&original_filename, bytes)?;

        let hash = content_hash(bytes);
        let mut pending = self.pending.lock();
        if let Some(existing) = self.find_by_hash(&hash)? {
            debug!(
                "Duplicate upload {} matches {}",
                original_filename, existing.file_id
            );
            return Err(Error::DuplicateContent(format!(
                "{} (uploaded {} as {})",
                existing.hash, existing.upload_time, existing.original_filename
            )));
        }
        if pending.contains(&hash) {
            debug!("Duplicate upload {} matches a staged file", original_filename);
            return Err(Error::DuplicateContent(format!(
                "{} (same content is already being uploaded)",
                hash
            )));
        }

        let file_id = unique_filename(&original_filename);
        let part = self.staging_dir.join(format!("{}.part", file_id));
        let filepath = self.corpus_dir.join(&file_id);
        std::fs::write(&part, bytes)?;
        // The corpus only ever sees complete files.
        if let Err(e) = std::fs::rename(&part, &filepath) {
            if let Err(cleanup) = std::fs::remove_file(&part) {
                debug!("Partial upload {} not removed: {}", part.display(), cleanup);
            }
            return Err(e.into());
        }
        pending.insert(hash.clone());

        info!("Staged upload {} as {}", original_filename, file_id);
        Ok(DocumentRecord {
            file_id,
            original_filename,
            filepath,
            size: bytes.len() as u64,
            size_formatted: format_file_size(bytes.len() as u64),
            hash,
            upload_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    /// Persist metadata for a staged upload after it has been indexed.
    pub fn save_record(&self, record: &DocumentRecord) -> Result<()> {
        let mut pending = self.pending.lock();
        let mut metadata = self.load_metadata()?;
        metadata.insert(record.file_id.clone(), record.clone());
        self.save_metadata(&metadata)?;
        pending.remove(&record.hash);
        Ok(())
    }

    /// Remove a staged file whose indexing failed.
    pub fn discard_staged(&self, record: &DocumentRecord) -> Result<()> {
        let mut pending = self.pending.lock();
        match std::fs::remove_file(&record.filepath) {
            Ok(()) => warn!("Discarded staged upload {}", record.file_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        pending.remove(&record.hash);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// All registered documents, newest first.
    pub fn list(&self) -> Result<Vec<DocumentRecord>> {
        let _guard = self.pending.lock();
        let mut records: Vec<DocumentRecord> = self.load_metadata()?.into_values().collect();
        records.sort_by(|a, b| {
            b.upload_time
                .cmp(&a.upload_time)
                .then_with(|| b.file_id.cmp(&a.file_id))
        });
        Ok(records)
    }

    pub fn get(&self, file_id: &str) -> Result<Option<DocumentRecord>> {
        let _guard = self.pending.lock();
        Ok(self.load_metadata()?.remove(file_id))
    }

    fn parked_path(&self, record: &DocumentRecord) -> PathBuf {
        self.staging_dir.join(format!("{}.removed", record.file_id))
    }

    /// Move a registered document's file out of the corpus. Metadata stays
    /// until [`DocumentRegistry::delete`]; [`DocumentRegistry::unpark`] undoes this.
    pub fn park(&self, file_id: &str) -> Result<DocumentRecord> {
        let _guard = self.pending.lock();
        let record = self
            .load_metadata()?
            .remove(file_id)
            .ok_or_else(|| Error::NotFound(format!("document {}", file_id)))?;
        match std::fs::rename(&record.filepath, self.parked_path(&record)) {
            Ok(()) => debug!("Parked {} outside the corpus", file_id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File for {} was already gone", file_id);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(record)
    }

    /// Return a parked file to the corpus.
    pub fn unpark(&self, record: &DocumentRecord) -> Result<()> {
        let _guard = self.pending.lock();
        let parked = self.parked_path(record);
        if parked.is_file() {
            std::fs::rename(&parked, &record.filepath)?;
            info!("Restored {} to the corpus", record.file_id);
        }
        Ok(())
    }

    /// Remove a document's file (in the corpus or parked) and its metadata.
    pub fn delete(&self, file_id: &str) -> Result<DocumentRecord> {
        let _guard = self.pending.lock();
        let mut metadata = self.load_metadata()?;
        let record = metadata
            .remove(file_id)
            .ok_or_else(|| Error::NotFound(format!("document {}", file_id)))?;

        for path in [record.filepath.clone(), self.parked_path(&record)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.save_metadata(&metadata)?;
        info!("Deleted document {} ({})", file_id, record.original_filename);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_registry() -> (DocumentRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let registry =
            DocumentRegistry::new(dir.path().join("corpus"), dir.path().join("uploads")).unwrap();
        (registry, dir)
    }

    fn pdf_bytes(body: &str) -> Vec<u8> {
        format!("%PDF-1.5\n{}\n%%EOF", body).into_bytes()
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2.0 MB");
    }

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf("notes.pdf", b"%PDF-1.4 ...").is_ok());
        assert!(validate_pdf("NOTES.PDF", b"%PDF-1.4 ...").is_ok());
        assert!(matches!(
            validate_pdf("notes.txt", b"%PDF-1.4"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(validate_pdf("notes.pdf", b""), Err(Error::InvalidRequest(_))));
        assert!(matches!(
            validate_pdf("notes.pdf", b"<html>"),
            Err(Error::InvalidRequest(_))
        ));
        let big = vec![b'%'; MAX_UPLOAD_BYTES + 1];
        assert!(matches!(validate_pdf("big.pdf", &big), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_unique_filename_shape() {
        let name = unique_filename("Lecture 3: Backprop (final).pdf");
        assert!(name.starts_with("Lecture_3_Backprop_final_"));
        assert!(name.ends_with(".pdf"));
        let a = unique_filename("x.pdf");
        let b = unique_filename("x.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_stage_save_list_delete() {
        let (registry, _dir) = test_registry();
        let record = registry.stage_upload("week1.pdf", &pdf_bytes("one")).unwrap();
        assert!(record.filepath.is_file());
        assert_eq!(record.original_filename, "week1.pdf");
        assert_eq!(record.size_formatted, format_file_size(record.size));

        // Not registered until saved.
        assert!(registry.list().unwrap().is_empty());
        registry.save_record(&record).unwrap();

        let listed = registry.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(registry.get(&record.file_id).unwrap(), Some(record.clone()));

        let deleted = registry.delete(&record.file_id).unwrap();
        assert_eq!(deleted.file_id, record.file_id);
        assert!(!record.filepath.exists());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_registered_content_is_duplicate() {
        let (registry, _dir) = test_registry();
        let bytes = pdf_bytes("same");
        let first = registry.stage_upload("a.pdf", &bytes).unwrap();
        registry.save_record(&first).unwrap();

        assert!(registry.check_duplicate(&bytes).unwrap().is_some());
        let err = registry.stage_upload("b.pdf", &bytes).unwrap_err();
        assert!(matches!(err, Error::DuplicateContent(_)));
    }

    #[test]
    fn test_staged_content_is_a_duplicate_until_discarded() {
        let (registry, _dir) = test_registry();
        let bytes = pdf_bytes("same lecture");
        let first = registry.stage_upload("a.pdf", &bytes).unwrap();

        // Not saved yet, but a second copy under another name is still rejected.
        let err = registry.stage_upload("b.pdf", &bytes).unwrap_err();
        assert!(matches!(err, Error::DuplicateContent(_)));

        registry.discard_staged(&first).unwrap();
        let again = registry.stage_upload("b.pdf", &bytes).unwrap();
        registry.save_record(&again).unwrap();
        assert!(matches!(
            registry.stage_upload("c.pdf", &bytes),
            Err(Error::DuplicateContent(_))
        ));
    }

    #[test]
    fn test_concurrent_identical_uploads_stage_once() {
        let (registry, _dir) = test_registry();
        let registry = std::sync::Arc::new(registry);
        let bytes = pdf_bytes("race");
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                let bytes = bytes.clone();
                std::thread::spawn(move || registry.stage_upload(&format!("copy{}.pdf", i), &bytes))
            })
            .collect();
        let staged = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(staged, 1);
    }

    #[test]
    fn test_discard_staged_removes_file() {
        let (registry, _dir) = test_registry();
        let record = registry.stage_upload("draft.pdf", &pdf_bytes("draft")).unwrap();
        registry.discard_staged(&record).unwrap();
        assert!(!record.filepath.exists());
        assert!(registry.get(&record.file_id).unwrap().is_none());
    }

    #[test]
    fn test_failed_move_leaves_no_partial_file() {
        let (registry, dir) = test_registry();
        std::fs::remove_dir_all(dir.path().join("corpus")).unwrap();

        let bytes = pdf_bytes("orphan");
        assert!(registry.stage_upload("orphan.pdf", &bytes).is_err());
        let leftovers = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);

        // The failed attempt does not block a retry.
        std::fs::create_dir_all(dir.path().join("corpus")).unwrap();
        assert!(registry.stage_upload("orphan.pdf", &bytes).is_ok());
    }

    #[test]
    fn test_park_then_unpark_or_delete() {
        let (registry, _dir) = test_registry();
        let record = registry.stage_upload("week2.pdf", &pdf_bytes("two")).unwrap();
        registry.save_record(&record).unwrap();

        let parked = registry.park(&record.file_id).unwrap();
        assert!(!record.filepath.exists());
        assert_eq!(registry.list().unwrap().len(), 1);

        registry.unpark(&parked).unwrap();
        assert!(record.filepath.is_file());

        registry.park(&record.file_id).unwrap();
        registry.delete(&record.file_id).unwrap();
        assert!(!record.filepath.exists());
        assert!(!registry.parked_path(&record).exists());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_is_not_found() {
        let (registry, _dir) = test_registry();
        assert!(matches!(registry.delete("nope.pdf"), Err(Error::NotFound(_))));
        assert!(matches!(registry.park("nope.pdf"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_newest_first() {
        let (registry, _dir) = test_registry();
        for (id, time) in [("a.pdf", "2024-01-01 10:00:00"), ("b.pdf", "2024-03-01 10:00:00")] {
            registry
                .save_record(&DocumentRecord {
                    file_id: id.into(),
                    original_filename: id.into(),
                    filepath: PathBuf::from(id),
                    size: 1,
                    size_formatted: "1 B".into(),
                    hash: id.into(),
                    upload_time: time.into(),
                })
                .unwrap();
        }
        let ids: Vec<String> = registry.list().unwrap().into_iter().map(|r| r.file_id).collect();
        assert_eq!(ids, vec!["b.pdf", "a.pdf"]);
    }
}
