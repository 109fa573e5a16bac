//! PDF discovery and page-level text extraction.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use acadbot_core::{Error, Result};

/// One PDF file as ordered page texts.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// File name, used as the chunk source identifier.
    pub id: String,
    pub path: PathBuf,
    pub pages: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page texts joined with a single `\n`.
    pub fn text(&self) -> String {
        self.pages.join("\n")
    }

    /// Byte offset in [`Document::text`] where each page starts.
    pub fn page_starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.pages.len());
        let mut offset = 0;
        for page in &self.pages {
            starts.push(offset);
            offset += page.len() + 1;
        }
        starts
    }
}

/// 1-based page containing byte `offset`, given the page start offsets.
pub fn page_at(page_starts: &[usize], offset: usize) -> usize {
    page_starts.partition_point(|&s| s <= offset).max(1)
}

/// A file that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of loading a corpus directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// All `*.pdf` files directly inside `dir`, sorted by file name.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::load(dir, "corpus directory does not exist"));
    }
    let entries = std::fs::read_dir(dir).map_err(|e| Error::load(dir, e.to_string()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_pdf(p))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Extract per-page plain text from one PDF.
pub fn load_pdf(path: &Path) -> Result<Document> {
    let pdf = lopdf::Document::load(path).map_err(|e| Error::load(path, e.to_string()))?;
    if pdf.is_encrypted() {
        return Err(Error::load(path, "document is encrypted"));
    }

    let mut pages = Vec::new();
    for page_number in pdf.get_pages().keys() {
        let text = pdf
            .extract_text(&[*page_number])
            .map_err(|e| Error::load(path, format!("page {}: {}", page_number, e)))?;
        pages.push(text);
    }

    let id = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    debug!("Loaded {} ({} pages)", id, pages.len());
    Ok(Document::new(id, path, pages))
}

/// Load every PDF in `dir`. Unreadable files are reported and skipped.
pub fn load_corpus(dir: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for path in discover_pdfs(dir)? {
        match load_pdf(&path) {
            Ok(doc) => report.documents.push(doc),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failures.push(LoadFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        "Loaded corpus {}: {} documents, {} failed",
        dir.display(),
        report.documents.len(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_pdf;
    use tempfile::TempDir;

    #[test]
    fn test_load_pdf_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lecture1.pdf");
        write_pdf(
            &path,
            &[&["Neural networks"], &["Backpropagation uses the chain rule"]],
        )
        .unwrap();

        let doc = load_pdf(&path).unwrap();
        assert_eq!(doc.id, "lecture1.pdf");
        assert_eq!(doc.page_count(), 2);
        assert!(doc.pages[0].contains("Neural networks"));
        assert!(doc.pages[1].contains("chain rule"));
    }

    #[test]
    fn test_discover_is_sorted_and_case_insensitive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let names: Vec<String> = discover_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
    }

    #[test]
    fn test_corpus_skips_invalid_files() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("good.pdf"), &[&["Gradient descent"]]).unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").unwrap();

        let report = load_corpus(dir.path()).unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].id, "good.pdf");
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("broken.pdf"));
    }

    #[test]
    fn test_missing_corpus_dir_is_load_error() {
        let dir = TempDir::new().unwrap();
        let err = load_corpus(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn test_empty_corpus() {
        let dir = TempDir::new().unwrap();
        let report = load_corpus(dir.path()).unwrap();
        assert!(report.documents.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_page_offsets() {
        let doc = Document::new("d.pdf", "d.pdf", vec!["abc".into(), "de".into(), "f".into()]);
        assert_eq!(doc.text(), "abc\nde\nf");
        let starts = doc.page_starts();
        assert_eq!(starts, vec![0, 4, 7]);
        assert_eq!(page_at(&starts, 0), 1);
        assert_eq!(page_at(&starts, 3), 1);
        assert_eq!(page_at(&starts, 4), 2);
        assert_eq!(page_at(&starts, 8), 3);
    }
}
