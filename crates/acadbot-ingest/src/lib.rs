//! AcadBot Ingest: PDF loading, token-window chunking, document registry.

pub mod batch;
pub mod chunking;
pub mod file;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod ingest;
pub mod registry;

pub use batch::{BatchState, BatchStatus, FileStatus};
pub use chunking::Chunker;
pub use file::{discover_pdfs, load_corpus, load_pdf, Document, LoadFailure, LoadReport};
pub use ingest::{content_hash, corpus_fingerprint};
pub use registry::{format_file_size, DocumentRecord, DocumentRegistry};
