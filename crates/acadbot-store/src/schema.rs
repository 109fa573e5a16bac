//! Index database schema.

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: i64 = 1;

/// Single-row manifest plus one row per embedding record.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS manifest (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    format_version INTEGER NOT NULL,
    model_id TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    chunk_overlap INTEGER NOT NULL,
    corpus_fingerprint TEXT NOT NULL,
    built_at TEXT NOT NULL,
    record_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    position INTEGER PRIMARY KEY,
    chunk_id TEXT NOT NULL,
    source TEXT NOT NULL,
    page INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    start_token INTEGER NOT NULL,
    end_token INTEGER NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    text TEXT NOT NULL,
    vector BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_source ON records(source);
"#;
