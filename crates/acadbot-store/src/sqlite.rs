//! SQLite persistence for the vector index.
//!
//! `persist` writes a complete database to a temporary file in the index
//! directory and renames it over `index.db`, so a reader opening the file
//! sees either the previous index or the new one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::embedding::{decode_f32, encode_f32};
use crate::index::VectorIndex;
use crate::schema::{FORMAT_VERSION, SCHEMA_SQL};
use crate::types::*;
use acadbot_core::{Error, Result};

/// File name of the persisted index inside the index directory.
pub const INDEX_FILE: &str = "index.db";

/// On-disk home of the vector index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    db_path: PathBuf,
}

impl IndexStore {
    /// `dir` is the index directory (e.g., `data/index/`).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            db_path: dir.join(INDEX_FILE),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Whether a persisted index exists.
    pub fn exists(&self) -> bool {
        self.db_path.is_file()
    }

    // ---------------------------------------------------------------
    // Write
    // ---------------------------------------------------------------

    /// Write the index to a temporary file, then atomically replace `index.db`.
    pub fn persist(&self, index: &VectorIndex) -> Result<()> {
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", INDEX_FILE, uuid::Uuid::new_v4().simple()));

        let written = Self::write_db(&tmp_path, index);
        let result = written.and_then(|_| {
            std::fs::rename(&tmp_path, &self.db_path)
                .map_err(|e| Error::Storage(format!("Index rename failed: {}", e)))
        });

        if result.is_err() {
            if let Err(e) = std::fs::remove_file(&tmp_path) {
                debug!("Temporary index file not removed: {}", e);
            }
        } else {
            info!(
                "Persisted index: {} records, dim={}, path={}",
                index.len(),
                index.dimension(),
                self.db_path.display()
            );
        }
        result
    }

    fn write_db(path: &Path, index: &VectorIndex) -> Result<()> {
        let mut conn = Connection::open(path).map_err(|e| Error::Database(e.to_string()))?;
        // Rollback journal keeps the database in a single file for the rename.
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        {
            let m = index.manifest();
            tx.execute(
                "INSERT INTO manifest (id, format_version, model_id, dimension, chunk_size,
                    chunk_overlap, corpus_fingerprint, built_at, record_count)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    FORMAT_VERSION,
                    m.model_id,
                    m.dimension as i64,
                    m.chunk_size as i64,
                    m.chunk_overlap as i64,
                    m.corpus_fingerprint,
                    m.built_at.to_rfc3339(),
                    index.len() as i64,
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

            let mut stmt = tx
                .prepare(
                    "INSERT INTO records (position, chunk_id, source, page, chunk_index,
                        start_token, end_token, char_start, char_end, text, vector)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for (position, record) in index.records().iter().enumerate() {
                let c = &record.chunk;
                stmt.execute(params![
                    position as i64,
                    c.id,
                    c.source,
                    c.page as i64,
                    c.chunk_index as i64,
                    c.start_token as i64,
                    c.end_token as i64,
                    c.char_start as i64,
                    c.char_end as i64,
                    c.text,
                    encode_f32(&record.vector),
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Read
    // ---------------------------------------------------------------

    fn open_read_only(&self) -> Result<Connection> {
        if !self.exists() {
            return Err(Error::IndexNotBuilt);
        }
        Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Read only the manifest. `None` when no index has been persisted.
    pub fn load_manifest(&self) -> Result<Option<IndexManifest>> {
        if !self.exists() {
            return Ok(None);
        }
        let conn = self.open_read_only()?;
        Self::read_manifest(&conn)
    }

    fn read_manifest(conn: &Connection) -> Result<Option<IndexManifest>> {
        let row = conn
            .query_row(
                "SELECT format_version, model_id, dimension, chunk_size, chunk_overlap,
                        corpus_fingerprint, built_at, record_count
                 FROM manifest WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        let Some((version, model_id, dim, size, overlap, fingerprint, built_at, count)) = row
        else {
            return Ok(None);
        };
        if version != FORMAT_VERSION {
            return Err(Error::Storage(format!(
                "Unsupported index format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let built_at = DateTime::parse_from_rfc3339(&built_at)
            .map_err(|e| Error::Storage(format!("Invalid built_at: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(IndexManifest {
            model_id,
            dimension: dim as usize,
            chunk_size: size as usize,
            chunk_overlap: overlap as usize,
            corpus_fingerprint: fingerprint,
            built_at,
            record_count: count as usize,
        }))
    }

    /// Load the persisted index, records in their original order.
    pub fn load(&self) -> Result<VectorIndex> {
        let conn = self.open_read_only()?;
        let manifest = Self::read_manifest(&conn)?
            .ok_or_else(|| Error::Storage("Index file has no manifest".into()))?;

        let mut stmt = conn
            .prepare(
                "SELECT chunk_id, source, page, chunk_index, start_token, end_token,
                        char_start, char_end, text, vector
                 FROM records ORDER BY position",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        source: row.get(1)?,
                        page: row.get::<_, i64>(2)? as usize,
                        chunk_index: row.get::<_, i64>(3)? as usize,
                        start_token: row.get::<_, i64>(4)? as usize,
                        end_token: row.get::<_, i64>(5)? as usize,
                        char_start: row.get::<_, i64>(6)? as usize,
                        char_end: row.get::<_, i64>(7)? as usize,
                        text: row.get(8)?,
                    },
                    row.get::<_, Vec<u8>>(9)?,
                ))
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut records = Vec::with_capacity(manifest.record_count);
        for row in rows {
            let (chunk, blob) = row.map_err(|e| Error::Database(e.to_string()))?;
            let vector = decode_f32(&blob).ok_or_else(|| {
                Error::Storage(format!("Corrupt vector blob for {}", chunk.id))
            })?;
            records.push(EmbeddingRecord { chunk, vector });
        }

        if records.len() != manifest.record_count {
            warn!(
                "Index manifest lists {} records, found {}",
                manifest.record_count,
                records.len()
            );
            return Err(Error::Storage(format!(
                "Index is incomplete: manifest lists {} records, found {}",
                manifest.record_count,
                records.len()
            )));
        }

        let index = VectorIndex::new(manifest, records)?;
        info!(
            "Loaded index: {} records, model={}, path={}",
            index.len(),
            index.manifest().model_id,
            self.db_path.display()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{manifest, record};
    use tempfile::TempDir;

    fn test_store() -> (IndexStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path().join("index")).unwrap();
        (store, dir)
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::new(
            manifest(3),
            vec![
                record(0, vec![0.25, -1.5, 3.0e-7]),
                record(1, vec![1.0, 0.0, 0.0]),
                record(2, vec![0.3, 0.3, 0.3]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_index() {
        let (store, _dir) = test_store();
        assert!(!store.exists());
        assert!(store.load_manifest().unwrap().is_none());
        assert!(matches!(store.load(), Err(Error::IndexNotBuilt)));
    }

    #[test]
    fn test_persist_then_load_is_identical() {
        let (store, _dir) = test_store();
        let index = sample_index();
        store.persist(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.records(), index.records());
        assert_eq!(loaded.manifest().model_id, index.manifest().model_id);
        assert_eq!(loaded.manifest().record_count, 3);
        assert_eq!(
            loaded.manifest().built_at.timestamp_micros(),
            index.manifest().built_at.timestamp_micros()
        );

        let query = [0.9, 0.1, 0.0];
        let a = index.search(&query, 2).unwrap();
        let b = loaded.search(&query, 2).unwrap();
        let ids = |r: &RetrievalResult| r.chunks().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.hits[0].score, b.hits[0].score);
    }

    #[test]
    fn test_persist_replaces_previous_index() {
        let (store, dir) = test_store();
        store.persist(&sample_index()).unwrap();

        let smaller = VectorIndex::new(manifest(3), vec![record(7, vec![0.0, 0.0, 1.0])]).unwrap();
        store.persist(&smaller).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records()[0].chunk.chunk_index, 7);

        // No temporary files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("index"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_empty_index_round_trip() {
        let (store, _dir) = test_store();
        store
            .persist(&VectorIndex::new(manifest(8), Vec::new()).unwrap())
            .unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), 8);
    }
}
