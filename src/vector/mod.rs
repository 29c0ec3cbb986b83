// Nearest-neighbor retrieval over fixed-dimension embeddings, decoupled from
// the domain's string symbol ids via an explicit bijection table.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{is_valid_table_name, VectorConfig};
use crate::error::{Result, StoreError};
use crate::store::db::ConnectionPool;

static VEC_EXTENSION: OnceCell<()> = OnceCell::new();

/// Register sqlite-vec via `sqlite3_auto_extension` so every connection
/// opened afterwards has vec0 available. Idempotent.
pub fn register_extension() {
    VEC_EXTENSION.get_or_init(|| raw_register());
}

#[allow(clippy::missing_transmute_annotations)]
fn raw_register() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    }
}

/// Convert cosine distance ([0, 2]) to a [0, 1] confidence score.
///
/// The single conversion used everywhere a distance becomes a score.
pub fn confidence(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// A nearest-neighbor match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// Original string id, or the stringified integer key when the mapping
    /// row is missing (degraded, not fatal).
    pub symbol_id: String,
    pub vector_id: i64,
    pub distance: f32,
    pub confidence: f32,
}

/// One vec0 virtual table of embeddings plus the `vector_ids` bijection.
///
/// Construct one instance per embedding kind (per-symbol, per-chunk, ...)
/// over the same pool; the table name and dimension are fixed per instance.
#[derive(Clone, Debug)]
pub struct VectorIndex {
    pool: ConnectionPool,
    table: String,
    dimension: usize,
    batch_size: usize,
    alloc_lock: Arc<Mutex<()>>,
}

impl VectorIndex {
    /// Open (creating if needed) the vector table described by `config`.
    ///
    /// Fails fast with `DimensionMismatch` when the table already exists
    /// with a different dimension, and with `InvalidConfig` when the table
    /// name is not a plain identifier.
    pub fn new(pool: ConnectionPool, config: &VectorConfig) -> Result<Self> {
        if !is_valid_table_name(&config.table) {
            return Err(StoreError::InvalidConfig(format!(
                "invalid vector table name: {}",
                config.table
            )));
        }
        register_extension();

        let index = Self {
            pool,
            table: config.table.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            alloc_lock: Arc::new(Mutex::new(())),
        };

        let conn = index.pool.get()?;
        if let Some(existing) = table_dimension(&conn, &index.table)? {
            if existing != index.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: existing,
                    actual: index.dimension,
                });
            }
        }
        index.ensure_tables(&conn)?;
        Ok(index)
    }

    fn ensure_tables(&self, conn: &Connection) -> Result<()> {
        // Mapping table also lives in the main schema; recreated here so the
        // index works over pools that skipped open_pool.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vector_ids (
                symbol_id TEXT PRIMARY KEY,
                vector_id INTEGER NOT NULL UNIQUE
            )",
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(
                    embedding float[{}] distance_metric=cosine
                )",
                self.table, self.dimension
            ),
            [],
        )?;
        Ok(())
    }

    /// Integer key for a string symbol id, allocating one when absent.
    ///
    /// Allocation runs inside a single immediate transaction (read current
    /// max, insert max+1), so concurrent callers with distinct string ids can
    /// never receive the same integer.
    pub fn get_or_create_id(&self, symbol_id: &str) -> Result<i64> {
        let _guard = self.alloc_lock.lock();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = allocate_in_tx(&tx, symbol_id)?;
        tx.commit()?;
        Ok(id)
    }

    /// Existing integer key for a string id, if one was ever allocated
    pub fn lookup_id(&self, symbol_id: &str) -> Result<Option<i64>> {
        let conn = self.pool.get()?;
        let id = conn
            .query_row(
                "SELECT vector_id FROM vector_ids WHERE symbol_id = ?1",
                [symbol_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Store or replace the embedding for a symbol (idempotent upsert)
    pub fn store_embedding(&self, symbol_id: &str, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        let _guard = self.alloc_lock.lock();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = allocate_in_tx(&tx, symbol_id)?;
        self.upsert_vector_in_tx(&tx, id, vector)?;
        tx.commit()?;
        debug!("Stored embedding for {} (vector id {})", symbol_id, id);
        Ok(())
    }

    /// Store many embeddings, committed in bounded-size chunks so no single
    /// transaction holds the write lock for long
    pub fn store_batch(&self, entries: &[(String, Vec<f32>)]) -> Result<()> {
        for (_, vector) in entries {
            self.check_dimension(vector)?;
        }
        for chunk in entries.chunks(self.batch_size) {
            let _guard = self.alloc_lock.lock();
            let mut conn = self.pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for (symbol_id, vector) in chunk {
                let id = allocate_in_tx(&tx, symbol_id)?;
                self.upsert_vector_in_tx(&tx, id, vector)?;
            }
            tx.commit()?;
        }
        debug!("Stored batch of {} embeddings", entries.len());
        Ok(())
    }

    fn upsert_vector_in_tx(&self, tx: &Connection, vector_id: i64, vector: &[f32]) -> Result<()> {
        let blob = vector_blob(vector);
        let exists: Option<i64> = tx
            .query_row(
                &format!("SELECT rowid FROM {} WHERE rowid = ?1", self.table),
                [vector_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            tx.execute(
                &format!("UPDATE {} SET embedding = ?1 WHERE rowid = ?2", self.table),
                params![blob, vector_id],
            )?;
        } else {
            tx.execute(
                &format!("INSERT INTO {}(rowid, embedding) VALUES (?1, ?2)", self.table),
                params![vector_id, blob],
            )?;
        }
        Ok(())
    }

    /// Up to `limit` nearest rows by ascending cosine distance, filtered to
    /// `distance <= max_distance`, translated back to string symbol ids.
    ///
    /// If the vec0 module turns out to be unavailable on the connection, the
    /// extension is re-registered and the identical query retried exactly
    /// once before the error surfaces.
    pub fn search(&self, query: &[f32], limit: usize, max_distance: f32) -> Result<Vec<VectorHit>> {
        self.check_dimension(query)?;
        let blob = vector_blob(query);

        let rows = match self.knn(&blob, limit) {
            Ok(rows) => rows,
            Err(err) if err.is_missing_vec_module() => {
                warn!("vec0 module unavailable; re-registering extension and retrying");
                raw_register();
                let conn = self.pool.get()?;
                self.ensure_tables(&conn)?;
                drop(conn);
                self.knn(&blob, limit).map_err(|e| {
                    StoreError::ExtensionUnavailable(e.to_string())
                })?
            }
            Err(err) => return Err(err),
        };

        let conn = self.pool.get()?;
        let mut stmt =
            conn.prepare("SELECT symbol_id FROM vector_ids WHERE vector_id = ?1")?;
        let mut hits = Vec::with_capacity(rows.len());
        for (vector_id, distance) in rows {
            let distance = distance as f32;
            if distance > max_distance {
                continue;
            }
            let symbol_id: Option<String> =
                stmt.query_row([vector_id], |row| row.get(0)).optional()?;
            let symbol_id = match symbol_id {
                Some(id) => id,
                None => {
                    warn!("vector row {} has no id mapping", vector_id);
                    vector_id.to_string()
                }
            };
            hits.push(VectorHit {
                symbol_id,
                vector_id,
                distance,
                confidence: confidence(distance),
            });
        }
        Ok(hits)
    }

    fn knn(&self, query_blob: &[u8], limit: usize) -> Result<Vec<(i64, f64)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, distance FROM {}
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance",
            self.table
        ))?;
        let rows = stmt
            .query_map(params![query_blob, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of stored embeddings
    pub fn count(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete all vectors and all id mappings (full reset)
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.alloc_lock.lock();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        tx.execute("DELETE FROM vector_ids", [])?;
        tx.commit()?;
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn allocate_in_tx(tx: &Connection, symbol_id: &str) -> Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT vector_id FROM vector_ids WHERE symbol_id = ?1",
            [symbol_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let next: i64 = tx.query_row(
        "SELECT COALESCE(MAX(vector_id), 0) + 1 FROM vector_ids",
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO vector_ids (symbol_id, vector_id) VALUES (?1, ?2)",
        params![symbol_id, next],
    )?;
    Ok(next)
}

/// Embedding dimension declared in the table's DDL, if the table exists
fn table_dimension(conn: &Connection, table: &str) -> Result<Option<usize>> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(sql.as_deref().and_then(parse_float_dimension))
}

fn parse_float_dimension(sql: &str) -> Option<usize> {
    let start = sql.find("float[")? + "float[".len();
    let rest = &sql[start..];
    let end = rest.find(']')?;
    rest[..end].trim().parse().ok()
}

/// Little-endian f32 blob, the layout sqlite-vec reads
fn vector_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}
