use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::schema::init_schema;
use super::{
    Binding, BindingKind, FileRecord, Relationship, RelationshipKind, Span, Symbol, SymbolKind,
    TypeInfo, Visibility, WorkspaceRecord,
};
use crate::config::StorageConfig;
use crate::error::Result;

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Symbols upserted per transaction in bulk writes.
const UPSERT_CHUNK: usize = 100;

const SYMBOL_COLUMNS: &str = "id, name, kind, language, file_path, \
     start_line, start_column, end_line, end_column, start_byte, end_byte, \
     signature, doc_comment, visibility, parent_id, metadata";

/// Open a pooled connection to the database at `path`, applying migrations.
///
/// Every pooled connection gets WAL journaling, enforced foreign keys, and a
/// busy timeout. The sqlite-vec extension is registered before the first
/// connection opens so vec0 tables are available pool-wide.
pub fn open_pool(path: impl AsRef<Path>, storage: &StorageConfig) -> Result<ConnectionPool> {
    let path = path.as_ref().to_path_buf();

    info!("Opening database at: {}", path.display());

    crate::vector::register_extension();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let busy_timeout = std::time::Duration::from_millis(u64::from(storage.busy_timeout_ms));
    let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(())
    });

    let pool = Pool::builder().max_size(storage.pool_size).build(manager)?;

    {
        let conn = pool.get()?;
        init_schema(&conn)?;
    }

    Ok(pool)
}

/// Single source of truth for code entities and their relations.
///
/// Exact, positional, and full-text queries over symbols; transactional
/// cascading cleanup per file. All methods are synchronous; transactions
/// serialize against concurrent writers, and readers never observe a
/// partially applied multi-row write.
#[derive(Clone)]
pub struct SymbolStore {
    pool: ConnectionPool,
}

impl SymbolStore {
    /// Create or open a store at the given path
    pub fn open(path: impl AsRef<Path>, storage: &StorageConfig) -> Result<Self> {
        Ok(Self {
            pool: open_pool(path, storage)?,
        })
    }

    /// Wrap an existing pool (shared with a `VectorIndex`)
    pub fn with_pool(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Clone of the underlying pool, for wiring up a `VectorIndex` over the
    /// same database
    pub fn pool(&self) -> ConnectionPool {
        self.pool.clone()
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Insert or replace a symbol by id.
    ///
    /// Idempotent. Fails with `ForeignKeyViolation` when `parent_id` does not
    /// resolve to an existing symbol.
    pub fn upsert_symbol(&self, symbol: &Symbol) -> Result<()> {
        let conn = self.conn()?;
        debug!("Upserting symbol: {}", symbol.id);
        upsert_symbol_on(&conn, symbol)
    }

    /// Bulk upsert, chunked into short transactions to bound lock duration
    pub fn upsert_symbols(&self, symbols: &[Symbol]) -> Result<()> {
        let mut conn = self.conn()?;
        for chunk in symbols.chunks(UPSERT_CHUNK) {
            let tx = conn.transaction()?;
            for symbol in chunk {
                upsert_symbol_on(&tx, symbol)?;
            }
            tx.commit()?;
        }
        Ok(())
    }

    /// Get symbol by id
    pub fn get_symbol(&self, id: &str) -> Result<Option<Symbol>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?1"
        ))?;
        let symbol = stmt.query_row([id], row_to_symbol).optional()?;
        Ok(symbol)
    }

    /// All symbols in a file, ordered by start line
    pub fn find_symbols_by_file(&self, file_path: &str) -> Result<Vec<Symbol>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE file_path = ?1 ORDER BY start_line, start_column"
        ))?;
        let symbols = stmt
            .query_map([file_path], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Direct children of a symbol in the ownership tree
    pub fn find_children(&self, parent_id: &str) -> Result<Vec<Symbol>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE parent_id = ?1 ORDER BY start_line, start_column"
        ))?;
        let symbols = stmt
            .query_map([parent_id], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Smallest symbol whose span contains the given point, or `None`.
    ///
    /// Ties resolve to the smallest line×column area, then by id.
    pub fn find_symbol_at_position(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
    ) -> Result<Option<Symbol>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE file_path = ?1
               AND (start_line < ?2 OR (start_line = ?2 AND start_column <= ?3))
               AND (end_line > ?2 OR (end_line = ?2 AND end_column >= ?3))
             ORDER BY (end_line - start_line) * (end_column - start_column), id
             LIMIT 1"
        ))?;
        let symbol = stmt
            .query_row(params![file_path, line, column], row_to_symbol)
            .optional()?;
        Ok(symbol)
    }

    /// Case-sensitive substring match on symbol names, alphabetical, capped.
    ///
    /// Uses `instr` rather than LIKE, which is case-insensitive for ASCII.
    pub fn find_symbols_by_name(&self, fragment: &str, limit: usize) -> Result<Vec<Symbol>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE instr(name, ?1) > 0
             ORDER BY name, id
             LIMIT ?2"
        ))?;
        let symbols = stmt
            .query_map(params![fragment, limit as i64], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Insert a relationship; both endpoints must already exist.
    ///
    /// Returns the autoincrement row id.
    pub fn insert_relationship(&self, rel: &Relationship) -> Result<i64> {
        let conn = self.conn()?;
        debug!(
            "Inserting relationship: {} -{}-> {}",
            rel.from_symbol_id,
            rel.kind.as_str(),
            rel.to_symbol_id
        );
        conn.execute(
            "INSERT INTO relationships
                (from_symbol_id, to_symbol_id, kind, file_path, line_number, confidence, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rel.from_symbol_id,
                rel.to_symbol_id,
                rel.kind.as_str(),
                rel.file_path,
                rel.line_number,
                rel.confidence as f64,
                metadata_to_sql(&rel.metadata),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All incoming calls/uses/references edges, joined with the originating
    /// symbol's location
    pub fn find_references(&self, symbol_id: &str) -> Result<Vec<ReferenceHit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.from_symbol_id, r.to_symbol_id, r.kind, r.file_path,
                    r.line_number, r.confidence, r.metadata,
                    s.name, s.file_path, s.start_line, s.start_column
             FROM relationships r
             JOIN symbols s ON s.id = r.from_symbol_id
             WHERE r.to_symbol_id = ?1 AND r.kind IN ('calls', 'uses', 'references')
             ORDER BY s.file_path, r.line_number",
        )?;
        let hits = stmt
            .query_map([symbol_id], |row| {
                Ok(ReferenceHit {
                    relationship: row_to_relationship(row)?,
                    from_name: row.get(8)?,
                    from_file: row.get(9)?,
                    from_line: row.get(10)?,
                    from_column: row.get(11)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Full-text query over name/signature/doc comment/file path, ranked by
    /// bm25 (lower rank is more relevant). The query is passed through as an
    /// FTS5 expression.
    pub fn search_symbols(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {prefixed}, bm25(symbol_fts) AS rank
             FROM symbol_fts
             JOIN symbols s ON s.rowid = symbol_fts.rowid
             WHERE symbol_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            prefixed = prefixed_symbol_columns("s")
        ))?;
        let hits = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok(SearchHit {
                    symbol: row_to_symbol(row)?,
                    rank: row.get(16)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Replace type info for a symbol (latest write wins)
    pub fn upsert_type_info(&self, info: &TypeInfo) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO type_info
                (symbol_id, resolved_type, generic_params, constraints, is_inferred, language, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(symbol_id) DO UPDATE SET
                resolved_type = excluded.resolved_type,
                generic_params = excluded.generic_params,
                constraints = excluded.constraints,
                is_inferred = excluded.is_inferred,
                language = excluded.language,
                metadata = excluded.metadata",
            params![
                info.symbol_id,
                info.resolved_type,
                serde_json::Value::from(info.generic_params.clone()).to_string(),
                serde_json::Value::from(info.constraints.clone()).to_string(),
                info.is_inferred,
                info.language,
                metadata_to_sql(&info.metadata),
            ],
        )?;
        Ok(())
    }

    /// Type info for a symbol, if recorded
    pub fn get_type_info(&self, symbol_id: &str) -> Result<Option<TypeInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol_id, resolved_type, generic_params, constraints,
                    is_inferred, language, metadata
             FROM type_info WHERE symbol_id = ?1",
        )?;
        let info = stmt
            .query_row([symbol_id], |row| {
                Ok(TypeInfo {
                    symbol_id: row.get(0)?,
                    resolved_type: row.get(1)?,
                    generic_params: json_string_list(row.get::<_, String>(2)?),
                    constraints: json_string_list(row.get::<_, String>(3)?),
                    is_inferred: row.get(4)?,
                    language: row.get(5)?,
                    metadata: metadata_from_sql(row.get(6)?),
                })
            })
            .optional()?;
        Ok(info)
    }

    /// Append a cross-language binding; the source endpoint must exist.
    pub fn insert_binding(&self, binding: &Binding) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO bindings
                (source_symbol_id, target_symbol_id, kind, source_language,
                 target_language, endpoint, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                binding.source_symbol_id,
                binding.target_symbol_id,
                binding.kind.as_str(),
                binding.source_language,
                binding.target_language,
                binding.endpoint,
                metadata_to_sql(&binding.metadata),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Bindings originating from a symbol
    pub fn find_bindings_for(&self, source_symbol_id: &str) -> Result<Vec<Binding>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_symbol_id, target_symbol_id, kind, source_language,
                    target_language, endpoint, metadata
             FROM bindings WHERE source_symbol_id = ?1 ORDER BY id",
        )?;
        let bindings = stmt
            .query_map([source_symbol_id], |row| {
                let kind_str: String = row.get(3)?;
                Ok(Binding {
                    id: Some(row.get(0)?),
                    source_symbol_id: row.get(1)?,
                    target_symbol_id: row.get(2)?,
                    kind: BindingKind::parse(&kind_str).ok_or_else(|| bad_enum(3, &kind_str))?,
                    source_language: row.get(4)?,
                    target_language: row.get(5)?,
                    endpoint: row.get(6)?,
                    metadata: metadata_from_sql(row.get(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bindings)
    }

    /// Replace the freshness record for a file
    pub fn upsert_file_record(&self, record: &FileRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (path, language, last_modified, size, content_hash, parse_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                language = excluded.language,
                last_modified = excluded.last_modified,
                size = excluded.size,
                content_hash = excluded.content_hash,
                parse_time_ms = excluded.parse_time_ms",
            params![
                record.path,
                record.language,
                record.last_modified,
                record.size as i64,
                record.content_hash,
                record.parse_time_ms,
            ],
        )?;
        Ok(())
    }

    /// Freshness record for a file, if indexed before
    pub fn get_file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, language, last_modified, size, content_hash, parse_time_ms
             FROM files WHERE path = ?1",
        )?;
        let record = stmt
            .query_row([path], |row| {
                Ok(FileRecord {
                    path: row.get(0)?,
                    language: row.get(1)?,
                    last_modified: row.get(2)?,
                    size: row.get::<_, i64>(3)? as u64,
                    content_hash: row.get(4)?,
                    parse_time_ms: row.get(5)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    /// Replace the coarse progress record for a workspace
    pub fn upsert_workspace_record(&self, record: &WorkspaceRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workspaces (path, last_indexed, symbol_count, file_count, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                last_indexed = excluded.last_indexed,
                symbol_count = excluded.symbol_count,
                file_count = excluded.file_count,
                metadata = excluded.metadata",
            params![
                record.path,
                record.last_indexed,
                record.symbol_count as i64,
                record.file_count as i64,
                metadata_to_sql(&record.metadata),
            ],
        )?;
        Ok(())
    }

    /// Progress record for a workspace, if any
    pub fn get_workspace_record(&self, path: &str) -> Result<Option<WorkspaceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, last_indexed, symbol_count, file_count, metadata
             FROM workspaces WHERE path = ?1",
        )?;
        let record = stmt
            .query_row([path], |row| {
                Ok(WorkspaceRecord {
                    path: row.get(0)?,
                    last_indexed: row.get(1)?,
                    symbol_count: row.get::<_, i64>(2)? as u64,
                    file_count: row.get::<_, i64>(3)? as u64,
                    metadata: metadata_from_sql(row.get(4)?),
                })
            })
            .optional()?;
        Ok(record)
    }

    /// Delete everything recorded for a file in one transaction: its
    /// relationships (by occurrence path), its symbols (cascading type info,
    /// bindings, child symbols, and edges from other files that referenced
    /// them), its full-text rows, and the file record itself.
    pub fn clear_file_data(&self, path: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let rels = tx.execute("DELETE FROM relationships WHERE file_path = ?1", [path])?;
        let syms = tx.execute("DELETE FROM symbols WHERE file_path = ?1", [path])?;
        tx.execute("DELETE FROM files WHERE path = ?1", [path])?;
        tx.commit()?;
        debug!(
            "Cleared {}: {} symbols, {} relationships",
            path, syms, rels
        );
        Ok(())
    }

    /// Symbol/file/relationship counts
    pub fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let symbols: i64 = conn.query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))?;
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let relationships: i64 =
            conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?;
        Ok(StoreStats {
            symbols: symbols as u64,
            files: files as u64,
            relationships: relationships as u64,
        })
    }
}

/// An incoming reference, with where it was made from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceHit {
    pub relationship: Relationship,
    pub from_name: String,
    pub from_file: String,
    pub from_line: u32,
    pub from_column: u32,
}

/// A full-text match; lower `rank` is more relevant (bm25)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub symbol: Symbol,
    pub rank: f64,
}

/// Store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub symbols: u64,
    pub files: u64,
    pub relationships: u64,
}

fn upsert_symbol_on(conn: &Connection, symbol: &Symbol) -> Result<()> {
    conn.execute(
        "INSERT INTO symbols (id, name, kind, language, file_path,
            start_line, start_column, end_line, end_column, start_byte, end_byte,
            signature, doc_comment, visibility, parent_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            kind = excluded.kind,
            language = excluded.language,
            file_path = excluded.file_path,
            start_line = excluded.start_line,
            start_column = excluded.start_column,
            end_line = excluded.end_line,
            end_column = excluded.end_column,
            start_byte = excluded.start_byte,
            end_byte = excluded.end_byte,
            signature = excluded.signature,
            doc_comment = excluded.doc_comment,
            visibility = excluded.visibility,
            parent_id = excluded.parent_id,
            metadata = excluded.metadata",
        params![
            symbol.id,
            symbol.name,
            symbol.kind.as_str(),
            symbol.language,
            symbol.file_path,
            symbol.span.start_line,
            symbol.span.start_column,
            symbol.span.end_line,
            symbol.span.end_column,
            symbol.span.start_byte,
            symbol.span.end_byte,
            symbol.signature,
            symbol.doc_comment,
            symbol.visibility.as_str(),
            symbol.parent_id,
            metadata_to_sql(&symbol.metadata),
        ],
    )?;
    Ok(())
}

fn prefixed_symbol_columns(alias: &str) -> String {
    SYMBOL_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bad_enum(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown enum value: {value}").into(),
    )
}

fn metadata_to_sql(metadata: &serde_json::Value) -> Option<String> {
    if metadata.is_null() {
        None
    } else {
        Some(metadata.to_string())
    }
}

fn metadata_from_sql(raw: Option<String>) -> serde_json::Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

fn json_string_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Convert database row to Symbol (expects SYMBOL_COLUMNS order)
fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    let kind_str: String = row.get(2)?;
    let visibility_str: String = row.get(13)?;

    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: SymbolKind::parse(&kind_str).ok_or_else(|| bad_enum(2, &kind_str))?,
        language: row.get(3)?,
        file_path: row.get(4)?,
        span: Span {
            start_line: row.get(5)?,
            start_column: row.get(6)?,
            end_line: row.get(7)?,
            end_column: row.get(8)?,
            start_byte: row.get(9)?,
            end_byte: row.get(10)?,
        },
        signature: row.get(11)?,
        doc_comment: row.get(12)?,
        visibility: Visibility::parse(&visibility_str)
            .ok_or_else(|| bad_enum(13, &visibility_str))?,
        parent_id: row.get(14)?,
        metadata: metadata_from_sql(row.get(15)?),
    })
}

/// Convert database row to Relationship (expects relationship column order)
fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let kind_str: String = row.get(3)?;
    Ok(Relationship {
        id: Some(row.get(0)?),
        from_symbol_id: row.get(1)?,
        to_symbol_id: row.get(2)?,
        kind: RelationshipKind::parse(&kind_str).ok_or_else(|| bad_enum(3, &kind_str))?,
        file_path: row.get(4)?,
        line_number: row.get(5)?,
        confidence: row.get::<_, f64>(6)? as f32,
        metadata: metadata_from_sql(row.get(7)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> SymbolStore {
        SymbolStore::open(dir.path().join("test.db"), &StorageConfig {
            path: "test.db".into(),
            pool_size: 4,
            busy_timeout_ms: 5000,
        })
        .unwrap()
    }

    fn symbol(id: &str, name: &str, file: &str) -> Symbol {
        Symbol {
            id: id.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            language: "typescript".to_string(),
            file_path: file.to_string(),
            span: Span {
                start_line: 1,
                start_column: 0,
                end_line: 5,
                end_column: 1,
                start_byte: 0,
                end_byte: 120,
            },
            signature: Some(format!("function {name}()")),
            doc_comment: None,
            visibility: Visibility::Public,
            parent_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_upsert_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let mut sym = symbol("a.ts::foo", "foo", "/a.ts");
        sym.doc_comment = Some("Does the thing".to_string());
        sym.metadata = serde_json::json!({"decorators": ["inject"]});
        store.upsert_symbol(&sym).unwrap();

        let back = store.get_symbol("a.ts::foo").unwrap().unwrap();
        assert_eq!(back, sym);
    }

    #[test]
    fn test_upsert_is_idempotent_replace() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store.upsert_symbol(&symbol("s1", "first", "/a.ts")).unwrap();
        store.upsert_symbol(&symbol("s1", "second", "/a.ts")).unwrap();

        assert_eq!(store.get_stats().unwrap().symbols, 1);
        assert_eq!(store.get_symbol("s1").unwrap().unwrap().name, "second");
    }

    #[test]
    fn test_unknown_parent_is_foreign_key_violation() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let mut sym = symbol("child", "child", "/a.ts");
        sym.parent_id = Some("no-such-parent".to_string());
        let err = store.upsert_symbol(&sym).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_relationship_endpoints_must_exist() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.upsert_symbol(&symbol("a", "a", "/a.ts")).unwrap();

        let rel = Relationship {
            id: None,
            from_symbol_id: "a".to_string(),
            to_symbol_id: "missing".to_string(),
            kind: RelationshipKind::Calls,
            file_path: "/a.ts".to_string(),
            line_number: 2,
            confidence: 1.0,
            metadata: serde_json::Value::Null,
        };
        let err = store.insert_relationship(&rel).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_find_children_is_a_query() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let mut class = symbol("cls", "Widget", "/w.ts");
        class.kind = SymbolKind::Class;
        store.upsert_symbol(&class).unwrap();

        for (i, id) in ["cls::a", "cls::b"].iter().enumerate() {
            let mut m = symbol(id, &format!("m{i}"), "/w.ts");
            m.kind = SymbolKind::Method;
            m.parent_id = Some("cls".to_string());
            m.span.start_line = 2 + i as u32;
            store.upsert_symbol(&m).unwrap();
        }

        let children = store.find_children("cls").unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "m0");
    }

    #[test]
    fn test_find_symbol_at_position_picks_smallest() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let mut outer = symbol("outer", "Outer", "/x.ts");
        outer.span = Span {
            start_line: 1,
            start_column: 0,
            end_line: 20,
            end_column: 1,
            start_byte: 0,
            end_byte: 500,
        };
        let mut inner = symbol("inner", "inner", "/x.ts");
        inner.span = Span {
            start_line: 5,
            start_column: 2,
            end_line: 8,
            end_column: 3,
            start_byte: 100,
            end_byte: 200,
        };
        store.upsert_symbol(&outer).unwrap();
        store.upsert_symbol(&inner).unwrap();

        let hit = store.find_symbol_at_position("/x.ts", 6, 4).unwrap().unwrap();
        assert_eq!(hit.id, "inner");

        let hit = store.find_symbol_at_position("/x.ts", 15, 0).unwrap().unwrap();
        assert_eq!(hit.id, "outer");

        assert!(store
            .find_symbol_at_position("/x.ts", 99, 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_symbols_by_name_is_case_sensitive() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store
            .upsert_symbol(&symbol("s1", "UserService", "/a.ts"))
            .unwrap();
        store
            .upsert_symbol(&symbol("s2", "userService", "/b.ts"))
            .unwrap();
        store
            .upsert_symbol(&symbol("s3", "AccountService", "/c.ts"))
            .unwrap();

        let hits = store.find_symbols_by_name("User", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s1");

        let hits = store.find_symbols_by_name("Service", 10).unwrap();
        assert_eq!(hits.len(), 2);
        // Alphabetical
        assert_eq!(hits[0].name, "AccountService");
    }

    #[test]
    fn test_find_references() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store.upsert_symbol(&symbol("callee", "target", "/t.ts")).unwrap();
        store.upsert_symbol(&symbol("caller", "origin", "/o.ts")).unwrap();

        for (kind, line) in [
            (RelationshipKind::Calls, 3),
            (RelationshipKind::Uses, 7),
            (RelationshipKind::Contains, 9),
        ] {
            store
                .insert_relationship(&Relationship {
                    id: None,
                    from_symbol_id: "caller".to_string(),
                    to_symbol_id: "callee".to_string(),
                    kind,
                    file_path: "/o.ts".to_string(),
                    line_number: line,
                    confidence: 1.0,
                    metadata: serde_json::Value::Null,
                })
                .unwrap();
        }

        let refs = store.find_references("callee").unwrap();
        // contains is not a reference kind
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].from_name, "origin");
        assert_eq!(refs[0].relationship.line_number, 3);
    }

    #[test]
    fn test_full_text_search() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let mut sym = symbol("s1", "parseConfig", "/config.ts");
        sym.doc_comment = Some("Reads the workspace configuration file".to_string());
        store.upsert_symbol(&sym).unwrap();
        store.upsert_symbol(&symbol("s2", "unrelated", "/other.ts")).unwrap();

        let hits = store.search_symbols("configuration", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.id, "s1");

        assert!(store.search_symbols("nonexistent", 10).unwrap().is_empty());
    }

    #[test]
    fn test_type_info_at_most_one() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.upsert_symbol(&symbol("s1", "val", "/a.ts")).unwrap();

        for resolved in ["string", "number"] {
            store
                .upsert_type_info(&TypeInfo {
                    symbol_id: "s1".to_string(),
                    resolved_type: resolved.to_string(),
                    generic_params: vec!["T".to_string()],
                    constraints: vec![],
                    is_inferred: true,
                    language: "typescript".to_string(),
                    metadata: serde_json::Value::Null,
                })
                .unwrap();
        }

        let info = store.get_type_info("s1").unwrap().unwrap();
        assert_eq!(info.resolved_type, "number");
        assert_eq!(info.generic_params, vec!["T".to_string()]);
    }

    #[test]
    fn test_file_record_replace_on_same_path() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        for hash in ["h1", "h2"] {
            store
                .upsert_file_record(&FileRecord {
                    path: "/a.ts".to_string(),
                    language: "typescript".to_string(),
                    last_modified: 1_700_000_000,
                    size: 42,
                    content_hash: hash.to_string(),
                    parse_time_ms: 3,
                })
                .unwrap();
        }

        assert_eq!(store.get_stats().unwrap().files, 1);
        let rec = store.get_file_record("/a.ts").unwrap().unwrap();
        assert_eq!(rec.content_hash, "h2");
    }

    #[test]
    fn test_clear_file_data_cascades() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        // Two files; /b.ts records an edge into /a.ts
        store.upsert_symbol(&symbol("a::f", "f", "/a.ts")).unwrap();
        store.upsert_symbol(&symbol("b::g", "g", "/b.ts")).unwrap();
        store
            .insert_relationship(&Relationship {
                id: None,
                from_symbol_id: "b::g".to_string(),
                to_symbol_id: "a::f".to_string(),
                kind: RelationshipKind::Calls,
                file_path: "/b.ts".to_string(),
                line_number: 2,
                confidence: 1.0,
                metadata: serde_json::Value::Null,
            })
            .unwrap();
        store
            .upsert_type_info(&TypeInfo {
                symbol_id: "a::f".to_string(),
                resolved_type: "() => void".to_string(),
                generic_params: vec![],
                constraints: vec![],
                is_inferred: false,
                language: "typescript".to_string(),
                metadata: serde_json::Value::Null,
            })
            .unwrap();
        store
            .upsert_file_record(&FileRecord {
                path: "/a.ts".to_string(),
                language: "typescript".to_string(),
                last_modified: 0,
                size: 1,
                content_hash: "h".to_string(),
                parse_time_ms: 0,
            })
            .unwrap();

        store.clear_file_data("/a.ts").unwrap();

        assert!(store.get_symbol("a::f").unwrap().is_none());
        assert!(store.get_type_info("a::f").unwrap().is_none());
        assert!(store.get_file_record("/a.ts").unwrap().is_none());
        // The cross-file edge died with its target endpoint
        assert!(store.find_references("a::f").unwrap().is_empty());
        assert_eq!(store.get_stats().unwrap().relationships, 0);
        // The other file's symbol is untouched
        assert!(store.get_symbol("b::g").unwrap().is_some());
        assert!(store.search_symbols("g", 10).unwrap().len() == 1);
    }

    #[test]
    fn test_bindings_round_trip_and_cascade() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        store.upsert_symbol(&symbol("rs::call_api", "call_api", "/client.rs")).unwrap();
        store.upsert_symbol(&symbol("py::serve", "serve", "/server.py")).unwrap();

        let binding = Binding {
            id: None,
            source_symbol_id: "rs::call_api".to_string(),
            target_symbol_id: Some("py::serve".to_string()),
            kind: BindingKind::RestApi,
            source_language: "rust".to_string(),
            target_language: Some("python".to_string()),
            endpoint: Some("/v1/serve".to_string()),
            metadata: serde_json::Value::Null,
        };
        store.insert_binding(&binding).unwrap();

        let bindings = store.find_bindings_for("rs::call_api").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].kind, BindingKind::RestApi);
        assert_eq!(bindings[0].endpoint.as_deref(), Some("/v1/serve"));

        // Target deletion nulls the resolved end; clearing the source file
        // removes the binding itself
        store.clear_file_data("/server.py").unwrap();
        let bindings = store.find_bindings_for("rs::call_api").unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].target_symbol_id, None);

        store.clear_file_data("/client.rs").unwrap();
        assert!(store.find_bindings_for("rs::call_api").unwrap().is_empty());
    }

    #[test]
    fn test_binding_with_unknown_source_is_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let err = store
            .insert_binding(&Binding {
                id: None,
                source_symbol_id: "nope".to_string(),
                target_symbol_id: None,
                kind: BindingKind::Ffi,
                source_language: "rust".to_string(),
                target_language: None,
                endpoint: None,
                metadata: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_workspace_record_round_trip() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let record = WorkspaceRecord {
            path: "/workspace".to_string(),
            last_indexed: 1_700_000_000,
            symbol_count: 10,
            file_count: 2,
            metadata: serde_json::json!({"languages": ["rust"]}),
        };
        store.upsert_workspace_record(&record).unwrap();
        let back = store.get_workspace_record("/workspace").unwrap().unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_bulk_upsert() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);

        let symbols: Vec<Symbol> = (0..250)
            .map(|i| symbol(&format!("s{i}"), &format!("fn{i}"), "/bulk.ts"))
            .collect();
        store.upsert_symbols(&symbols).unwrap();
        assert_eq!(store.get_stats().unwrap().symbols, 250);
    }
}
