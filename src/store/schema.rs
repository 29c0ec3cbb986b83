use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    debug!("Current schema version: {}", current_version);

    if current_version < SCHEMA_VERSION {
        info!(
            "Upgrading schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }

    Ok(())
}

/// Create v1 schema (initial schema)
fn create_v1_schema(conn: &Connection) -> Result<()> {
    // Symbols form an ownership tree via parent_id, rooted at file scope.
    // Children are derived by querying the parent_id index, never stored.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbols (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            language TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            start_column INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            end_column INTEGER NOT NULL,
            start_byte INTEGER NOT NULL DEFAULT 0,
            end_byte INTEGER NOT NULL DEFAULT 0,
            signature TEXT,
            doc_comment TEXT,
            visibility TEXT NOT NULL DEFAULT 'public',
            parent_id TEXT REFERENCES symbols(id) ON DELETE CASCADE,
            metadata TEXT
        )",
        [],
    )?;

    // Edges die with either endpoint: clearing a file removes edges recorded
    // in other files that pointed at the deleted symbols.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_symbol_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            to_symbol_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            file_path TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            metadata TEXT
        )",
        [],
    )?;

    // At most one row per symbol: symbol_id is the primary key.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS type_info (
            symbol_id TEXT PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
            resolved_type TEXT NOT NULL,
            generic_params TEXT NOT NULL DEFAULT '[]',
            constraints TEXT NOT NULL DEFAULT '[]',
            is_inferred INTEGER NOT NULL DEFAULT 0,
            language TEXT NOT NULL,
            metadata TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bindings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_symbol_id TEXT NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
            target_symbol_id TEXT REFERENCES symbols(id) ON DELETE SET NULL,
            kind TEXT NOT NULL,
            source_language TEXT NOT NULL,
            target_language TEXT,
            endpoint TEXT,
            metadata TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            language TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            size INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            parse_time_ms INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspaces (
            path TEXT PRIMARY KEY,
            last_indexed INTEGER NOT NULL,
            symbol_count INTEGER NOT NULL DEFAULT 0,
            file_count INTEGER NOT NULL DEFAULT 0,
            metadata TEXT
        )",
        [],
    )?;

    // Bijection between domain string ids and the integer keys the vector
    // engine requires. Kept first-class so it can be audited or rebuilt.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vector_ids (
            symbol_id TEXT PRIMARY KEY,
            vector_id INTEGER NOT NULL UNIQUE
        )",
        [],
    )?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
        "CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind)",
        "CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_symbol_id, kind)",
        "CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_symbol_id, kind)",
        "CREATE INDEX IF NOT EXISTS idx_relationships_file ON relationships(file_path)",
        "CREATE INDEX IF NOT EXISTS idx_bindings_source ON bindings(source_symbol_id)",
    ] {
        conn.execute(ddl, [])?;
    }

    // Full-text search over symbols, kept in sync by triggers
    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS symbol_fts USING fts5(
            name,
            signature,
            doc_comment,
            file_path,
            content='symbols',
            content_rowid='rowid'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS symbols_ai AFTER INSERT ON symbols BEGIN
            INSERT INTO symbol_fts(rowid, name, signature, doc_comment, file_path)
            VALUES (new.rowid, new.name, new.signature, new.doc_comment, new.file_path);
        END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS symbols_ad AFTER DELETE ON symbols BEGIN
            INSERT INTO symbol_fts(symbol_fts, rowid, name, signature, doc_comment, file_path)
            VALUES ('delete', old.rowid, old.name, old.signature, old.doc_comment, old.file_path);
        END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS symbols_au AFTER UPDATE ON symbols BEGIN
            INSERT INTO symbol_fts(symbol_fts, rowid, name, signature, doc_comment, file_path)
            VALUES ('delete', old.rowid, old.name, old.signature, old.doc_comment, old.file_path);
            INSERT INTO symbol_fts(rowid, name, signature, doc_comment, file_path)
            VALUES (new.rowid, new.name, new.signature, new.doc_comment, new.file_path);
        END",
        [],
    )?;

    Ok(())
}
