// Symbol storage: domain records and schema/database submodules

pub mod db;
pub mod schema;

pub use db::{ReferenceHit, SearchHit, StoreStats, SymbolStore};

use serde::{Deserialize, Serialize};

/// Revision of the open-ended `metadata` JSON carried by symbols,
/// relationships, bindings, and workspaces. Readers should tolerate unknown
/// keys and check this when the layout of known keys changes.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// A code symbol (function, class, field, etc.) with a source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Globally unique string id, assigned by the extractor.
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub language: String,
    pub file_path: String,
    pub span: Span,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub visibility: Visibility,
    /// Owning symbol, forming a tree rooted at file scope. Must reference an
    /// existing symbol when set.
    pub parent_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Source span: 1-indexed lines, 0-indexed columns, byte offsets into the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub start_byte: u32,
    pub end_byte: u32,
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Struct,
    Enum,
    Property,
    Field,
    Method,
    Constructor,
    Variable,
    Import,
    Export,
    Module,
    TypeAlias,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Variable => "variable",
            SymbolKind::Import => "import",
            SymbolKind::Export => "export",
            SymbolKind::Module => "module",
            SymbolKind::TypeAlias => "type_alias",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "struct" => Some(SymbolKind::Struct),
            "enum" => Some(SymbolKind::Enum),
            "property" => Some(SymbolKind::Property),
            "field" => Some(SymbolKind::Field),
            "method" => Some(SymbolKind::Method),
            "constructor" => Some(SymbolKind::Constructor),
            "variable" => Some(SymbolKind::Variable),
            "import" => Some(SymbolKind::Import),
            "export" => Some(SymbolKind::Export),
            "module" => Some(SymbolKind::Module),
            "type_alias" => Some(SymbolKind::TypeAlias),
            _ => None,
        }
    }
}

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            "internal" => Some(Visibility::Internal),
            _ => None,
        }
    }
}

/// A directed, kinded edge between two symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Autoincrement row id; `None` until inserted.
    pub id: Option<i64>,
    pub from_symbol_id: String,
    pub to_symbol_id: String,
    pub kind: RelationshipKind,
    /// File in which the occurrence was observed (usually the "from" side).
    pub file_path: String,
    pub line_number: u32,
    /// 1.0 for syntactic edges, lower for inferred ones.
    pub confidence: f32,
    pub metadata: serde_json::Value,
}

/// Relationship kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Extends,
    Implements,
    Uses,
    References,
    Returns,
    Contains,
    Imports,
    DependsOn,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Calls => "calls",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::Uses => "uses",
            RelationshipKind::References => "references",
            RelationshipKind::Returns => "returns",
            RelationshipKind::Contains => "contains",
            RelationshipKind::Imports => "imports",
            RelationshipKind::DependsOn => "depends_on",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calls" => Some(RelationshipKind::Calls),
            "extends" => Some(RelationshipKind::Extends),
            "implements" => Some(RelationshipKind::Implements),
            "uses" => Some(RelationshipKind::Uses),
            "references" => Some(RelationshipKind::References),
            "returns" => Some(RelationshipKind::Returns),
            "contains" => Some(RelationshipKind::Contains),
            "imports" => Some(RelationshipKind::Imports),
            "depends_on" => Some(RelationshipKind::DependsOn),
            _ => None,
        }
    }
}

/// Resolved type information, at most one row per symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub symbol_id: String,
    pub resolved_type: String,
    pub generic_params: Vec<String>,
    pub constraints: Vec<String>,
    pub is_inferred: bool,
    pub language: String,
    pub metadata: serde_json::Value,
}

/// Cross-language call edge (FFI, REST, gRPC, ...) that is not a pure
/// in-repo relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub id: Option<i64>,
    pub source_symbol_id: String,
    /// Resolved in-repo target, when one exists.
    pub target_symbol_id: Option<String>,
    pub kind: BindingKind,
    pub source_language: String,
    pub target_language: Option<String>,
    pub endpoint: Option<String>,
    pub metadata: serde_json::Value,
}

/// Binding kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Ffi,
    RestApi,
    Grpc,
    Graphql,
    MessageQueue,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Ffi => "ffi",
            BindingKind::RestApi => "rest_api",
            BindingKind::Grpc => "grpc",
            BindingKind::Graphql => "graphql",
            BindingKind::MessageQueue => "message_queue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ffi" => Some(BindingKind::Ffi),
            "rest_api" => Some(BindingKind::RestApi),
            "grpc" => Some(BindingKind::Grpc),
            "graphql" => Some(BindingKind::Graphql),
            "message_queue" => Some(BindingKind::MessageQueue),
            _ => None,
        }
    }
}

/// Freshness marker for incremental re-indexing, one row per file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: String,
    /// Unix seconds of the file's mtime at index time.
    pub last_modified: i64,
    pub size: u64,
    pub content_hash: String,
    pub parse_time_ms: u32,
}

/// Coarse per-workspace progress tracking, updated by the indexing driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub path: String,
    pub last_indexed: i64,
    pub symbol_count: u64,
    pub file_count: u64,
    pub metadata: serde_json::Value,
}

/// Blake3 hash of file content, hex-encoded. Used by indexing drivers for
/// the "file unchanged" check against `FileRecord.content_hash`.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
