//! CodeAtlas — persistent code symbol store with hybrid retrieval.
//!
//! Indexes code entities ("symbols") and their relationships into SQLite,
//! stores one embedding per symbol in a sqlite-vec virtual table, and answers
//! retrieval queries that fuse exact/structural matching with semantic
//! nearest-neighbor similarity.
//!
//! The API is synchronous and blocking; extraction, embedding generation,
//! and file watching live in external drivers that feed records in through
//! [`store::SymbolStore`] and [`vector::VectorIndex`].

pub mod config;
pub mod error;
pub mod query;
pub mod store;
pub mod vector;

pub use config::Config;
pub use error::{Result, StoreError};
pub use query::{HybridHit, HybridSearch, Layer, SearchMethod};
pub use store::{
    Binding, FileRecord, Relationship, RelationshipKind, Span, StoreStats, Symbol, SymbolKind,
    SymbolStore, TypeInfo, Visibility, WorkspaceRecord,
};
pub use vector::{VectorHit, VectorIndex};
