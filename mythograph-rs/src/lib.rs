//! # mythograph-rs
//!
//! Builds a Form → Concept → Myth knowledge graph from extracted entity and
//! relation records, then deduplicates it.
//!
//! ## Architecture
//!
//! - **Schema**: raw records are validated and their types sanitized before
//!   anything touches the store
//! - **Idempotent upserts**: nodes merge on `(kind, name)`, edges on
//!   `(source, type, target)`; `Generates_Myth` fans out per concept
//! - **Shared vector index**: every kind carries one shared label, so a single
//!   index covers the whole graph
//! - **Entity resolution**: exact then fuzzy merging of duplicates, skipped
//!   when the store lacks the merge extension
//! - **Pluggable store**: Neo4j over Bolt, or an in-memory store for tests

pub mod edges;
pub mod errors;
pub mod nodes;
pub mod schema;
pub mod types;

pub mod driver;
pub mod embedder;

pub mod index;
pub mod maintenance;
pub mod resolution;
pub mod search;
pub mod upsert;

pub mod pipeline;
pub mod utils;

pub use errors::{MythographError, Result};
pub use pipeline::{BuildReport, GraphBuilder};
