//! Shared utilities.
//!
//! Includes:
//! - Date/time helpers (creation timestamps as stored in Neo4j)
//! - String normalization and JSON extraction helpers
//! - Vector and name similarity

pub mod datetime;
pub mod similarity;
pub mod text;

pub use datetime::{format_neo4j_datetime, parse_flexible_datetime, strictly_after};
pub use similarity::{cosine_similarity, euclidean_similarity, name_similarity};
pub use text::{extract_json_from_response, non_blank, normalize_whitespace};
