//! Error types for mythograph-rs.

/// Alias for Results returning [`MythographError`].
pub type Result<T> = std::result::Result<T, MythographError>;

/// Top-level error type for mythograph-rs.
///
/// Every variant is fatal for the call that produced it. A missing
/// resolution extension is deliberately *not* represented here: it is
/// reported as [`crate::resolution::ResolutionOutcome::Skipped`].
#[derive(Debug, thiserror::Error)]
pub enum MythographError {
    /// Malformed or unsupported entity/relation record.
    #[error("Schema error in {record}: expected {expected}")]
    Schema { record: String, expected: String },

    /// A relation points at an entity that does not exist.
    #[error("Reference error: no entity {key}")]
    Reference { key: String },

    /// Transport or Cypher failure reported by the graph store.
    #[error("Store error: {0}")]
    Store(String),

    /// Inconsistent configuration, e.g. a vector dimension mismatch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Embedder error: {0}")]
    Embedder(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MythographError {
    /// Build a [`MythographError::Schema`] from anything printable.
    pub fn schema(record: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Schema {
            record: record.into(),
            expected: expected.into(),
        }
    }

    /// Build a [`MythographError::Reference`] for a `Kind:name` key.
    pub fn reference(key: impl std::fmt::Display) -> Self {
        Self::Reference {
            key: key.to_string(),
        }
    }
}

impl From<neo4rs::Error> for MythographError {
    fn from(err: neo4rs::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<neo4rs::DeError> for MythographError {
    fn from(err: neo4rs::DeError) -> Self {
        Self::Store(format!("unexpected row shape: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_record_and_shape() {
        let err = MythographError::schema("entities[3] {\"type\":\"Animal\"}", "type Form|Concept|Myth");
        let msg = err.to_string();
        assert!(msg.contains("entities[3]"));
        assert!(msg.contains("Form|Concept|Myth"));
    }

    #[test]
    fn reference_error_names_key() {
        let err = MythographError::reference("Concept:Cunning");
        assert_eq!(err.to_string(), "Reference error: no entity Concept:Cunning");
    }

    #[test]
    fn serde_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MythographError = bad.into();
        assert!(matches!(err, MythographError::Serialization(_)));
    }
}
