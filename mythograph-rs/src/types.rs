//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default embedding model (matches the 3072-dimension default).
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Default name property holding node embeddings.
pub const DEFAULT_EMBEDDING_PROPERTY: &str = "embedding";

/// Default label shared by every entity node so one vector index covers all kinds.
pub const DEFAULT_SHARED_LABEL: &str = "__Entity__";

/// Default fuzzy-match threshold for the resolution pass.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.95;

fn validate_embedding_dim(dim: usize) -> Result<(), validator::ValidationError> {
    if dim == 0 {
        return Err(validator::ValidationError::new("embedding_dim must be > 0"));
    }
    Ok(())
}

fn validate_identifier(value: &str) -> Result<(), validator::ValidationError> {
    let valid = value
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(validator::ValidationError::new(
            "must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)",
        ));
    }
    Ok(())
}

/// Explicit configuration handed to [`crate::pipeline::GraphBuilder`].
///
/// Index name, shared label and dimensionality live here rather than in
/// globals so that two pipelines in one process can target different stores.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MythographConfig {
    /// Neo4j connection URI (e.g. `bolt://localhost:7687`).
    #[validate(length(min = 1))]
    pub neo4j_uri: String,

    /// Neo4j username.
    pub neo4j_user: String,

    /// Neo4j password.
    #[validate(length(min = 1))]
    pub neo4j_password: String,

    /// OpenAI API key. Empty only for store-only commands.
    pub openai_api_key: String,

    /// Embedding model name.
    pub embedding_model: String,

    /// Embedding vector dimension (must be > 0).
    #[validate(custom(function = "validate_embedding_dim"))]
    pub embedding_dim: usize,

    /// Name of the shared vector index.
    #[validate(custom(function = "validate_identifier"))]
    pub vector_index_name: String,

    /// Label carried by every entity node.
    #[validate(custom(function = "validate_identifier"))]
    pub shared_label: String,

    /// Node property holding the embedding vector.
    #[validate(custom(function = "validate_identifier"))]
    pub embedding_property: String,

    /// Name-similarity score at or above which two nodes are merged.
    #[validate(range(min = 0.0, max = 1.0))]
    pub fuzzy_threshold: f64,

    /// Run the resolution pass after ingestion.
    pub resolve_duplicates: bool,
}

impl Default for MythographConfig {
    fn default() -> Self {
        Self {
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            openai_api_key: String::new(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: 3072,
            vector_index_name: "entity_index".to_string(),
            shared_label: DEFAULT_SHARED_LABEL.to_string(),
            embedding_property: DEFAULT_EMBEDDING_PROPERTY.to_string(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            resolve_duplicates: true,
        }
    }
}

impl MythographConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent),
    /// then reads each variable from the process environment. Required variables
    /// (`NEO4J_PASSWORD`, `OPENAI_API_KEY`) return a
    /// [`crate::MythographError::Validation`] error when absent or empty.
    pub fn from_env() -> crate::Result<Self> {
        Self::load_env(true)
    }

    /// Like [`from_env`](Self::from_env), but `OPENAI_API_KEY` may be absent.
    ///
    /// For commands that only touch the store, such as a reset.
    pub fn store_from_env() -> crate::Result<Self> {
        Self::load_env(false)
    }

    fn load_env(require_api_key: bool) -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let neo4j_uri = std::env::var("NEO4J_URI").unwrap_or(defaults.neo4j_uri);
        let neo4j_user = std::env::var("NEO4J_USER").unwrap_or(defaults.neo4j_user);

        let neo4j_password = std::env::var("NEO4J_PASSWORD").map_err(|_| {
            crate::MythographError::Validation("NEO4J_PASSWORD is required".to_string())
        })?;

        let openai_api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ if !require_api_key => String::new(),
            _ => {
                return Err(crate::MythographError::Validation(
                    "OPENAI_API_KEY is required".to_string(),
                ))
            }
        };

        let embedding_model =
            std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model);

        let embedding_dim = match std::env::var("EMBEDDING_DIM") {
            Ok(val) => val.parse::<usize>().map_err(|_| {
                crate::MythographError::Validation(
                    "EMBEDDING_DIM must be a positive integer".to_string(),
                )
            })?,
            Err(_) => defaults.embedding_dim,
        };

        let vector_index_name =
            std::env::var("VECTOR_INDEX_NAME").unwrap_or(defaults.vector_index_name);
        let shared_label = std::env::var("SHARED_LABEL").unwrap_or(defaults.shared_label);
        let embedding_property =
            std::env::var("EMBEDDING_PROPERTY").unwrap_or(defaults.embedding_property);

        let fuzzy_threshold = match std::env::var("FUZZY_THRESHOLD") {
            Ok(val) => val.parse::<f64>().map_err(|_| {
                crate::MythographError::Validation(
                    "FUZZY_THRESHOLD must be a number in [0, 1]".to_string(),
                )
            })?,
            Err(_) => defaults.fuzzy_threshold,
        };

        let resolve_duplicates = match std::env::var("RESOLVE_DUPLICATES") {
            Ok(val) => parse_flag(&val).ok_or_else(|| {
                crate::MythographError::Validation(
                    "RESOLVE_DUPLICATES must be true/false".to_string(),
                )
            })?,
            Err(_) => defaults.resolve_duplicates,
        };

        let config = Self {
            neo4j_uri,
            neo4j_user,
            neo4j_password,
            openai_api_key,
            embedding_model,
            embedding_dim,
            vector_index_name,
            shared_label,
            embedding_property,
            fuzzy_threshold,
            resolve_duplicates,
        };

        config
            .validate()
            .map_err(|e| crate::MythographError::Validation(e.to_string()))?;

        Ok(config)
    }

    /// Vector index parameters derived from this configuration.
    pub fn vector_index(&self) -> VectorIndexSpec {
        VectorIndexSpec {
            name: self.vector_index_name.clone(),
            label: self.shared_label.clone(),
            property: self.embedding_property.clone(),
            dimensions: self.embedding_dim,
            metric: SimilarityMetric::Cosine,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Similarity function backing a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
    Euclidean,
}

impl SimilarityMetric {
    /// Name used in Neo4j index options.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Euclidean => "euclidean",
        }
    }
}

/// Parameters of the shared vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexSpec {
    pub name: String,
    pub label: String,
    pub property: String,
    pub dimensions: usize,
    pub metric: SimilarityMetric,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Tests below mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OPTIONAL: &[&str] = &[
        "NEO4J_URI",
        "NEO4J_USER",
        "EMBEDDING_MODEL",
        "EMBEDDING_DIM",
        "VECTOR_INDEX_NAME",
        "SHARED_LABEL",
        "EMBEDDING_PROPERTY",
        "FUZZY_THRESHOLD",
        "RESOLVE_DUPLICATES",
    ];

    /// Temporarily sets env vars for a test, restoring originals afterward.
    fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let mut touched: Vec<&str> = OPTIONAL.to_vec();
        touched.extend(["NEO4J_PASSWORD", "OPENAI_API_KEY"]);
        let originals: Vec<(&str, Option<String>)> =
            touched.iter().map(|k| (*k, env::var(k).ok())).collect();

        for k in &touched {
            env::remove_var(k);
        }
        for (k, v) in vars {
            env::set_var(k, v);
        }

        let result = f();

        for (k, original) in &originals {
            match original {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }

        result
    }

    #[test]
    fn test_config_defaults() {
        with_env(
            &[("NEO4J_PASSWORD", "secret"), ("OPENAI_API_KEY", "sk-test")],
            || {
                let config = MythographConfig::from_env().expect("config should load");
                assert_eq!(config.neo4j_uri, "bolt://localhost:7687");
                assert_eq!(config.neo4j_user, "neo4j");
                assert_eq!(config.embedding_dim, 3072);
                assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
                assert_eq!(config.vector_index_name, "entity_index");
                assert_eq!(config.shared_label, "__Entity__");
                assert_eq!(config.embedding_property, "embedding");
                assert_eq!(config.fuzzy_threshold, 0.95);
                assert!(config.resolve_duplicates);
            },
        );
    }

    #[test]
    fn test_config_custom_values() {
        with_env(
            &[
                ("NEO4J_URI", "bolt://db.example.com:7687"),
                ("NEO4J_USER", "admin"),
                ("NEO4J_PASSWORD", "mysecret"),
                ("OPENAI_API_KEY", "sk-real-key"),
                ("EMBEDDING_MODEL", "text-embedding-3-small"),
                ("EMBEDDING_DIM", "1536"),
                ("VECTOR_INDEX_NAME", "myth_index"),
                ("SHARED_LABEL", "Signifier"),
                ("FUZZY_THRESHOLD", "0.9"),
                ("RESOLVE_DUPLICATES", "no"),
            ],
            || {
                let config = MythographConfig::from_env().expect("config should load");
                assert_eq!(config.neo4j_uri, "bolt://db.example.com:7687");
                assert_eq!(config.neo4j_user, "admin");
                assert_eq!(config.embedding_dim, 1536);
                assert_eq!(config.vector_index_name, "myth_index");
                assert_eq!(config.shared_label, "Signifier");
                assert_eq!(config.fuzzy_threshold, 0.9);
                assert!(!config.resolve_duplicates);
            },
        );
    }

    #[test]
    fn test_config_missing_password() {
        with_env(&[("OPENAI_API_KEY", "sk-test")], || {
            match MythographConfig::from_env() {
                Err(crate::MythographError::Validation(msg)) => {
                    assert!(msg.contains("NEO4J_PASSWORD"));
                }
                other => panic!("expected Validation error, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_config_missing_api_key() {
        with_env(&[("NEO4J_PASSWORD", "secret")], || {
            assert!(MythographConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_store_config_without_api_key() {
        with_env(&[("NEO4J_PASSWORD", "secret")], || {
            let config = MythographConfig::store_from_env().expect("config should load");
            assert!(config.openai_api_key.is_empty());
        });
        with_env(&[("OPENAI_API_KEY", "sk-test")], || {
            assert!(MythographConfig::store_from_env().is_err());
        });
    }

    #[test]
    fn test_config_empty_api_key() {
        with_env(&[("NEO4J_PASSWORD", "secret"), ("OPENAI_API_KEY", "")], || {
            assert!(MythographConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_config_zero_embedding_dim() {
        with_env(
            &[
                ("NEO4J_PASSWORD", "secret"),
                ("OPENAI_API_KEY", "sk-test"),
                ("EMBEDDING_DIM", "0"),
            ],
            || {
                assert!(MythographConfig::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_config_threshold_out_of_range() {
        with_env(
            &[
                ("NEO4J_PASSWORD", "secret"),
                ("OPENAI_API_KEY", "sk-test"),
                ("FUZZY_THRESHOLD", "1.5"),
            ],
            || {
                assert!(MythographConfig::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_config_rejects_injected_index_name() {
        with_env(
            &[
                ("NEO4J_PASSWORD", "secret"),
                ("OPENAI_API_KEY", "sk-test"),
                ("VECTOR_INDEX_NAME", "idx`; MATCH (n) DETACH DELETE n //"),
            ],
            || {
                assert!(MythographConfig::from_env().is_err());
            },
        );
    }

    #[test]
    fn test_vector_index_spec_from_config() {
        let spec = MythographConfig::default().vector_index();
        assert_eq!(spec.name, "entity_index");
        assert_eq!(spec.label, "__Entity__");
        assert_eq!(spec.dimensions, 3072);
        assert_eq!(spec.metric.as_str(), "cosine");
    }
}
