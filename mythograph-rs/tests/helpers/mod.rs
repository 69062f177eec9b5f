use mythograph_rs::driver::MemoryStore;
use mythograph_rs::embedder::{EmbedderClient, Embedding};
use mythograph_rs::types::MythographConfig;
use mythograph_rs::{GraphBuilder, Result};

/// Dimensionality used by every integration test.
pub const TEST_DIM: usize = 8;

/// Deterministic embedder: bucket counts of the text's characters.
///
/// Identical texts embed identically, so a search for an entity's own
/// embedding text ranks that entity first.
pub struct CharBucketEmbedder {
    pub dim: usize,
}

impl CharBucketEmbedder {
    pub fn new() -> Self {
        Self { dim: TEST_DIM }
    }

    pub fn vector(&self, text: &str) -> Embedding {
        let mut v = vec![0.0_f32; self.dim];
        for c in text.chars() {
            v[c as usize % self.dim] += 1.0;
        }
        v
    }
}

impl EmbedderClient for CharBucketEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

pub fn test_config() -> MythographConfig {
    MythographConfig {
        neo4j_password: "unused".to_string(),
        openai_api_key: "unused".to_string(),
        embedding_dim: TEST_DIM,
        ..MythographConfig::default()
    }
}

pub fn builder(store: MemoryStore) -> GraphBuilder<MemoryStore, CharBucketEmbedder> {
    GraphBuilder::new(store, CharBucketEmbedder::new(), test_config())
}

/// The tiger example: one Connotes edge and a two-concept myth.
pub const TIGER_BATCH: &str = r#"{
    "entities": [
        {"type": "Form", "name": "Tiger", "aliases": ["Smoking Tiger"], "description": "A tiger smoking a pipe"},
        {"type": "Concept", "name": "Power", "description": "Physical and social strength"},
        {"type": "Concept", "name": "Authority"},
        {"type": "Myth", "name": "Fearsome Ruler", "description": "Rule sustained by fear"}
    ],
    "relations": [
        {"type": "Connotes", "source": "Tiger", "target": "Power"},
        {"type": "Generates_Myth", "source_concepts": ["Power", "Authority"], "target": "Fearsome Ruler",
         "description": "Power and authority read as natural rule"}
    ]
}"#;
