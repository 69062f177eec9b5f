//! Ingestion pipeline.
//!
//! [`GraphBuilder::build`] runs the stages in order, each awaited before the
//! next starts:
//! 1. **Provider check**: embedder dimensionality must match the index
//! 2. **Validate**: schema and referential checks over the whole batch
//! 3. **Index**: ensure the shared vector index exists
//! 4. **Nodes**: upsert every entity
//! 5. **Edges**: upsert every relation (with `Generates_Myth` fan-out)
//! 6. **Embed**: one batched embedding call over the stored node properties,
//!    one batched vector write
//! 7. **Resolve**: exact then fuzzy entity resolution
//!
//! Stages 1 and 2 fail before anything is written.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::driver::{GraphStore, ScoredNode};
use crate::embedder::EmbedderClient;
use crate::errors::Result;
use crate::index::VectorIndexManager;
use crate::maintenance::{self, ResetReport};
use crate::nodes::NodeId;
use crate::resolution::{ResolutionEngine, ResolutionOutcome};
use crate::schema::{validate_batch, IngestionBatch};
use crate::search;
use crate::types::MythographConfig;
use crate::upsert::GraphUpserter;

/// Summary of one [`GraphBuilder::build`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    /// Distinct entity keys upserted.
    pub nodes: usize,
    /// Distinct edges upserted, after fan-out.
    pub edges: usize,
    /// Vectors written.
    pub embeddings: usize,
    /// `None` when resolution is disabled in the configuration.
    pub resolution: Option<ResolutionOutcome>,
    /// Set when resolution was requested but the store cannot merge nodes.
    pub degraded_resolution: bool,
}

/// Drives a batch from raw records to a resolved, indexed graph.
pub struct GraphBuilder<S: GraphStore, E: EmbedderClient> {
    store: S,
    embedder: E,
    config: MythographConfig,
}

impl<S: GraphStore, E: EmbedderClient> GraphBuilder<S, E> {
    pub fn new(store: S, embedder: E, config: MythographConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MythographConfig {
        &self.config
    }

    fn index_manager(&self) -> VectorIndexManager<'_, S> {
        VectorIndexManager::new(&self.store, self.config.vector_index())
    }

    /// Ingest one batch.
    pub async fn build(&self, batch: &IngestionBatch) -> Result<BuildReport> {
        let index = self.index_manager();
        index.check_provider(self.embedder.dim())?;

        let validated = validate_batch(batch)?;
        let entities = validated.distinct_entities();
        info!(
            entities = entities.len(),
            relations = validated.relations.len(),
            "batch validated"
        );

        index.ensure_index().await?;

        let upserter = GraphUpserter::new(&self.store);
        let mut node_ids: Vec<NodeId> = Vec::with_capacity(entities.len());
        for entity in &entities {
            node_ids.push(upserter.upsert_entity(entity).await?);
        }
        info!(nodes = node_ids.len(), "nodes upserted");

        let mut edge_ids = BTreeSet::new();
        for relation in &validated.relations {
            edge_ids.extend(upserter.upsert_relation(relation).await?);
        }
        info!(edges = edge_ids.len(), "edges upserted");

        // Stored properties, not the batch's: an earlier run may already have
        // set the description.
        let stored = self.store.nodes_by_id(&node_ids).await?;
        let texts: Vec<String> = stored.iter().map(|n| n.embedding_text()).collect();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = if text_refs.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&text_refs).await?
        };
        let embeddings = index.upsert_embeddings(&node_ids, &vectors).await?;
        info!(embeddings, index = %index.spec().name, "embeddings stored");

        let resolution = if self.config.resolve_duplicates {
            let engine =
                ResolutionEngine::new(&self.store).with_threshold(self.config.fuzzy_threshold);
            Some(engine.resolve().await?)
        } else {
            info!("entity resolution disabled");
            None
        };

        Ok(BuildReport {
            nodes: node_ids.len(),
            edges: edge_ids.len(),
            embeddings,
            degraded_resolution: resolution.is_some_and(|r| r.is_skipped()),
            resolution,
        })
    }

    /// Drop every constraint, index, node and edge.
    pub async fn reset(&self) -> Result<ResetReport> {
        maintenance::reset(&self.store).await
    }

    /// Reset the store, then build `batch` into it.
    pub async fn rebuild(&self, batch: &IngestionBatch) -> Result<BuildReport> {
        self.reset().await?;
        self.build(batch).await
    }

    /// Nearest entities to `text` in the shared index.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredNode>> {
        self.index_manager().check_provider(self.embedder.dim())?;
        search::search_similar(
            &self.store,
            &self.embedder,
            &self.config.vector_index_name,
            text,
            k,
        )
        .await
    }
}
