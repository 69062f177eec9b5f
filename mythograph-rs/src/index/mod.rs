//! Vector index manager.
//!
//! One vector index on the shared label covers every entity kind. The
//! manager creates it when missing, refuses to run against an index or a
//! provider of a different dimensionality, and writes embeddings in one
//! batched store call.

use tracing::{debug, info};

use crate::driver::GraphStore;
use crate::errors::{MythographError, Result};
use crate::nodes::NodeId;
use crate::types::VectorIndexSpec;

/// Outcome of [`VectorIndexManager::ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    AlreadyPresent,
}

pub struct VectorIndexManager<'a, S: GraphStore> {
    store: &'a S,
    spec: VectorIndexSpec,
}

impl<'a, S: GraphStore> VectorIndexManager<'a, S> {
    pub fn new(store: &'a S, spec: VectorIndexSpec) -> Self {
        Self { store, spec }
    }

    pub fn spec(&self) -> &VectorIndexSpec {
        &self.spec
    }

    /// Create the shared index if it does not exist.
    ///
    /// # Errors
    /// [`MythographError::Configuration`] if an index of that name exists with
    /// a different label, property, dimensionality or similarity metric.
    pub async fn ensure_index(&self) -> Result<IndexStatus> {
        let Some(existing) = self.store.vector_index(&self.spec.name).await? else {
            self.store.create_vector_index(&self.spec).await?;
            info!(
                index = %self.spec.name,
                label = %self.spec.label,
                dimensions = self.spec.dimensions,
                metric = self.spec.metric.as_str(),
                "created vector index"
            );
            return Ok(IndexStatus::Created);
        };

        if let Some((field, found, expected)) = first_difference(&existing, &self.spec) {
            return Err(MythographError::Configuration(format!(
                "vector index {} has {field} {found}, configuration expects {expected}",
                existing.name
            )));
        }
        debug!(index = %self.spec.name, "vector index already present");
        Ok(IndexStatus::AlreadyPresent)
    }

    /// Check that an embedding provider produces vectors of the configured size.
    pub fn check_provider(&self, provider_dim: usize) -> Result<()> {
        if provider_dim != self.spec.dimensions {
            return Err(MythographError::Configuration(format!(
                "embedding provider produces {provider_dim}-dimension vectors, \
                 index {} is configured for {}",
                self.spec.name, self.spec.dimensions
            )));
        }
        Ok(())
    }

    /// Store `vectors[i]` on node `ids[i]` in a single store call.
    ///
    /// Everything is checked before the write; an empty batch writes nothing.
    pub async fn upsert_embeddings(&self, ids: &[NodeId], vectors: &[Vec<f32>]) -> Result<usize> {
        if ids.len() != vectors.len() {
            return Err(MythographError::Configuration(format!(
                "{} node ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        if let Some((id, vector)) = ids
            .iter()
            .zip(vectors)
            .find(|(_, v)| v.len() != self.spec.dimensions)
        {
            return Err(MythographError::Configuration(format!(
                "vector for node {id} has {} dimensions, expected {}",
                vector.len(),
                self.spec.dimensions
            )));
        }
        if ids.is_empty() {
            return Ok(0);
        }

        self.store
            .upsert_vectors(ids, &self.spec.property, vectors)
            .await?;
        debug!(count = ids.len(), index = %self.spec.name, "stored embeddings");
        Ok(ids.len())
    }
}

/// First parameter in which `existing` differs from `wanted`, as
/// `(field, existing value, wanted value)`.
fn first_difference(
    existing: &VectorIndexSpec,
    wanted: &VectorIndexSpec,
) -> Option<(&'static str, String, String)> {
    if existing.label != wanted.label {
        return Some(("label", existing.label.clone(), wanted.label.clone()));
    }
    if existing.property != wanted.property {
        return Some(("property", existing.property.clone(), wanted.property.clone()));
    }
    if existing.dimensions != wanted.dimensions {
        return Some((
            "dimensions",
            existing.dimensions.to_string(),
            wanted.dimensions.to_string(),
        ));
    }
    if existing.metric != wanted.metric {
        return Some((
            "metric",
            existing.metric.as_str().to_string(),
            wanted.metric.as_str().to_string(),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryStore;
    use crate::nodes::NodeProps;
    use crate::schema::{EntityKind, NodeKey};
    use crate::types::SimilarityMetric;

    fn spec(dimensions: usize) -> VectorIndexSpec {
        VectorIndexSpec {
            name: "entity_index".to_string(),
            label: "__Entity__".to_string(),
            property: "embedding".to_string(),
            dimensions,
            metric: SimilarityMetric::Cosine,
        }
    }

    #[tokio::test]
    async fn ensure_index_creates_once() {
        let store = MemoryStore::new();
        let manager = VectorIndexManager::new(&store, spec(3));
        assert_eq!(manager.ensure_index().await.unwrap(), IndexStatus::Created);
        assert_eq!(manager.ensure_index().await.unwrap(), IndexStatus::AlreadyPresent);
        assert_eq!(store.list_indexes().await.unwrap(), vec!["entity_index"]);
    }

    #[tokio::test]
    async fn ensure_index_rejects_dimension_mismatch() {
        let store = MemoryStore::new();
        VectorIndexManager::new(&store, spec(3)).ensure_index().await.unwrap();

        let err = VectorIndexManager::new(&store, spec(4))
            .ensure_index()
            .await
            .unwrap_err();
        assert!(matches!(err, MythographError::Configuration(_)));
    }

    #[tokio::test]
    async fn ensure_index_rejects_other_label_property_or_metric() {
        let store = MemoryStore::new();
        VectorIndexManager::new(
            &store,
            VectorIndexSpec {
                label: "Form".to_string(),
                metric: SimilarityMetric::Euclidean,
                ..spec(3)
            },
        )
        .ensure_index()
        .await
        .unwrap();

        match VectorIndexManager::new(&store, spec(3)).ensure_index().await {
            Err(MythographError::Configuration(msg)) => {
                assert!(msg.contains("label Form"), "{msg}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }

        let other_property = VectorIndexSpec {
            property: "vector".to_string(),
            ..spec(3)
        };
        assert_eq!(
            first_difference(&other_property, &spec(3)).map(|d| d.0),
            Some("property")
        );
        let other_metric = VectorIndexSpec {
            metric: SimilarityMetric::Euclidean,
            ..spec(3)
        };
        assert_eq!(
            first_difference(&other_metric, &spec(3)).map(|d| d.0),
            Some("metric")
        );
        assert_eq!(first_difference(&spec(3), &spec(3)), None);
    }

    #[test]
    fn provider_dimension_must_match() {
        let store = MemoryStore::new();
        let manager = VectorIndexManager::new(&store, spec(3072));
        assert!(manager.check_provider(3072).is_ok());
        assert!(matches!(
            manager.check_provider(1536),
            Err(MythographError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn upsert_embeddings_validates_before_writing() {
        let store = MemoryStore::new();
        let a = store
            .insert_node(&NodeKey::new(EntityKind::Form, "A"), &NodeProps::default())
            .await;
        let b = store
            .insert_node(&NodeKey::new(EntityKind::Form, "B"), &NodeProps::default())
            .await;
        let manager = VectorIndexManager::new(&store, spec(2));

        let err = manager
            .upsert_embeddings(&[a.clone(), b.clone()], &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, MythographError::Configuration(_)));

        let err = manager
            .upsert_embeddings(&[a.clone(), b.clone()], &[vec![1.0, 0.0], vec![1.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, MythographError::Configuration(_)));
        assert!(store.vector(&a, "embedding").await.is_none());

        assert_eq!(manager.upsert_embeddings(&[], &[]).await.unwrap(), 0);
        assert_eq!(
            manager
                .upsert_embeddings(&[a.clone(), b], &[vec![1.0, 0.0], vec![0.0, 1.0]])
                .await
                .unwrap(),
            2
        );
        assert_eq!(store.vector(&a, "embedding").await, Some(vec![1.0, 0.0]));
    }
}
