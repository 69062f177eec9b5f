//! Graph upsert engine.
//!
//! Idempotent writes of validated entities and relations. Running the same
//! batch twice leaves the graph unchanged after the first run.

use tracing::debug;

use crate::driver::GraphStore;
use crate::edges::EdgeId;
use crate::errors::{MythographError, Result};
use crate::nodes::{NodeId, NodeProps};
use crate::schema::{Entity, EntityKind, NodeKey, Relation, RelationKind};
use crate::utils::non_blank;

/// Writes nodes and edges through a [`GraphStore`].
pub struct GraphUpserter<'a, S: GraphStore> {
    store: &'a S,
}

impl<'a, S: GraphStore> GraphUpserter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Find-or-create the node `(kind, name)`.
    ///
    /// A new node gets `description` and `aliases`; an existing one keeps a
    /// non-empty description and gains any new aliases. Blank descriptions
    /// and aliases count as absent.
    pub async fn upsert_node(
        &self,
        kind: EntityKind,
        name: &str,
        description: Option<&str>,
        aliases: &[String],
    ) -> Result<NodeId> {
        let key = NodeKey::new(kind, name);
        let props = NodeProps {
            description: non_blank(description),
            aliases: aliases
                .iter()
                .filter_map(|a| non_blank(Some(a.as_str())))
                .collect(),
        };
        let id = self.store.merge_node(&key, &props).await?;
        debug!(node = %key, %id, "upserted node");
        Ok(id)
    }

    /// Upsert a validated entity.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<NodeId> {
        self.upsert_node(
            entity.kind,
            &entity.name,
            entity.description.as_deref(),
            &entity.aliases,
        )
        .await
    }

    /// Find-or-create one `rel` edge.
    ///
    /// # Errors
    /// - [`MythographError::Schema`] if the endpoint kinds do not fit `rel`.
    /// - [`MythographError::Reference`] if an endpoint node does not exist.
    pub async fn upsert_edge(
        &self,
        source: &NodeKey,
        rel: RelationKind,
        target: &NodeKey,
        description: Option<&str>,
    ) -> Result<EdgeId> {
        let (source_kind, target_kind) = rel.endpoints();
        if source.kind != source_kind || target.kind != target_kind {
            return Err(MythographError::schema(
                format!("{rel} edge {source} -> {target}"),
                format!("{source_kind} -> {target_kind}"),
            ));
        }

        let description = non_blank(description);
        let id = self
            .store
            .merge_edge(source, rel, target, description.as_deref())
            .await?;
        debug!(%source, %rel, %target, %id, "upserted edge");
        Ok(id)
    }

    /// Upsert every edge a relation expands to.
    ///
    /// `Generates_Myth` fans out to one edge per concept, concepts taken in
    /// lexicographic order; all edges share the relation's description.
    pub async fn upsert_relation(&self, relation: &Relation) -> Result<Vec<EdgeId>> {
        let rel = relation.kind();
        let mut ids = Vec::new();
        for (source, target) in relation.edge_keys() {
            ids.push(
                self.upsert_edge(&source, rel, &target, relation.description())
                    .await?,
            );
        }
        Ok(ids)
    }
}
