//! In-process graph store.
//!
//! Implements the full [`GraphStore`] contract over plain collections so the
//! pipeline can be exercised without a database. Node ids are sequential
//! (`n1`, `n2`, …), creation timestamps strictly increase, and every listing
//! is returned in a deterministic order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{GraphStore, MergePlan, ScoredNode};
use crate::edges::{EdgeId, RelationEdge};
use crate::errors::{MythographError, Result};
use crate::nodes::{EntityNode, NodeId, NodeProps};
use crate::schema::{union_in_order, EntityKind, NodeKey, RelationKind};
use crate::types::{SimilarityMetric, VectorIndexSpec};
use crate::utils::{cosine_similarity, euclidean_similarity, strictly_after};

#[derive(Debug)]
struct StoredNode {
    node: EntityNode,
    /// Property name → vector.
    vectors: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<NodeId, StoredNode>,
    edges: Vec<RelationEdge>,
    next_node: u64,
    next_edge: u64,
    last_created: Option<DateTime<Utc>>,
    vector_indexes: BTreeMap<String, VectorIndexSpec>,
    indexes: BTreeSet<String>,
    constraints: BTreeSet<String>,
}

impl State {
    fn find_node(&self, key: &NodeKey) -> Option<&NodeId> {
        // Earliest-created match, as the first row of a MATCH would be.
        self.nodes
            .values()
            .filter(|s| s.node.kind == key.kind && s.node.name == key.name)
            .min_by(|a, b| a.node.created_order(&b.node))
            .map(|s| &s.node.id)
    }

    fn ordered_nodes(&self) -> Vec<&EntityNode> {
        let mut nodes: Vec<&EntityNode> = self.nodes.values().map(|s| &s.node).collect();
        nodes.sort_by(|a, b| a.created_order(b));
        nodes
    }
}

/// In-memory [`GraphStore`].
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    resolution_capability: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store with the resolution capability present.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            resolution_capability: true,
        }
    }

    /// Toggle the resolution capability reported by the probe.
    pub fn with_resolution_capability(mut self, available: bool) -> Self {
        self.resolution_capability = available;
        self
    }

    /// Create a plain (non-vector) index, as another tool might have.
    pub async fn add_index(&self, name: impl Into<String>) {
        self.state.lock().await.indexes.insert(name.into());
    }

    /// Create a constraint, as another tool might have.
    pub async fn add_constraint(&self, name: impl Into<String>) {
        self.state.lock().await.constraints.insert(name.into());
    }

    /// Insert a node unconditionally, bypassing the merge key.
    ///
    /// Produces the duplicates the resolution pass exists to remove (for
    /// instance nodes written by concurrent writers).
    pub async fn insert_node(&self, key: &NodeKey, props: &NodeProps) -> NodeId {
        let mut state = self.state.lock().await;
        insert_node(&mut state, key, props)
    }

    /// Insert an edge unconditionally between two node ids.
    pub async fn insert_edge(
        &self,
        source: &NodeId,
        kind: RelationKind,
        target: &NodeId,
        description: Option<&str>,
    ) -> EdgeId {
        let mut state = self.state.lock().await;
        insert_edge(&mut state, source, kind, target, description)
    }

    /// Stored vector of `id` under `property`, if any.
    pub async fn vector(&self, id: &NodeId, property: &str) -> Option<Vec<f32>> {
        let state = self.state.lock().await;
        state.nodes.get(id)?.vectors.get(property).cloned()
    }

    /// Node by id.
    pub async fn node(&self, id: &NodeId) -> Option<EntityNode> {
        let state = self.state.lock().await;
        state.nodes.get(id).map(|s| s.node.clone())
    }
}

fn insert_node(state: &mut State, key: &NodeKey, props: &NodeProps) -> NodeId {
    state.next_node += 1;
    let id = NodeId(format!("n{}", state.next_node));
    let created_at = strictly_after(state.last_created);
    state.last_created = Some(created_at);

    let mut aliases = Vec::new();
    union_in_order(&mut aliases, props.aliases.iter().cloned());
    let node = EntityNode {
        id: id.clone(),
        kind: key.kind,
        name: key.name.clone(),
        description: props.description.clone(),
        aliases,
        created_at,
    };
    state.nodes.insert(
        id.clone(),
        StoredNode {
            node,
            vectors: BTreeMap::new(),
        },
    );
    id
}

fn insert_edge(
    state: &mut State,
    source: &NodeId,
    kind: RelationKind,
    target: &NodeId,
    description: Option<&str>,
) -> EdgeId {
    state.next_edge += 1;
    let id = EdgeId(format!("e{}", state.next_edge));
    state.edges.push(RelationEdge {
        id: id.clone(),
        source: source.clone(),
        target: target.clone(),
        kind,
        description: description.map(str::to_string),
    });
    id
}

impl GraphStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn merge_node(&self, key: &NodeKey, props: &NodeProps) -> Result<NodeId> {
        let mut state = self.state.lock().await;
        let Some(id) = state.find_node(key).cloned() else {
            return Ok(insert_node(&mut state, key, props));
        };

        if let Some(stored) = state.nodes.get_mut(&id) {
            let node = &mut stored.node;
            if node.description.is_none() {
                node.description = props.description.clone();
            }
            union_in_order(&mut node.aliases, props.aliases.iter().cloned());
        }
        Ok(id)
    }

    async fn merge_edge(
        &self,
        source: &NodeKey,
        kind: RelationKind,
        target: &NodeKey,
        description: Option<&str>,
    ) -> Result<EdgeId> {
        let mut state = self.state.lock().await;
        let source_id = state
            .find_node(source)
            .cloned()
            .ok_or_else(|| MythographError::reference(source))?;
        let target_id = state
            .find_node(target)
            .cloned()
            .ok_or_else(|| MythographError::reference(target))?;

        let existing = state
            .edges
            .iter_mut()
            .find(|e| e.source == source_id && e.kind == kind && e.target == target_id);
        match existing {
            Some(edge) => {
                if edge.description.is_none() {
                    edge.description = description.map(str::to_string);
                }
                Ok(edge.id.clone())
            }
            None => Ok(insert_edge(&mut state, &source_id, kind, &target_id, description)),
        }
    }

    async fn list_nodes(&self, kind: Option<EntityKind>) -> Result<Vec<EntityNode>> {
        let state = self.state.lock().await;
        Ok(state
            .ordered_nodes()
            .into_iter()
            .filter(|n| kind.map_or(true, |k| n.kind == k))
            .cloned()
            .collect())
    }

    async fn nodes_by_id(&self, ids: &[NodeId]) -> Result<Vec<EntityNode>> {
        let state = self.state.lock().await;
        ids.iter()
            .map(|id| {
                state
                    .nodes
                    .get(id)
                    .map(|s| s.node.clone())
                    .ok_or_else(|| MythographError::Store(format!("no node with id {id}")))
            })
            .collect()
    }

    async fn list_edges(&self) -> Result<Vec<RelationEdge>> {
        Ok(self.state.lock().await.edges.clone())
    }

    async fn probe_resolution_capability(&self) -> Result<bool> {
        Ok(self.resolution_capability)
    }

    async fn merge_nodes(&self, plan: &MergePlan) -> Result<()> {
        if !self.resolution_capability {
            return Err(MythographError::Store(
                "resolution extension is not installed".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        for id in std::iter::once(&plan.survivor).chain(&plan.retired) {
            if !state.nodes.contains_key(id) {
                return Err(MythographError::Store(format!("no node with id {id}")));
            }
        }

        for retired in &plan.retired {
            if let Some(gone) = state.nodes.remove(retired) {
                // Vectors of the survivor win; keep a retired one only where
                // the survivor has none.
                if let Some(survivor) = state.nodes.get_mut(&plan.survivor) {
                    for (property, vector) in gone.vectors {
                        survivor.vectors.entry(property).or_insert(vector);
                    }
                }
            }
        }
        if let Some(survivor) = state.nodes.get_mut(&plan.survivor) {
            survivor.node.description = plan.description.clone();
            survivor.node.aliases = plan.aliases.clone();
        }

        for edge in state.edges.iter_mut() {
            if plan.retired.contains(&edge.source) {
                edge.source = plan.survivor.clone();
            }
            if plan.retired.contains(&edge.target) {
                edge.target = plan.survivor.clone();
            }
        }

        // Collapse edges that now share a triple into the earliest one.
        let mut kept: Vec<RelationEdge> = Vec::with_capacity(state.edges.len());
        for edge in std::mem::take(&mut state.edges) {
            match kept.iter_mut().find(|k| k.triple() == edge.triple()) {
                Some(first) => {
                    if first.description.is_none() {
                        first.description = edge.description;
                    }
                }
                None => kept.push(edge),
            }
        }
        state.edges = kept;
        Ok(())
    }

    async fn vector_index(&self, name: &str) -> Result<Option<VectorIndexSpec>> {
        Ok(self.state.lock().await.vector_indexes.get(name).cloned())
    }

    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.vector_indexes.contains_key(&spec.name) || state.indexes.contains(&spec.name) {
            return Err(MythographError::Store(format!(
                "an index named {} already exists",
                spec.name
            )));
        }
        state.vector_indexes.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn upsert_vectors(
        &self,
        ids: &[NodeId],
        property: &str,
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(missing) = ids.iter().find(|id| !state.nodes.contains_key(*id)) {
            return Err(MythographError::Store(format!("no node with id {missing}")));
        }
        for (id, vector) in ids.iter().zip(vectors) {
            if let Some(stored) = state.nodes.get_mut(id) {
                stored.vectors.insert(property.to_string(), vector.clone());
            }
        }
        Ok(())
    }

    async fn query_vector_index(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNode>> {
        let state = self.state.lock().await;
        let spec = state
            .vector_indexes
            .get(name)
            .ok_or_else(|| MythographError::Store(format!("no vector index named {name}")))?;
        if vector.len() != spec.dimensions {
            return Err(MythographError::Store(format!(
                "query vector has {} dimensions, index {name} expects {}",
                vector.len(),
                spec.dimensions
            )));
        }

        let mut scored: Vec<ScoredNode> = state
            .nodes
            .values()
            .filter_map(|stored| {
                let candidate = stored.vectors.get(&spec.property)?;
                let score = match spec.metric {
                    SimilarityMetric::Cosine => cosine_similarity(vector, candidate),
                    SimilarityMetric::Euclidean => euclidean_similarity(vector, candidate),
                };
                Some(ScoredNode {
                    node: stored.node.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.created_order(&b.node))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn list_constraints(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.constraints.iter().cloned().collect())
    }

    async fn drop_constraint(&self, name: &str) -> Result<()> {
        self.state.lock().await.constraints.remove(name);
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state
            .indexes
            .iter()
            .chain(state.vector_indexes.keys())
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.indexes.remove(name);
        state.vector_indexes.remove(name);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.nodes.clear();
        state.edges.clear();
        Ok(())
    }
}
