//! Graph database driver abstraction.
//!
//! Defines the [`GraphStore`] trait every backend implements, plus two
//! backends:
//! - [`neo4j::Neo4jStore`]: Neo4j over Bolt, APOC for resolution merges.
//! - [`memory::MemoryStore`]: deterministic in-process store for tests and
//!   dry runs.
//!
//! Each method is one request/response unit against the store. Nothing is
//! retried here and no store state is cached between calls.

pub mod memory;
pub mod neo4j;

use serde::{Deserialize, Serialize};

use crate::edges::{EdgeId, RelationEdge};
use crate::errors::Result;
use crate::nodes::{EntityNode, NodeId, NodeProps};
use crate::schema::{EntityKind, NodeKey, RelationKind};
use crate::types::VectorIndexSpec;

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// Collapse a group of nodes into one survivor.
///
/// The resolution engine computes the merged properties; the store applies
/// them, redirects every edge of the retired nodes to the survivor, collapses
/// edges that become duplicates, and deletes the retired nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    pub survivor: NodeId,
    pub retired: Vec<NodeId>,
    /// Final description of the survivor.
    pub description: Option<String>,
    /// Final aliases of the survivor.
    pub aliases: Vec<String>,
}

/// A node returned by a vector index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub node: EntityNode,
    pub score: f32,
}

/// Trait representing a transactional property-graph backend.
///
/// Operation groups: node/edge merge, graph listing, resolver primitives,
/// vector index ops, and maintenance ops.
#[allow(async_fn_in_trait)]
pub trait GraphStore: Send + Sync {
    /// Health check: verify connectivity to the database.
    async fn ping(&self) -> Result<()>;

    // ── Upserts ─────────────────────────────────────────────────────────────

    /// Find-or-create the node for `key`.
    ///
    /// On create the node gets `props`, a creation timestamp and the shared
    /// label. On match the description is coalesced (existing non-empty
    /// value wins) and aliases are unioned.
    async fn merge_node(&self, key: &NodeKey, props: &NodeProps) -> Result<NodeId>;

    /// Find-or-create the `kind` edge between two existing nodes.
    ///
    /// Returns [`crate::MythographError::Reference`] naming the first missing
    /// endpoint; nothing is written in that case.
    async fn merge_edge(
        &self,
        source: &NodeKey,
        kind: RelationKind,
        target: &NodeKey,
        description: Option<&str>,
    ) -> Result<EdgeId>;

    // ── Reads ───────────────────────────────────────────────────────────────

    /// All entity nodes, or only those of `kind`, in creation order.
    async fn list_nodes(&self, kind: Option<EntityKind>) -> Result<Vec<EntityNode>>;

    /// The nodes `ids`, in the same order. Any missing id is an error.
    async fn nodes_by_id(&self, ids: &[NodeId]) -> Result<Vec<EntityNode>>;

    /// All relation edges.
    async fn list_edges(&self) -> Result<Vec<RelationEdge>>;

    // ── Resolution primitives ───────────────────────────────────────────────

    /// `true` if the optional resolution extension is installed.
    async fn probe_resolution_capability(&self) -> Result<bool>;

    /// Apply one merge. Requires the resolution extension.
    async fn merge_nodes(&self, plan: &MergePlan) -> Result<()>;

    // ── Vector index ────────────────────────────────────────────────────────

    /// Parameters of the vector index `name`, if it exists.
    async fn vector_index(&self, name: &str) -> Result<Option<VectorIndexSpec>>;

    /// Create a vector index. Callers check for an existing one first.
    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()>;

    /// Write `vectors[i]` to node `ids[i]` under `property`, in one round trip.
    async fn upsert_vectors(
        &self,
        ids: &[NodeId],
        property: &str,
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// The `k` nodes nearest to `vector` in index `name`, best first.
    async fn query_vector_index(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNode>>;

    // ── Maintenance ─────────────────────────────────────────────────────────

    async fn list_constraints(&self) -> Result<Vec<String>>;

    async fn drop_constraint(&self, name: &str) -> Result<()>;

    /// Names of all indexes, vector indexes included.
    async fn list_indexes(&self) -> Result<Vec<String>>;

    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Delete every node and relationship.
    async fn delete_all(&self) -> Result<()>;
}
