//! EntityNode: a Form, Concept or Myth as held by the graph store.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{embedding_text, EntityKind, NodeKey};

/// Opaque node identifier assigned by the store (`elementId` in Neo4j).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Mutable properties supplied with a node merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProps {
    /// Kept only if the node has no description yet.
    pub description: Option<String>,
    /// Unioned into the node's aliases.
    pub aliases: Vec<String>,
}

/// A stored entity node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: NodeId,
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    /// Set once when the node is created.
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind, self.name.clone())
    }

    /// Embedding input built from the stored properties.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.name, self.description.as_deref(), &self.aliases)
    }

    /// Creation order: earliest first, ties broken by id.
    pub fn created_order(&self, other: &EntityNode) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}
