//! RelationEdge: a typed relationship between two entity nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::nodes::NodeId;
use crate::schema::RelationKind;

/// Opaque edge identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EdgeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stored relationship.
///
/// Identity is `(source, kind, target)`: the store never holds two edges
/// with the same triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: RelationKind,
    /// Relation-level description; shared by every fan-out edge of one
    /// `Generates_Myth` relation.
    pub description: Option<String>,
}

impl RelationEdge {
    /// The identity triple of this edge.
    pub fn triple(&self) -> (&NodeId, RelationKind, &NodeId) {
        (&self.source, self.kind, &self.target)
    }
}
