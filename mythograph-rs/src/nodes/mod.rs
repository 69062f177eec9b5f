//! Node types for the knowledge graph.
//!
//! Every node is an [`EntityNode`] of one [`crate::schema::EntityKind`]; the
//! store also tags it with the shared vector-index label.

pub mod entity;

pub use entity::{EntityNode, NodeId, NodeProps};
