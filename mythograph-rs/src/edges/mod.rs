//! Edge types for the knowledge graph.
//!
//! Two relationship types exist, both carried by [`RelationEdge`]:
//! - `CONNOTES`: Form → Concept
//! - `GENERATES_MYTH`: Concept → Myth (one edge per contributing concept)

pub mod entity;

pub use entity::{EdgeId, RelationEdge};
