//! Ingestion records and their schema.
//!
//! Raw records ([`RawEntity`], [`RawRelation`]) are what the extraction step
//! emits. [`validator::validate_batch`] turns them into the typed
//! [`Entity`] / [`Relation`] values consumed by the upsert engine.

pub mod label;
pub mod validator;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{MythographError, Result};
use crate::utils::extract_json_from_response;

pub use label::sanitize_label;
pub use validator::{validate_batch, ValidatedBatch};

/// The closed set of entity kinds. Each kind is also a graph label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Form,
    Concept,
    Myth,
}

impl EntityKind {
    /// Every kind, in the order the fuzzy resolution phase visits them.
    pub const ALL: [EntityKind; 3] = [EntityKind::Form, EntityKind::Concept, EntityKind::Myth];

    /// Graph label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Form => "Form",
            EntityKind::Concept => "Concept",
            EntityKind::Myth => "Myth",
        }
    }

    /// Parse a label produced by [`sanitize_label`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The closed set of relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Connotes,
    GeneratesMyth,
}

impl RelationKind {
    pub const ALL: [RelationKind; 2] = [RelationKind::Connotes, RelationKind::GeneratesMyth];

    /// Relationship type written to the store.
    pub fn rel_type(&self) -> &'static str {
        match self {
            RelationKind::Connotes => "CONNOTES",
            RelationKind::GeneratesMyth => "GENERATES_MYTH",
        }
    }

    /// Parse a relationship type as stored.
    pub fn from_rel_type(rel_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.rel_type() == rel_type)
    }

    /// `(source kind, target kind)` this relation connects.
    pub fn endpoints(&self) -> (EntityKind, EntityKind) {
        match self {
            RelationKind::Connotes => (EntityKind::Form, EntityKind::Concept),
            RelationKind::GeneratesMyth => (EntityKind::Concept, EntityKind::Myth),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rel_type())
    }
}

/// Identity of a logical entity: `(kind, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: EntityKind,
    pub name: String,
}

impl NodeKey {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

// ── Raw records (extraction output) ─────────────────────────────────────────

/// An entity as emitted by the extraction step, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A relation as emitted by the extraction step, before validation.
///
/// `Connotes` uses `source`; `Generates_Myth` uses `source_concepts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRelation {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_concepts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One extraction result: `{ "entities": [...], "relations": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionBatch {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default)]
    pub relations: Vec<RawRelation>,
}

impl IngestionBatch {
    /// Parse a batch from JSON text.
    ///
    /// Accepts a bare object, a JSON array of objects (concatenated in order),
    /// or either of those wrapped in a markdown code fence as LLMs tend to emit.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let json = extract_json_from_response(s).ok_or_else(|| {
            MythographError::Validation("no JSON object found in ingestion input".to_string())
        })?;

        match serde_json::from_str::<serde_json::Value>(json)? {
            serde_json::Value::Array(items) => {
                let mut batch = IngestionBatch::default();
                for item in items {
                    batch.extend(serde_json::from_value(item)?);
                }
                Ok(batch)
            }
            value @ serde_json::Value::Object(_) => Ok(serde_json::from_value(value)?),
            _ => Err(MythographError::Validation(
                "ingestion input must be a JSON object or array".to_string(),
            )),
        }
    }

    /// Read and parse a batch file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Append another batch's records.
    pub fn extend(&mut self, other: IngestionBatch) {
        self.entities.extend(other.entities);
        self.relations.extend(other.relations);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

// ── Validated records ───────────────────────────────────────────────────────

/// A validated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    /// Ordered, duplicate-free.
    pub aliases: Vec<String>,
}

impl Entity {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.kind, self.name.clone())
    }

    /// Text handed to the embedding provider for this entity.
    ///
    /// `Name: … | Description: … | Aliases: a, b`, absent parts omitted.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.name, self.description.as_deref(), &self.aliases)
    }

    /// Fold a later record with the same key into this one: first non-empty
    /// description wins, aliases are unioned in order.
    pub fn absorb(&mut self, other: &Entity) {
        if self.description.is_none() {
            self.description = other.description.clone();
        }
        union_in_order(&mut self.aliases, other.aliases.iter().cloned());
    }
}

/// A validated relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    Connotes {
        form: String,
        concept: String,
        description: Option<String>,
    },
    GeneratesMyth {
        /// Sorted, so fan-out order is deterministic.
        concepts: BTreeSet<String>,
        myth: String,
        description: Option<String>,
    },
}

impl Relation {
    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::Connotes { .. } => RelationKind::Connotes,
            Relation::GeneratesMyth { .. } => RelationKind::GeneratesMyth,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Relation::Connotes { description, .. } | Relation::GeneratesMyth { description, .. } => {
                description.as_deref()
            }
        }
    }

    /// The `(source, target)` key pairs this relation expands to, in fan-out order.
    pub fn edge_keys(&self) -> Vec<(NodeKey, NodeKey)> {
        match self {
            Relation::Connotes { form, concept, .. } => vec![(
                NodeKey::new(EntityKind::Form, form.clone()),
                NodeKey::new(EntityKind::Concept, concept.clone()),
            )],
            Relation::GeneratesMyth { concepts, myth, .. } => concepts
                .iter()
                .map(|concept| {
                    (
                        NodeKey::new(EntityKind::Concept, concept.clone()),
                        NodeKey::new(EntityKind::Myth, myth.clone()),
                    )
                })
                .collect(),
        }
    }
}

/// Append each item of `extra` not already present, preserving order.
/// `Name: … | Description: … | Aliases: a, b`, absent parts omitted.
pub(crate) fn embedding_text(name: &str, description: Option<&str>, aliases: &[String]) -> String {
    let mut text = format!("Name: {name}");
    if let Some(description) = description {
        text.push_str(" | Description: ");
        text.push_str(description);
    }
    if !aliases.is_empty() {
        text.push_str(" | Aliases: ");
        text.push_str(&aliases.join(", "));
    }
    text
}

pub(crate) fn union_in_order(target: &mut Vec<String>, extra: impl IntoIterator<Item = String>) {
    for item in extra {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}
