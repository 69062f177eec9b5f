//! Schema validation of raw extraction records.
//!
//! A failure here means the extraction contract was violated upstream; the
//! whole batch is rejected before anything is written.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use super::{
    sanitize_label, union_in_order, Entity, EntityKind, IngestionBatch, NodeKey, RawEntity,
    RawRelation, Relation, RelationKind,
};
use crate::errors::{MythographError, Result};
use crate::utils::{non_blank, normalize_whitespace};

const ENTITY_SHAPE: &str =
    r#"{"type": "Form"|"Concept"|"Myth", "name": non-empty string, "aliases"?: [string], "description"?: string}"#;
const CONNOTES_SHAPE: &str =
    r#"{"type": "Connotes", "source": Form name, "target": Concept name, "description"?: string}"#;
const GENERATES_MYTH_SHAPE: &str = r#"{"type": "Generates_Myth", "source_concepts": [Concept name, ...] (at least 2 distinct), "target": Myth name, "description"?: string}"#;

/// Minimum number of distinct concepts a `Generates_Myth` relation combines.
pub const MIN_MYTH_SOURCES: usize = 2;

/// A batch whose records all passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedBatch {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl ValidatedBatch {
    /// Entities folded by key, in first-seen order.
    ///
    /// Repeated records of one key collapse the same way repeated upserts do.
    pub fn distinct_entities(&self) -> Vec<Entity> {
        let mut order: Vec<Entity> = Vec::new();
        for entity in &self.entities {
            match order
                .iter_mut()
                .find(|e| e.kind == entity.kind && e.name == entity.name)
            {
                Some(existing) => existing.absorb(entity),
                None => order.push(entity.clone()),
            }
        }
        order
    }
}

/// Validate every record of a batch, then check that every relation endpoint
/// names an entity of the right kind within the same batch.
///
/// # Errors
/// - [`MythographError::Schema`] for the first malformed record.
/// - [`MythographError::Reference`] for the first dangling endpoint.
pub fn validate_batch(batch: &IngestionBatch) -> Result<ValidatedBatch> {
    let entities = batch
        .entities
        .iter()
        .enumerate()
        .map(|(i, raw)| validate_entity(i, raw))
        .collect::<Result<Vec<_>>>()?;

    let relations = batch
        .relations
        .iter()
        .enumerate()
        .map(|(i, raw)| validate_relation(i, raw))
        .collect::<Result<Vec<_>>>()?;

    let known: HashSet<NodeKey> = entities.iter().map(Entity::key).collect();
    for relation in &relations {
        for (source, target) in relation.edge_keys() {
            for key in [source, target] {
                if !known.contains(&key) {
                    return Err(MythographError::reference(key));
                }
            }
        }
    }

    debug!(
        entities = entities.len(),
        relations = relations.len(),
        "batch validated"
    );
    Ok(ValidatedBatch {
        entities,
        relations,
    })
}

/// Validate one raw entity.
pub fn validate_entity(index: usize, raw: &RawEntity) -> Result<Entity> {
    let record = || describe("entities", index, raw);

    let kind = parse_entity_kind(&raw.kind).ok_or_else(|| {
        MythographError::schema(
            record(),
            format!("entity type Form|Concept|Myth (got {:?}); shape {ENTITY_SHAPE}", raw.kind),
        )
    })?;

    let name = normalize_whitespace(&raw.name);
    if name.is_empty() {
        return Err(MythographError::schema(
            record(),
            format!("a non-empty name; shape {ENTITY_SHAPE}"),
        ));
    }

    let mut aliases = Vec::with_capacity(raw.aliases.len());
    union_in_order(
        &mut aliases,
        raw.aliases
            .iter()
            .filter_map(|a| non_blank(Some(a.as_str())))
            .filter(|a| *a != name),
    );

    Ok(Entity {
        kind,
        name,
        description: non_blank(raw.description.as_deref()),
        aliases,
    })
}

/// Validate one raw relation.
pub fn validate_relation(index: usize, raw: &RawRelation) -> Result<Relation> {
    let record = || describe("relations", index, raw);

    let kind = parse_relation_kind(&raw.kind).ok_or_else(|| {
        MythographError::schema(
            record(),
            format!(
                "relation type Connotes|Generates_Myth (got {:?}); shape {CONNOTES_SHAPE} or {GENERATES_MYTH_SHAPE}",
                raw.kind
            ),
        )
    })?;

    let description = non_blank(raw.description.as_deref());
    let target = non_blank(raw.target.as_deref());

    match kind {
        RelationKind::Connotes => {
            let source = non_blank(raw.source.as_deref());
            match (source, target) {
                (Some(form), Some(concept)) if raw.source_concepts.is_none() => {
                    Ok(Relation::Connotes {
                        form,
                        concept,
                        description,
                    })
                }
                _ => Err(MythographError::schema(record(), CONNOTES_SHAPE)),
            }
        }
        RelationKind::GeneratesMyth => {
            let concepts: BTreeSet<String> = raw
                .source_concepts
                .iter()
                .flatten()
                .filter_map(|c| non_blank(Some(c.as_str())))
                .collect();
            match target {
                Some(myth) if concepts.len() >= MIN_MYTH_SOURCES && raw.source.is_none() => {
                    Ok(Relation::GeneratesMyth {
                        concepts,
                        myth,
                        description,
                    })
                }
                _ => Err(MythographError::schema(record(), GENERATES_MYTH_SHAPE)),
            }
        }
    }
}

/// Entity types are sanitized the same way graph labels are, then must be
/// one of the closed set.
fn parse_entity_kind(raw: &str) -> Option<EntityKind> {
    EntityKind::from_label(&sanitize_label(raw))
}

/// Relation types are compared upper-case with spaces/hyphens as underscores.
fn parse_relation_kind(raw: &str) -> Option<RelationKind> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    RelationKind::from_rel_type(&normalized)
}

fn describe(section: &str, index: usize, record: &impl Serialize) -> String {
    let json = serde_json::to_string(record).unwrap_or_else(|_| "<unprintable>".to_string());
    format!("{section}[{index}] {json}")
}
