//! Neo4j graph driver implementation.
//!
//! Uses `neo4rs` 0.8 for async, pooled Bolt connections. Merges are plain
//! Cypher `MERGE`; resolution merges redirect relation edges in Cypher, then
//! fold the retired nodes with APOC (`apoc.refactor.mergeNodes`). Vectors go
//! through the native vector index procedures.
//!
//! Labels cannot be query parameters, so kind labels come from the closed
//! [`EntityKind`] set and the shared label is a validated identifier; both
//! are back-quoted when spliced into Cypher.

use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Query, Row};
use tracing::{debug, instrument};

use super::{GraphStore, MergePlan, ScoredNode};
use crate::edges::{EdgeId, RelationEdge};
use crate::errors::{MythographError, Result};
use crate::nodes::{EntityNode, NodeId, NodeProps};
use crate::schema::{union_in_order, EntityKind, NodeKey, RelationKind};
use crate::types::{SimilarityMetric, VectorIndexSpec, DEFAULT_EMBEDDING_PROPERTY};
use crate::utils::{format_neo4j_datetime, parse_flexible_datetime};

/// Columns every node-returning query projects for `n`.
const NODE_COLUMNS: &str = "elementId(n) AS id, labels(n) AS labels, n.name AS name, \
     n.description AS description, coalesce(n.aliases, []) AS aliases, \
     n.created_at AS created_at";

/// [`GraphStore`] backed by a Neo4j server.
pub struct Neo4jStore {
    graph: Graph,
    shared_label: String,
    /// Vector property carried over from retired nodes on merge.
    embedding_property: String,
}

impl Neo4jStore {
    /// Connect to `uri` with basic auth. Entity nodes get `shared_label`.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        shared_label: impl Into<String>,
    ) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self::from_graph(graph, shared_label))
    }

    /// Wrap an existing connection pool.
    pub fn from_graph(graph: Graph, shared_label: impl Into<String>) -> Self {
        Self {
            graph,
            shared_label: shared_label.into(),
            embedding_property: DEFAULT_EMBEDDING_PROPERTY.to_string(),
        }
    }

    /// Node property holding embeddings (default `embedding`).
    pub fn with_embedding_property(mut self, property: impl Into<String>) -> Self {
        self.embedding_property = property.into();
        self
    }

    async fn fetch_all(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_one(&self, q: Query) -> Result<Option<Row>> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }

    async fn node_exists(&self, key: &NodeKey) -> Result<bool> {
        let cypher = format!(
            "MATCH (n:`{}` {{name: $name}}) RETURN count(n) > 0 AS found",
            key.kind.label()
        );
        let row = self
            .fetch_one(query(&cypher).param("name", key.name.as_str()))
            .await?;
        match row {
            Some(row) => Ok(row.get::<bool>("found")?),
            None => Ok(false),
        }
    }
}

fn node_from_row(row: &Row) -> Result<EntityNode> {
    let labels: Vec<String> = row.get("labels")?;
    let kind = labels
        .iter()
        .find_map(|label| EntityKind::from_label(label))
        .ok_or_else(|| {
            MythographError::Store(format!("node without an entity kind label: {labels:?}"))
        })?;
    let created_at = parse_created_at(row.get("created_at")?)?;

    Ok(EntityNode {
        id: NodeId(row.get("id")?),
        kind,
        name: row.get("name")?,
        description: row.get("description")?,
        aliases: row.get("aliases")?,
        created_at,
    })
}

/// Nodes written without a timestamp sort before every timestamped node.
fn parse_created_at(raw: Option<String>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(DateTime::<Utc>::MIN_UTC),
        Some(raw) => parse_flexible_datetime(&raw).ok_or_else(|| {
            MythographError::Store(format!("unreadable created_at timestamp {raw:?}"))
        }),
    }
}

/// Side of a relation edge the retired node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

/// Move every `rel` edge on one side of the retired nodes onto the survivor.
///
/// Edges landing on an existing survivor edge collapse into whichever is
/// older (`created_at`), which keeps its description unless that is null.
/// Relation endpoints are always of different kinds, so the far end of an
/// edge is never itself a retired node.
fn redirect_edges_cypher(rel: RelationKind, side: Side) -> String {
    let (matched, merged) = match side {
        Side::Source => ("(r)-[old:`{rel}`]->(other)", "(s)-[new:`{rel}`]->(other)"),
        Side::Target => ("(other)-[old:`{rel}`]->(r)", "(other)-[new:`{rel}`]->(s)"),
    };
    let rel = rel.rel_type();
    format!(
        "MATCH (s) WHERE elementId(s) = $survivor
         UNWIND range(0, size($retired) - 1) AS i
         MATCH (r) WHERE elementId(r) = $retired[i]
         MATCH {matched}
         WITH s, other, old, i ORDER BY old.created_at, i
         MERGE {merged}
         ON CREATE SET new.description = old.description,
                       new.created_at = old.created_at
         ON MATCH SET new.description = CASE WHEN old.created_at < new.created_at
                          THEN coalesce(old.description, new.description)
                          ELSE coalesce(new.description, old.description) END,
                      new.created_at = CASE WHEN old.created_at < new.created_at
                          THEN old.created_at ELSE new.created_at END
         DELETE old",
        matched = matched.replace("{rel}", rel),
        merged = merged.replace("{rel}", rel),
    )
}

/// Give the survivor the first retired node's vector when it has none.
const CARRY_VECTOR_CYPHER: &str = "MATCH (s) WHERE elementId(s) = $survivor AND s[$property] IS NULL
     UNWIND range(0, size($retired) - 1) AS i
     MATCH (r) WHERE elementId(r) = $retired[i] AND r[$property] IS NOT NULL
     WITH s, r, i ORDER BY i LIMIT 1
     CALL db.create.setNodeVectorProperty(s, $property, r[$property])
     RETURN count(*) AS carried";

/// Fold the (now relation-free) retired nodes into the survivor and set its
/// merged properties. Other relationships follow APOC's `mergeRels`.
const FOLD_NODES_CYPHER: &str = "MATCH (s) WHERE elementId(s) = $survivor
     MATCH (r) WHERE elementId(r) IN $retired
     WITH s, collect(r) AS retired
     CALL apoc.refactor.mergeNodes([s] + retired, {properties: 'discard', mergeRels: true})
     YIELD node
     SET node.description = $description, node.aliases = $aliases
     RETURN elementId(node) AS id";

fn metric_from_str(raw: &str) -> Result<SimilarityMetric> {
    match raw.to_ascii_lowercase().as_str() {
        "cosine" => Ok(SimilarityMetric::Cosine),
        "euclidean" => Ok(SimilarityMetric::Euclidean),
        other => Err(MythographError::Store(format!(
            "unknown vector similarity function {other}"
        ))),
    }
}

fn to_f64(vector: &[f32]) -> Vec<f64> {
    vector.iter().map(|&x| f64::from(x)).collect()
}

impl GraphStore for Neo4jStore {
    async fn ping(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(node = %key))]
    async fn merge_node(&self, key: &NodeKey, props: &NodeProps) -> Result<NodeId> {
        let cypher = format!(
            "MERGE (n:`{kind}` {{name: $name}})
             ON CREATE SET n:`{shared}`,
                           n.description = $description,
                           n.aliases = $aliases,
                           n.created_at = $created_at
             ON MATCH SET n.description = coalesce(n.description, $description),
                          n.aliases = reduce(acc = coalesce(n.aliases, []), a IN $aliases |
                              CASE WHEN a IN acc THEN acc ELSE acc + a END)
             RETURN elementId(n) AS id
             ORDER BY n.created_at
             LIMIT 1",
            kind = key.kind.label(),
            shared = self.shared_label,
        );
        let mut aliases = Vec::new();
        union_in_order(&mut aliases, props.aliases.iter().cloned());

        let q = query(&cypher)
            .param("name", key.name.as_str())
            .param("description", props.description.clone())
            .param("aliases", aliases)
            .param("created_at", format_neo4j_datetime(&Utc::now()));
        let row = self
            .fetch_one(q)
            .await?
            .ok_or_else(|| MythographError::Store(format!("MERGE returned no row for {key}")))?;
        Ok(NodeId(row.get("id")?))
    }

    #[instrument(skip_all, fields(source = %source, rel = %kind, target = %target))]
    async fn merge_edge(
        &self,
        source: &NodeKey,
        kind: RelationKind,
        target: &NodeKey,
        description: Option<&str>,
    ) -> Result<EdgeId> {
        // Plain MATCH yields no row when an endpoint is missing, so nothing
        // is merged in that case.
        let cypher = format!(
            "MATCH (s:`{source_label}` {{name: $source}})
             WITH s ORDER BY s.created_at LIMIT 1
             MATCH (t:`{target_label}` {{name: $target}})
             WITH s, t ORDER BY t.created_at LIMIT 1
             MERGE (s)-[r:`{rel}`]->(t)
             ON CREATE SET r.description = $description, r.created_at = $created_at
             ON MATCH SET r.description = coalesce(r.description, $description)
             RETURN elementId(r) AS id",
            source_label = source.kind.label(),
            target_label = target.kind.label(),
            rel = kind.rel_type(),
        );
        let q = query(&cypher)
            .param("source", source.name.as_str())
            .param("target", target.name.as_str())
            .param("description", description.map(str::to_string))
            .param("created_at", format_neo4j_datetime(&Utc::now()));

        if let Some(row) = self.fetch_one(q).await? {
            return Ok(EdgeId(row.get("id")?));
        }
        if !self.node_exists(source).await? {
            return Err(MythographError::reference(source));
        }
        Err(MythographError::reference(target))
    }

    async fn list_nodes(&self, kind: Option<EntityKind>) -> Result<Vec<EntityNode>> {
        let kind_label = kind.map(|k| format!(":`{}`", k.label())).unwrap_or_default();
        let cypher = format!(
            "MATCH (n:`{shared}`{kind_label})
             RETURN {NODE_COLUMNS}
             ORDER BY n.created_at, id",
            shared = self.shared_label,
        );
        let mut nodes = self
            .fetch_all(query(&cypher))
            .await?
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>>>()?;
        nodes.sort_by(|a, b| a.created_order(b));
        Ok(nodes)
    }

    async fn nodes_by_id(&self, ids: &[NodeId]) -> Result<Vec<EntityNode>> {
        let id_list: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let cypher = format!(
            "UNWIND range(0, size($ids) - 1) AS i
             MATCH (n) WHERE elementId(n) = $ids[i]
             WITH n ORDER BY i
             RETURN {NODE_COLUMNS}"
        );
        let nodes = self
            .fetch_all(query(&cypher).param("ids", id_list))
            .await?
            .iter()
            .map(node_from_row)
            .collect::<Result<Vec<_>>>()?;
        if nodes.len() != ids.len() {
            return Err(MythographError::Store(format!(
                "found {} of {} requested nodes",
                nodes.len(),
                ids.len()
            )));
        }
        Ok(nodes)
    }

    async fn list_edges(&self) -> Result<Vec<RelationEdge>> {
        let cypher = format!(
            "MATCH (s:`{shared}`)-[r]->(t:`{shared}`)
             WHERE type(r) IN $types
             RETURN elementId(r) AS id, elementId(s) AS source, elementId(t) AS target,
                    type(r) AS type, r.description AS description
             ORDER BY id",
            shared = self.shared_label,
        );
        let types: Vec<String> = RelationKind::ALL
            .iter()
            .map(|k| k.rel_type().to_string())
            .collect();

        let rows = self.fetch_all(query(&cypher).param("types", types)).await?;
        rows.iter()
            .map(|row| -> Result<RelationEdge> {
                let rel_type: String = row.get("type")?;
                let kind = RelationKind::from_rel_type(&rel_type).ok_or_else(|| {
                    MythographError::Store(format!("unexpected relationship type {rel_type}"))
                })?;
                Ok(RelationEdge {
                    id: EdgeId(row.get("id")?),
                    source: NodeId(row.get("source")?),
                    target: NodeId(row.get("target")?),
                    kind,
                    description: row.get("description")?,
                })
            })
            .collect()
    }

    async fn probe_resolution_capability(&self) -> Result<bool> {
        match self
            .fetch_one(query("RETURN apoc.version() AS version"))
            .await
        {
            Ok(Some(row)) => {
                let version: String = row.get("version")?;
                debug!(%version, "APOC available");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                debug!(error = %err, "APOC probe failed");
                Ok(false)
            }
        }
    }

    #[instrument(skip_all, fields(survivor = %plan.survivor, retired = plan.retired.len()))]
    async fn merge_nodes(&self, plan: &MergePlan) -> Result<()> {
        let retired: Vec<String> = plan.retired.iter().map(|id| id.0.clone()).collect();
        let mut all = vec![plan.survivor.0.clone()];
        all.extend(retired.iter().cloned());
        let expected = all.len() as i64;
        let found = match self
            .fetch_one(
                query("MATCH (n) WHERE elementId(n) IN $ids RETURN count(n) AS found")
                    .param("ids", all),
            )
            .await?
        {
            Some(row) => row.get::<i64>("found")?,
            None => 0,
        };
        if found != expected {
            return Err(MythographError::Store(format!(
                "merge into {} found {found} of {expected} nodes",
                plan.survivor
            )));
        }

        let with_ids = |cypher: &str| {
            query(cypher)
                .param("survivor", plan.survivor.0.as_str())
                .param("retired", retired.clone())
        };

        let mut txn = self.graph.start_txn().await?;
        txn.run(with_ids(CARRY_VECTOR_CYPHER).param("property", self.embedding_property.as_str()))
            .await?;
        for rel in RelationKind::ALL {
            for side in [Side::Source, Side::Target] {
                txn.run(with_ids(redirect_edges_cypher(rel, side).as_str())).await?;
            }
        }
        txn.run(
            with_ids(FOLD_NODES_CYPHER)
                .param("description", plan.description.clone())
                .param("aliases", plan.aliases.clone()),
        )
        .await?;
        txn.commit().await?;
        debug!("nodes merged");
        Ok(())
    }

    async fn vector_index(&self, name: &str) -> Result<Option<VectorIndexSpec>> {
        let q = query(
            "SHOW VECTOR INDEXES
             YIELD name, labelsOrTypes, properties, options
             WHERE name = $name
             RETURN name, labelsOrTypes[0] AS label, properties[0] AS property,
                    options.indexConfig['vector.dimensions'] AS dimensions,
                    options.indexConfig['vector.similarity_function'] AS metric",
        )
        .param("name", name);

        let Some(row) = self.fetch_one(q).await? else {
            return Ok(None);
        };
        let dimensions: i64 = row.get("dimensions")?;
        let metric: String = row.get("metric")?;
        Ok(Some(VectorIndexSpec {
            name: row.get("name")?,
            label: row.get("label")?,
            property: row.get("property")?,
            dimensions: usize::try_from(dimensions).map_err(|_| {
                MythographError::Store(format!("index {name} reports {dimensions} dimensions"))
            })?,
            metric: metric_from_str(&metric)?,
        }))
    }

    async fn create_vector_index(&self, spec: &VectorIndexSpec) -> Result<()> {
        let cypher = format!(
            "CREATE VECTOR INDEX `{name}` IF NOT EXISTS
             FOR (n:`{label}`) ON (n.`{property}`)
             OPTIONS {{indexConfig: {{
                 `vector.dimensions`: {dimensions},
                 `vector.similarity_function`: '{metric}'
             }}}}",
            name = spec.name,
            label = spec.label,
            property = spec.property,
            dimensions = spec.dimensions,
            metric = spec.metric.as_str(),
        );
        self.graph.run(query(&cypher)).await?;
        Ok(())
    }

    async fn upsert_vectors(
        &self,
        ids: &[NodeId],
        property: &str,
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let id_list: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let vector_list: Vec<Vec<f64>> = vectors.iter().map(|v| to_f64(v)).collect();
        let q = query(
            "UNWIND range(0, size($ids) - 1) AS i
             MATCH (n) WHERE elementId(n) = $ids[i]
             CALL db.create.setNodeVectorProperty(n, $property, $vectors[i])
             RETURN count(n) AS updated",
        )
        .param("ids", id_list)
        .param("property", property)
        .param("vectors", vector_list);

        let updated = match self.fetch_one(q).await? {
            Some(row) => row.get::<i64>("updated")?,
            None => 0,
        };
        if updated != ids.len() as i64 {
            return Err(MythographError::Store(format!(
                "wrote {updated} of {} vectors; some node ids no longer exist",
                ids.len()
            )));
        }
        Ok(())
    }

    async fn query_vector_index(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNode>> {
        let cypher = format!(
            "CALL db.index.vector.queryNodes($name, $k, $vector)
             YIELD node AS n, score
             RETURN {NODE_COLUMNS}, score
             ORDER BY score DESC, n.created_at"
        );
        let q = query(&cypher)
            .param("name", name)
            .param("k", k as i64)
            .param("vector", to_f64(vector));

        self.fetch_all(q)
            .await?
            .iter()
            .map(|row| -> Result<ScoredNode> {
                let score: f64 = row.get("score")?;
                Ok(ScoredNode {
                    node: node_from_row(row)?,
                    score: score as f32,
                })
            })
            .collect()
    }

    async fn list_constraints(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch_all(query("SHOW CONSTRAINTS YIELD name RETURN name"))
            .await?;
        rows.iter()
            .map(|row| -> Result<String> { Ok(row.get("name")?) })
            .collect()
    }

    async fn drop_constraint(&self, name: &str) -> Result<()> {
        let cypher = format!("DROP CONSTRAINT `{name}` IF EXISTS");
        self.graph.run(query(&cypher)).await?;
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch_all(query("SHOW INDEXES YIELD name RETURN name"))
            .await?;
        rows.iter()
            .map(|row| -> Result<String> { Ok(row.get("name")?) })
            .collect()
    }

    async fn drop_index(&self, name: &str) -> Result<()> {
        let cypher = format!("DROP INDEX `{name}` IF EXISTS");
        self.graph.run(query(&cypher)).await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        Ok(())
    }
}
