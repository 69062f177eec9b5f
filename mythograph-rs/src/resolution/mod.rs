//! Entity resolution.
//!
//! Collapses duplicate nodes left behind by ingestion in two phases:
//!
//! 1. **Exact**: nodes sharing `(kind, name)` merge into the earliest-created
//!    one.
//! 2. **Fuzzy**: within each kind (Form, Concept, Myth), nodes whose names
//!    score at or above the threshold are clustered transitively; each
//!    cluster merges into its earliest-created member.
//!
//! Merges need the store's resolution extension. When it is missing both
//! phases are skipped and the outcome says so; that is not an error.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::driver::{GraphStore, MergePlan};
use crate::errors::Result;
use crate::nodes::EntityNode;
use crate::schema::{union_in_order, EntityKind, NodeKey};
use crate::types::DEFAULT_FUZZY_THRESHOLD;
use crate::utils::name_similarity;

/// Name-similarity function used by the fuzzy phase; must return `[0, 1]`.
pub type NameSimilarity = Box<dyn Fn(&str, &str) -> f64 + Send + Sync>;

/// Merge counts of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    /// Groups that collapsed into one survivor.
    pub groups: usize,
    /// Nodes deleted by those merges.
    pub retired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Completed { exact: PhaseStats, fuzzy: PhaseStats },
    /// The resolution extension is not installed; nothing was merged.
    Skipped,
}

impl ResolutionOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ResolutionOutcome::Skipped)
    }

    /// Total nodes retired across both phases.
    pub fn retired(&self) -> usize {
        match self {
            ResolutionOutcome::Completed { exact, fuzzy } => exact.retired + fuzzy.retired,
            ResolutionOutcome::Skipped => 0,
        }
    }
}

pub struct ResolutionEngine<'a, S: GraphStore> {
    store: &'a S,
    threshold: f64,
    similarity: NameSimilarity,
    capability: OnceCell<bool>,
}

impl<'a, S: GraphStore> ResolutionEngine<'a, S> {
    /// Engine with the default threshold and normalized Levenshtein similarity.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            threshold: DEFAULT_FUZZY_THRESHOLD,
            similarity: Box::new(name_similarity),
            capability: OnceCell::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the name-similarity function.
    pub fn with_similarity<F>(mut self, similarity: F) -> Self
    where
        F: Fn(&str, &str) -> f64 + Send + Sync + 'static,
    {
        self.similarity = Box::new(similarity);
        self
    }

    /// Whether the store can merge nodes. Probed once, then cached.
    pub async fn capability_available(&self) -> Result<bool> {
        self.capability
            .get_or_try_init(|| self.store.probe_resolution_capability())
            .await
            .copied()
    }

    /// Run the exact phase, then the fuzzy phase, over the whole graph.
    pub async fn resolve(&self) -> Result<ResolutionOutcome> {
        if !self.capability_available().await? {
            warn!("resolution extension not available; skipping entity resolution");
            return Ok(ResolutionOutcome::Skipped);
        }

        let exact = self.resolve_exact().await?;
        info!(groups = exact.groups, retired = exact.retired, "exact resolution done");

        let fuzzy = self.resolve_fuzzy().await?;
        info!(
            groups = fuzzy.groups,
            retired = fuzzy.retired,
            threshold = self.threshold,
            "fuzzy resolution done"
        );

        Ok(ResolutionOutcome::Completed { exact, fuzzy })
    }

    async fn resolve_exact(&self) -> Result<PhaseStats> {
        let nodes = self.store.list_nodes(None).await?;

        // Groups ordered by their earliest member; members in creation order.
        let mut slots: HashMap<NodeKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<EntityNode>> = Vec::new();
        for node in nodes {
            match slots.get(&node.key()) {
                Some(&slot) => groups[slot].push(node),
                None => {
                    slots.insert(node.key(), groups.len());
                    groups.push(vec![node]);
                }
            }
        }

        self.merge_clusters(groups).await
    }

    async fn resolve_fuzzy(&self) -> Result<PhaseStats> {
        let mut stats = PhaseStats::default();
        for kind in EntityKind::ALL {
            let nodes = self.store.list_nodes(Some(kind)).await?;
            let clusters = self.cluster(nodes);
            let kind_stats = self.merge_clusters(clusters).await?;
            debug!(%kind, groups = kind_stats.groups, "fuzzy clusters merged");
            stats.groups += kind_stats.groups;
            stats.retired += kind_stats.retired;
        }
        Ok(stats)
    }

    /// Partition `nodes` (in creation order) into similarity clusters.
    fn cluster(&self, nodes: Vec<EntityNode>) -> Vec<Vec<EntityNode>> {
        let mut sets = DisjointSets::new(nodes.len());
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if (self.similarity)(&nodes[i].name, &nodes[j].name) >= self.threshold {
                    sets.union(i, j);
                }
            }
        }

        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<Vec<EntityNode>> = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let root = sets.find(i);
            match slots.get(&root) {
                Some(&slot) => clusters[slot].push(node),
                None => {
                    slots.insert(root, clusters.len());
                    clusters.push(vec![node]);
                }
            }
        }
        clusters
    }

    async fn merge_clusters(&self, clusters: Vec<Vec<EntityNode>>) -> Result<PhaseStats> {
        let mut stats = PhaseStats::default();
        for cluster in clusters.into_iter().filter(|c| c.len() > 1) {
            let Some(plan) = plan_merge(&cluster) else {
                continue;
            };
            debug!(
                survivor = %plan.survivor,
                name = %cluster[0].name,
                retired = plan.retired.len(),
                "merging nodes"
            );
            self.store.merge_nodes(&plan).await?;
            stats.groups += 1;
            stats.retired += plan.retired.len();
        }
        Ok(stats)
    }
}

/// Merge plan for a cluster given in creation order; the first node survives.
///
/// Aliases: the survivor's, then each retired node's name and aliases, with
/// duplicates and the survivor's own name dropped. Description: the
/// survivor's, else the first retired one present. `None` for an empty cluster.
pub fn plan_merge(cluster: &[EntityNode]) -> Option<MergePlan> {
    let (survivor, retired) = cluster.split_first()?;

    let mut aliases = survivor.aliases.clone();
    for node in retired {
        union_in_order(&mut aliases, std::iter::once(node.name.clone()));
        union_in_order(&mut aliases, node.aliases.iter().cloned());
    }
    aliases.retain(|alias| alias != &survivor.name);

    let description = survivor
        .description
        .clone()
        .or_else(|| retired.iter().find_map(|n| n.description.clone()));

    Some(MergePlan {
        survivor: survivor.id.clone(),
        retired: retired.iter().map(|n| n.id.clone()).collect(),
        description,
        aliases,
    })
}

/// Union-find over `0..n`; the smaller index becomes the root.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
