//! Similarity search over the shared vector index.

use tracing::debug;

use crate::driver::{GraphStore, ScoredNode};
use crate::embedder::EmbedderClient;
use crate::errors::Result;

/// The `k` entity nodes whose embeddings are closest to `text`, best first.
///
/// `k == 0` returns an empty list without calling the embedder.
pub async fn search_similar<S, E>(
    store: &S,
    embedder: &E,
    index_name: &str,
    text: &str,
    k: usize,
) -> Result<Vec<ScoredNode>>
where
    S: GraphStore,
    E: EmbedderClient,
{
    if k == 0 {
        return Ok(Vec::new());
    }

    let vector = embedder.embed(text).await?;
    let mut hits = store.query_vector_index(index_name, &vector, k).await?;
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(k);
    debug!(index = %index_name, k, hits = hits.len(), "similarity search");
    Ok(hits)
}
