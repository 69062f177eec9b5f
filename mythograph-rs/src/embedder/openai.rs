//! OpenAI embedding client.
//!
//! Wraps [`async_openai`] to provide [`EmbedderClient`] for the OpenAI
//! Embeddings API, with chunked batch support and exponential-backoff retry
//! of transient network failures.

use async_openai::{
    config::OpenAIConfig, error::OpenAIError, types::CreateEmbeddingRequestArgs, Client,
};
use backoff::{future::retry, ExponentialBackoffBuilder};
use std::time::Duration;
use tracing::debug;

use crate::embedder::{EmbedderClient, Embedding};
use crate::errors::{MythographError, Result};
use crate::types::{MythographConfig, DEFAULT_EMBEDDING_MODEL};

/// Maximum number of inputs per OpenAI embeddings API call.
const BATCH_CHUNK_SIZE: usize = 2048;

/// Native output dimension of a model.
///
/// Unrecognised models are assumed to be 1536-dimensional.
fn model_dim(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// `text-embedding-3-*` models can shorten their output on request.
fn supports_shortening(model: &str) -> bool {
    model.starts_with("text-embedding-3-")
}

/// Classify an [`OpenAIError`] as transient (should retry) or permanent.
fn classify_error(err: OpenAIError) -> backoff::Error<MythographError> {
    let msg = err.to_string();
    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            backoff::Error::transient(MythographError::Embedder(msg))
        }
        _ => backoff::Error::permanent(MythographError::Embedder(msg)),
    }
}

/// OpenAI embedding client that implements [`EmbedderClient`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dim: usize,
    /// Sent as `dimensions` when the requested size differs from the model's.
    requested_dim: Option<u32>,
}

impl OpenAiEmbedder {
    /// Create an embedder producing the model's native dimensionality.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        Self::with_client(Client::with_config(config), model.into())
    }

    /// Create the embedder described by `config`.
    ///
    /// A configured dimensionality below the model's native one is requested
    /// from the API; anything else leaves the model's own size, which the
    /// pipeline's provider check then compares against the index.
    pub fn from_config(config: &MythographConfig) -> Self {
        let model = if config.embedding_model.is_empty() {
            DEFAULT_EMBEDDING_MODEL
        } else {
            config.embedding_model.as_str()
        };
        let embedder = Self::new(config.openai_api_key.clone(), model);
        embedder.with_dimensions(config.embedding_dim)
    }

    /// Ask the API for `dim`-dimension vectors, if the model can shorten to it.
    pub fn with_dimensions(mut self, dim: usize) -> Self {
        let native = model_dim(&self.model);
        if dim < native && dim > 0 && supports_shortening(&self.model) {
            if let Ok(requested) = u32::try_from(dim) {
                self.dim = dim;
                self.requested_dim = Some(requested);
            }
        }
        self
    }

    fn with_client(client: Client<OpenAIConfig>, model: String) -> Self {
        let dim = model_dim(&model);
        Self {
            client,
            model,
            dim,
            requested_dim: None,
        }
    }

    /// Create a new embedder pointing at a custom API base URL.
    ///
    /// Used in unit tests where a [`wiremock`] server acts as the API endpoint.
    #[cfg(test)]
    fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.into())
            .with_api_base(base_url.into());
        Self::with_client(Client::with_config(config), model.into())
    }

    /// Issue a single embeddings API call for up to [`BATCH_CHUNK_SIZE`] texts.
    ///
    /// Retries on transient network failures with exponential back-off
    /// (initial 500 ms, cap 10 s, total budget 60 s).
    async fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let input: Vec<String> = texts.iter().map(|s| (*s).to_owned()).collect();
        let expected = input.len();
        let model = self.model.clone();
        let requested_dim = self.requested_dim;
        let client = self.client.clone();

        let embeddings = retry(backoff_policy, move || {
            let input = input.clone();
            let model = model.clone();
            let client = client.clone();
            async move {
                let mut args = CreateEmbeddingRequestArgs::default();
                args.model(model.as_str()).input(input);
                if let Some(dimensions) = requested_dim {
                    args.dimensions(dimensions);
                }
                let request = args.build().map_err(|e| {
                    backoff::Error::permanent(MythographError::Embedder(e.to_string()))
                })?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(classify_error)?;

                // The API may return items out of order; `index` is authoritative.
                let mut data = response.data;
                data.sort_by_key(|item| item.index);
                Ok::<_, backoff::Error<MythographError>>(data
                    .into_iter()
                    .map(|item| item.embedding)
                    .collect::<Vec<Embedding>>())
            }
        })
        .await?;

        if embeddings.len() != expected {
            return Err(MythographError::Embedder(format!(
                "requested {expected} embeddings, received {}",
                embeddings.len()
            )));
        }
        debug!(count = expected, model = %self.model, "embedded chunk");
        Ok(embeddings)
    }
}

impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_chunk(&[text]).await?;
        embeddings.pop().ok_or_else(|| {
            MythographError::Embedder("empty response from embedding API".to_string())
        })
    }

    /// Embed multiple texts, automatically splitting into chunks of at most
    /// [`BATCH_CHUNK_SIZE`] items to respect OpenAI's per-call limits.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_CHUNK_SIZE) {
            result.extend(self.embed_chunk(chunk).await?);
        }
        Ok(result)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
