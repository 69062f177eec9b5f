use std::path::{Path, PathBuf};

use anyhow::Context;

use mythograph_rs::schema::IngestionBatch;
use mythograph_rs::types::MythographConfig;

/// Load the pipeline configuration from the environment.
///
/// With `env_file` set, that file is loaded first; variables already present
/// in the process environment still win. Without `needs_embedder` the OpenAI
/// key may be absent.
pub fn load(env_file: Option<&Path>, needs_embedder: bool) -> anyhow::Result<MythographConfig> {
    if let Some(path) = env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Cannot read env file '{}'", path.display()))?;
    }
    let config = if needs_embedder {
        MythographConfig::from_env()
    } else {
        MythographConfig::store_from_env()
    };
    config.context("Invalid configuration")
}

/// Read every batch file, concatenating them in argument order.
pub fn read_batches(paths: &[PathBuf]) -> anyhow::Result<IngestionBatch> {
    let mut batch = IngestionBatch::default();
    for path in paths {
        let part = IngestionBatch::from_path(path)
            .with_context(|| format!("Cannot load batch file '{}'", path.display()))?;
        batch.extend(part);
    }
    Ok(batch)
}
