mod cli;
mod config;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use mythograph_rs::driver::{GraphStore, Neo4jStore};
use mythograph_rs::embedder::OpenAiEmbedder;
use mythograph_rs::{maintenance, GraphBuilder};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ───────────────────────────────────────────────────────────────
    // Logs go to stderr; stdout carries the command's result.
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("mythograph=info".parse()?)
        .add_directive("mythograph_rs=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // ── Config ────────────────────────────────────────────────────────────────
    let needs_embedder = !matches!(cli.command, Commands::Reset);
    let mut config = config::load(cli.env_file.as_deref(), needs_embedder).map_err(|e| {
        error!("Configuration error: {:#}", e);
        e
    })?;

    info!(
        uri = %config.neo4j_uri,
        index = %config.vector_index_name,
        model = %config.embedding_model,
        dimensions = config.embedding_dim,
        "configuration loaded"
    );

    // ── Store ─────────────────────────────────────────────────────────────────
    let store = Neo4jStore::connect(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
        config.shared_label.clone(),
    )
    .await
    .with_context(|| format!("Cannot connect to Neo4j at {}", config.neo4j_uri))?
    .with_embedding_property(config.embedding_property.clone());
    store.ping().await.context("Neo4j health check failed")?;

    let command = match cli.command {
        Commands::Reset => {
            let report = maintenance::reset(&store).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        command => command,
    };

    if let Commands::Build { no_resolve: true, .. } = command {
        config.resolve_duplicates = false;
    }
    let embedder = OpenAiEmbedder::from_config(&config);
    let builder = GraphBuilder::new(store, embedder, config);

    match command {
        Commands::Build { files, reset, .. } => {
            let batch = config::read_batches(&files)?;
            info!(
                files = files.len(),
                entities = batch.entities.len(),
                relations = batch.relations.len(),
                "batches loaded"
            );
            let report = if reset {
                builder.rebuild(&batch).await?
            } else {
                builder.build(&batch).await?
            };
            if report.degraded_resolution {
                info!("graph built without entity resolution");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Search { text, limit } => {
            for hit in builder.search(&text, limit).await? {
                println!("{:.4}\t{}\t{}", hit.score, hit.node.kind, hit.node.name);
            }
        }
        Commands::Reset => {}
    }

    Ok(())
}
