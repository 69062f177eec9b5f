//! Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mythograph")]
#[command(version, about = "Build and query a Form / Concept / Myth knowledge graph", long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Read environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest extraction output files into the graph
    Build {
        /// JSON files, each an extraction object or an array of them
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Wipe constraints, indexes and data first
        #[arg(long)]
        reset: bool,

        /// Skip the entity resolution pass
        #[arg(long)]
        no_resolve: bool,
    },

    /// Drop every constraint, index, node and relationship
    Reset,

    /// Find the entities closest to a piece of text
    Search {
        /// Text to embed and look up
        text: String,

        /// Number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
}
