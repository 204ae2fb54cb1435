//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use air2neo_airtable::{AirtableClient, AirtableConfig, DEFAULT_API_URL};
use air2neo_core::SyncConfig;
use air2neo_graph::{GraphClient, GraphConfig};
use air2neo_redis::RedisWatermarkStore;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

pub mod status;
pub mod sync;
pub mod tables;

/// Schema-driven incremental sync from Airtable into Neo4j
#[derive(Parser)]
#[command(name = "air2neo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (TOML); defaults apply when absent
    #[arg(short, long, global = true, env = "AIR2NEO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub connections: Connections,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync changed rows into the graph
    Sync(sync::SyncArgs),

    /// Show graph counts and stored watermarks
    Status,

    /// Show the tables described by the metatable
    Tables,
}

/// Endpoints and credentials, read from flags or the environment.
#[derive(Args, Clone)]
pub struct Connections {
    #[arg(long, global = true, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    pub airtable_api_key: Option<String>,

    #[arg(long, global = true, env = "AIRTABLE_BASE_ID")]
    pub airtable_base_id: Option<String>,

    #[arg(long, global = true, env = "AIRTABLE_API_URL", default_value = DEFAULT_API_URL)]
    pub airtable_api_url: String,

    #[arg(long, global = true, env = "NEO4J_URI", default_value = "bolt://localhost:7687")]
    pub neo4j_uri: String,

    #[arg(long, global = true, env = "NEO4J_USERNAME", default_value = "neo4j")]
    pub neo4j_username: String,

    #[arg(long, global = true, env = "NEO4J_PASSWORD", hide_env_values = true)]
    pub neo4j_password: Option<String>,

    #[arg(long, global = true, env = "NEO4J_DATABASE", default_value = "neo4j")]
    pub neo4j_database: String,

    #[arg(long, global = true, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,
}

impl Connections {
    pub fn airtable(&self, config: &SyncConfig) -> Result<AirtableClient> {
        let api_key = self
            .airtable_api_key
            .clone()
            .context("AIRTABLE_API_KEY is not set")?;
        let base_id = self
            .airtable_base_id
            .clone()
            .context("AIRTABLE_BASE_ID is not set")?;

        let mut airtable = AirtableConfig::new(api_key, base_id);
        airtable.api_url = self.airtable_api_url.clone();
        airtable.last_modified_field = config.last_modified_field.clone();
        AirtableClient::new(airtable)
    }

    pub async fn graph(&self) -> Result<GraphClient> {
        let config = GraphConfig {
            uri: self.neo4j_uri.clone(),
            user: self.neo4j_username.clone(),
            password: self.neo4j_password.clone().unwrap_or_default(),
            database: self.neo4j_database.clone(),
            ..GraphConfig::default()
        };
        GraphClient::connect(&config)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", self.neo4j_uri))
    }

    pub async fn watermarks(&self, config: &SyncConfig) -> Result<RedisWatermarkStore> {
        let pool = air2neo_redis::init_pool(&self.redis_url)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", self.redis_url))?;
        Ok(RedisWatermarkStore::new(pool, config.namespace.clone()))
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config");
            SyncConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(SyncConfig::default()),
    }
}

impl Cli {
    /// Run the selected command; `Ok(false)` means it finished but failed.
    pub async fn execute(self) -> Result<bool> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Sync(args) => sync::execute(args, &config, &self.connections).await,
            Commands::Status => status::execute(&config, &self.connections).await.map(|_| true),
            Commands::Tables => tables::execute(&config, &self.connections).await.map(|_| true),
        }
    }
}
