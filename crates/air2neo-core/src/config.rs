//! Engine configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration. Credentials never live here; the CLI reads them from
//! the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::mapping::RelationshipNaming;

/// Top-level sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the source table holding one row per synchronized table.
    pub metatable: String,
    /// Default node property storing the source row identifier.
    pub id_property: String,
    /// Source column carrying each row's last-modified time.
    pub last_modified_field: String,
    /// How link column names become relationship types.
    pub relationship_naming: RelationshipNaming,
    /// Rows per committed batch.
    pub batch_size: usize,
    /// Tables synchronized at the same time.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub metatable_fields: MetatableFields,
    /// Prefix separating the watermarks of independent deployments.
    pub namespace: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            metatable: "Tables".to_string(),
            id_property: "_aid".to_string(),
            last_modified_field: "Last Modified".to_string(),
            relationship_naming: RelationshipNaming::default(),
            batch_size: 100,
            concurrency: 4,
            retry: RetryPolicy::default(),
            metatable_fields: MetatableFields::default(),
            namespace: "default".to_string(),
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SyncError::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.metatable.trim().is_empty() {
            return Err(SyncError::config("metatable must not be empty"));
        }
        if self.id_property.trim().is_empty() {
            return Err(SyncError::config("id_property must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(SyncError::config("batch_size must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(SyncError::config("concurrency must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::config("retry.max_attempts must be at least 1"));
        }
        if self.namespace.trim().is_empty() {
            return Err(SyncError::config("namespace must not be empty"));
        }
        Ok(())
    }
}

/// Backoff policy for source fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Column names of the metatable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetatableFields {
    pub name: String,
    pub source: String,
    pub label: String,
    pub id_property: String,
    pub constraint_fields: String,
    pub node_properties: String,
    pub edges: String,
    pub last_ingested_properties: String,
    pub last_ingested_edges: String,
}

impl Default for MetatableFields {
    fn default() -> Self {
        Self {
            name: "Name".to_string(),
            source: "Source".to_string(),
            label: "Label".to_string(),
            id_property: "ID Property".to_string(),
            constraint_fields: "Constraint Fields".to_string(),
            node_properties: "Node Properties".to_string(),
            edges: "Edges".to_string(),
            last_ingested_properties: "Last Ingested Properties".to_string(),
            last_ingested_edges: "Last Ingested Edges".to_string(),
        }
    }
}
