//! air2neo Core Library
//!
//! Domain model and engine pieces for syncing metatable-described source
//! tables into a property graph: schema resolution, change extraction,
//! node/edge mapping and the ports (source, graph sink, watermark store)
//! the orchestrator drives.

pub mod config;
pub mod error;
pub mod extract;
pub mod mapping;
pub mod schema;
pub mod sink;
pub mod source;
pub mod watermark;

pub use config::{MetatableFields, RetryPolicy, SyncConfig};
pub use error::{RowMappingError, SyncError, SyncResult};
pub use extract::{ChangeExtractor, ChangeSet};
pub use mapping::{EdgeRecord, NodeIdentity, NodeRecord, RelationshipNaming};
pub use schema::model::{EdgeField, TableDescriptor};
pub use schema::SchemaResolver;
pub use sink::{GraphCounts, GraphSink, MemoryGraph};
pub use source::{LinkResolver, LinkTarget, SourceClient, SourceRow};
pub use watermark::{MemoryWatermarkStore, SyncKind, Watermark, WatermarkKey, WatermarkStore};
