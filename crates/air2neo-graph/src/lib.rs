//! # air2neo Graph
//!
//! Neo4j side of air2neo: connection client, per-label constraints, batched
//! `UNWIND ... MERGE` writes, and the sync engine that drives a run.

pub mod bolt;
pub mod client;
pub mod schema;
pub mod sync;
pub mod writer;

pub use client::{GraphClient, GraphConfig};
pub use sync::{PassReport, PassState, RunReport, SyncEngine, SyncOptions, TableReport};
