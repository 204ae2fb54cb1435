//! Watermark store port.
//!
//! One watermark per (table, kind). Implementations must make each key's
//! operations atomic on their own and must never let `set` move a key
//! backwards (see [`Watermark::merge_forward`]).

pub mod memory;
pub mod model;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryWatermarkStore;
pub use model::{SyncKind, Watermark, WatermarkKey};

/// Durable storage for sync watermarks.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Read a watermark. `None` means "sync from the beginning of time".
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>>;

    /// Store a watermark, merging forward with whatever is already stored.
    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()>;

    /// Remove both watermarks of a table.
    async fn clear(&self, table: &str) -> Result<()>;

    /// All stored watermarks, ordered by key.
    async fn list(&self) -> Result<Vec<(WatermarkKey, Watermark)>>;
}
