//! In-process watermark store, used for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use super::{Watermark, WatermarkKey, WatermarkStore};

/// Watermarks kept in a map; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    entries: Mutex<BTreeMap<WatermarkKey, Watermark>>,
    fail_writes: AtomicBool,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<WatermarkKey, Watermark>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("watermark store lock poisoned"))
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("watermark write rejected for {}", key);
        }
        let mut entries = self.lock()?;
        let next = match entries.get(key) {
            Some(current) => current.merge_forward(watermark),
            None => watermark.clone(),
        };
        entries.insert(key.clone(), next);
        Ok(())
    }

    async fn clear(&self, table: &str) -> Result<()> {
        self.lock()?.retain(|key, _| key.table != table);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(WatermarkKey, Watermark)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
