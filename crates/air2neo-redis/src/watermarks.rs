//! Watermark store on Redis.
//!
//! Layout, for namespace `ns`:
//!
//! - `air2neo:{ns}:watermark:{kind}:{table}` hash with `at` (RFC 3339) and
//!   `at_us` (microseconds since the epoch, used for comparisons)
//! - `air2neo:{ns}:watermark:{kind}:{table}:boundary` set of row ids
//!   committed at exactly `at`
//! - `air2neo:{ns}:watermarks:all` set of `{kind}:{table}` members

use std::collections::BTreeSet;

use air2neo_core::{SyncKind, Watermark, WatermarkKey, WatermarkStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use crate::client::{RedisError, RedisPool, RedisResult};

/// Merge-forward update, atomic on the server.
///
/// KEYS: hash, boundary set, index set.
/// ARGV: at_us, at, index member, boundary ids...
///
/// Boundary ids are added in slices of 500; Lua's `unpack` cannot spread
/// more than a few thousand values onto its stack.
const MERGE_FORWARD_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'at_us')
local incoming = tonumber(ARGV[1])
if current and tonumber(current) > incoming then
  return 0
end
if (not current) or tonumber(current) < incoming then
  redis.call('DEL', KEYS[2])
end
redis.call('HSET', KEYS[1], 'at_us', ARGV[1], 'at', ARGV[2])
for i = 4, #ARGV, 500 do
  redis.call('SADD', KEYS[2], unpack(ARGV, i, math.min(i + 499, #ARGV)))
end
redis.call('SADD', KEYS[3], ARGV[3])
return 1
"#;

/// Watermarks persisted in Redis.
#[derive(Clone)]
pub struct RedisWatermarkStore {
    pool: RedisPool,
    namespace: String,
}

impl RedisWatermarkStore {
    pub fn new(pool: RedisPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    fn hash_key(&self, key: &WatermarkKey) -> String {
        hash_key(&self.namespace, key)
    }

    fn boundary_key(&self, key: &WatermarkKey) -> String {
        format!("{}:boundary", self.hash_key(key))
    }

    fn index_key(&self) -> String {
        format!("air2neo:{}:watermarks:all", self.namespace)
    }

    async fn read(&self, key: &WatermarkKey) -> RedisResult<Option<Watermark>> {
        let mut conn = self.pool.clone();
        let hash_key = self.hash_key(key);
        let (at, boundary): (Option<String>, Vec<String>) = redis::pipe()
            .atomic()
            .hget(&hash_key, "at")
            .smembers(self.boundary_key(key))
            .query_async(&mut conn)
            .await?;

        let Some(at) = at else {
            return Ok(None);
        };
        let at = parse_timestamp(&at).map_err(|reason| RedisError::Corrupt {
            key: hash_key,
            reason,
        })?;

        Ok(Some(Watermark {
            at,
            boundary_ids: boundary.into_iter().collect::<BTreeSet<_>>(),
        }))
    }
}

fn hash_key(namespace: &str, key: &WatermarkKey) -> String {
    format!("air2neo:{}:watermark:{}", namespace, index_member(key))
}

fn index_member(key: &WatermarkKey) -> String {
    format!("{}:{}", key.kind, key.table)
}

/// Inverse of [`index_member`]. Table names may themselves contain `:`.
fn parse_index_member(member: &str) -> Option<WatermarkKey> {
    let (kind, table) = member.split_once(':')?;
    Some(WatermarkKey::new(table, SyncKind::parse(kind)?))
}

/// Boundary ids of `watermark` not already stored under the same timestamp.
///
/// When the timestamps differ every id is sent: a newer watermark replaces
/// the stored set, an older one is ignored by the script anyway.
fn pending_boundary_ids<'w>(stored: Option<&'w Watermark>, watermark: &'w Watermark) -> Vec<&'w String> {
    match stored {
        Some(stored) if stored.at == watermark.at => watermark
            .boundary_ids
            .difference(&stored.boundary_ids)
            .collect(),
        Some(stored) if stored.at > watermark.at => Vec::new(),
        _ => watermark.boundary_ids.iter().collect(),
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

#[async_trait]
impl WatermarkStore for RedisWatermarkStore {
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        Ok(self.read(key).await?)
    }

    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()> {
        let stored = self.read(key).await?;
        let pending = pending_boundary_ids(stored.as_ref(), watermark);

        let mut conn = self.pool.clone();
        let script = redis::Script::new(MERGE_FORWARD_SCRIPT);
        let mut invocation = script.key(self.hash_key(key));
        invocation
            .key(self.boundary_key(key))
            .key(self.index_key())
            .arg(watermark.at.timestamp_micros())
            .arg(watermark.at.to_rfc3339())
            .arg(index_member(key));
        for id in &pending {
            invocation.arg(id.as_str());
        }

        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(RedisError::from)?;
        debug!(
            key = %key,
            at = %watermark.at,
            new_boundary_ids = pending.len(),
            applied = applied == 1,
            "Stored watermark"
        );
        Ok(())
    }

    async fn clear(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for kind in SyncKind::ALL {
            let key = WatermarkKey::new(table, kind);
            pipe.del(self.hash_key(&key))
                .ignore()
                .del(self.boundary_key(&key))
                .ignore()
                .srem(self.index_key(), index_member(&key))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(RedisError::from)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(WatermarkKey, Watermark)>> {
        let mut conn = self.pool.clone();
        let members: Vec<String> = conn
            .smembers(self.index_key())
            .await
            .map_err(RedisError::from)?;

        let mut keys: Vec<WatermarkKey> = members
            .iter()
            .filter_map(|m| parse_index_member(m))
            .collect();
        keys.sort();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(watermark) = self.read(&key).await? {
                entries.push((key, watermark));
            }
        }
        Ok(entries)
    }
}
