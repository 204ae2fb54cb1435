//! air2neo Redis persistence
//!
//! Durable watermark storage. Each (table, kind) watermark lives under its
//! own keys and is advanced with a server-side script so concurrent writers
//! can never move it backwards.

pub mod client;
pub mod watermarks;

pub use client::{RedisError, RedisPool, RedisResult, init_pool};
pub use watermarks::RedisWatermarkStore;
