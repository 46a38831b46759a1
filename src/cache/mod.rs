//! Persistent snapshot cache with offline support.
//!
//! This module provides a category-agnostic cache that:
//! - Writes every snapshot redundantly to several storage tiers
//! - Never lets an older fetch overwrite a newer cached snapshot
//! - Serves the newest copy any tier still holds
//! - Prunes stale local copies on a background timer

mod layer;
mod storage;
mod sweeper;
mod traits;

pub use layer::{cache_key, CacheOptions, PersistentCache};
pub use storage::{FileKvTier, MemoryTier, SqliteTier, DEFAULT_CACHE_NAME, DEFAULT_KV_QUOTA};
pub use sweeper::PruneSweeper;
pub use traits::{format_bytes, CacheEntry, CacheTier, TierInfo, WriteReport};
