//! Cache entity definitions.

pub mod cache_entry;

pub use cache_entry::{CacheEntryEntity, CachedGeneration};
