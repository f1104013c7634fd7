//! Cache store implementations.

pub mod template_cache;

pub use template_cache::{
    CacheError, CacheStoreStats, SweepPolicy, SweepReport, TemplateCache,
    TemplateCacheRepository,
};
