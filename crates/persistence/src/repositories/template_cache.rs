//! Fingerprint-keyed store for generation results.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::entities::{CacheEntryEntity, CachedGeneration};
use crate::metrics::{record_cache_entries, record_evictions, CacheOpTimer};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid cache ttl: {0}")]
    InvalidTtl(String),
}

/// Eviction rules applied by [`TemplateCache::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    pub idle: Duration,
    pub min_hits: u64,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self {
            idle: Duration::hours(24),
            min_hits: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub stale: usize,
    pub remaining: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.expired + self.stale
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStoreStats {
    pub entries: usize,
    pub total_hits: u64,
    pub approx_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
}

/// Storage seam used by the generation controller.
#[async_trait]
pub trait TemplateCache: Send + Sync {
    /// Returns a live entry and records the hit. Expired entries are dropped
    /// and reported as absent.
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntryEntity>, CacheError>;

    async fn put(
        &self,
        fingerprint: &str,
        payload: CachedGeneration,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    async fn remove(&self, fingerprint: &str) -> Result<bool, CacheError>;

    async fn sweep(&self, policy: SweepPolicy) -> Result<SweepReport, CacheError>;

    async fn stats(&self) -> Result<CacheStoreStats, CacheError>;
}

/// In-process store behind a `tokio::sync::RwLock`.
#[derive(Debug)]
pub struct TemplateCacheRepository {
    entries: RwLock<HashMap<String, CacheEntryEntity>>,
    max_entries: usize,
}

impl TemplateCacheRepository {
    /// Creates a store holding at most `max_entries` results. When full, the
    /// least recently accessed entry makes room for a new one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Sweep against an explicit clock.
    pub async fn sweep_at(&self, now: DateTime<Utc>, policy: SweepPolicy) -> SweepReport {
        let timer = CacheOpTimer::new("sweep");
        let mut entries = self.entries.write().await;
        let mut report = SweepReport::default();

        entries.retain(|_, entry| {
            if entry.is_expired(now) {
                report.expired += 1;
                false
            } else if entry.is_stale(now, policy.idle, policy.min_hits) {
                report.stale += 1;
                false
            } else {
                true
            }
        });
        report.remaining = entries.len();
        drop(entries);

        record_evictions("expired", report.expired);
        record_evictions("stale", report.stale);
        record_cache_entries(report.remaining);
        timer.record();

        tracing::debug!(
            expired = report.expired,
            stale = report.stale,
            remaining = report.remaining,
            "Cache sweep finished"
        );
        report
    }

    async fn get_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<CacheEntryEntity> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(fingerprint) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                return Some(entry.clone());
            }
            Some(_) => {}
        }
        entries.remove(fingerprint);
        record_evictions("expired", 1);
        record_cache_entries(entries.len());
        None
    }
}

impl Default for TemplateCacheRepository {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl TemplateCache for TemplateCacheRepository {
    async fn get(&self, fingerprint: &str) -> Result<Option<CacheEntryEntity>, CacheError> {
        let timer = CacheOpTimer::new("get");
        let entry = self.get_at(fingerprint, Utc::now()).await;
        timer.record();
        Ok(entry)
    }

    async fn put(
        &self,
        fingerprint: &str,
        payload: CachedGeneration,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl <= Duration::zero() {
            return Err(CacheError::InvalidTtl(format!("{}s", ttl.num_seconds())));
        }
        let timer = CacheOpTimer::new("put");
        let mut entries = self.entries.write().await;

        if !entries.contains_key(fingerprint) && entries.len() >= self.max_entries {
            let victim = entries
                .values()
                .min_by_key(|e| e.last_accessed)
                .map(|e| e.fingerprint.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                record_evictions("capacity", 1);
            }
        }

        entries.insert(
            fingerprint.to_string(),
            CacheEntryEntity::new(fingerprint, payload, ttl),
        );
        record_cache_entries(entries.len());
        timer.record();
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(fingerprint).is_some();
        record_cache_entries(entries.len());
        Ok(removed)
    }

    async fn sweep(&self, policy: SweepPolicy) -> Result<SweepReport, CacheError> {
        Ok(self.sweep_at(Utc::now(), policy).await)
    }

    async fn stats(&self) -> Result<CacheStoreStats, CacheError> {
        let entries = self.entries.read().await;
        Ok(CacheStoreStats {
            entries: entries.len(),
            total_hits: entries.values().map(|e| e.hit_count).sum(),
            approx_bytes: entries.values().map(|e| e.payload.approx_bytes()).sum(),
            oldest_entry: entries.values().map(|e| e.created_at).min(),
        })
    }
}
