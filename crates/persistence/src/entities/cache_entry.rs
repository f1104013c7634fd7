//! Cache entry entity (one stored generation result).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use domain::models::{CompiledTemplate, PerformanceMetrics, RenderedEmail, ValidationResult};

/// The stored result of one successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct CachedGeneration {
    pub template: CompiledTemplate,
    pub email: Option<RenderedEmail>,
    pub validation: Option<ValidationResult>,
    pub metrics: PerformanceMetrics,
}

impl CachedGeneration {
    /// Rough in-memory footprint, used for stats only.
    pub fn approx_bytes(&self) -> usize {
        self.template.markup.len()
            + self
                .email
                .as_ref()
                .map(|e| e.html.len() + e.css.len())
                .unwrap_or(0)
    }
}

/// A fingerprint-keyed cache row.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryEntity {
    pub fingerprint: String,
    pub payload: CachedGeneration,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntryEntity {
    pub fn new(fingerprint: impl Into<String>, payload: CachedGeneration, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: fingerprint.into(),
            payload,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            last_accessed: now,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Idle for longer than `idle` and accessed fewer than `min_hits` times.
    pub fn is_stale(&self, now: DateTime<Utc>, idle: Duration, min_hits: u64) -> bool {
        now - self.last_accessed > idle && self.hit_count < min_hits
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_accessed = now;
    }
}
