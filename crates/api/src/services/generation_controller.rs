//! Result cache and in-flight coordination for template generation.
//!
//! Results are keyed by a request fingerprint. Concurrent calls for the same
//! campaign are coalesced on a coarse key: only one of them runs the
//! pipeline while the others wait for it and then re-read the cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use domain::models::{
    CompiledTemplate, ContentContext, DesignRequirements, EmailClient, GenerationOptions,
    GenerationRequest, PerformanceMetrics, PerformanceTargets, RenderedEmail,
    RequestValidationError, ValidationResult,
};
use domain::services::{BuildError, CompileError};
use persistence::entities::CachedGeneration;
use persistence::repositories::{CacheStoreStats, SweepPolicy, SweepReport, TemplateCache};
use serde::Serialize;
use shared::crypto::{fingerprint, sha256_hex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, GenerationConfig};
use crate::middleware::metrics::{
    record_cache_hit, record_cache_miss, record_generation, record_generation_rejected,
};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{message}")]
    InvalidRequest { code: &'static str, message: String },

    #[error("Maximum concurrent generations ({limit}) exceeded")]
    MaxConcurrentGenerationsExceeded { limit: usize },

    #[error("MJML generation workflow failed: {0}")]
    Compile(CompileError),

    #[error("MJML generation workflow failed: {0}")]
    Workflow(String),

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::InvalidRequest { code, .. } => code,
            GenerationError::MaxConcurrentGenerationsExceeded { .. } => {
                "MAX_CONCURRENT_GENERATIONS_EXCEEDED"
            }
            GenerationError::Compile(_) => "COMPILE_FAILED",
            GenerationError::Workflow(_) => "WORKFLOW_FAILED",
            GenerationError::Cancelled => "CANCELLED",
        }
    }
}

impl From<RequestValidationError> for GenerationError {
    fn from(e: RequestValidationError) -> Self {
        GenerationError::InvalidRequest {
            code: e.code,
            message: e.message,
        }
    }
}

impl From<BuildError> for GenerationError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::InvalidRequest(inner) => inner.into(),
        }
    }
}

impl From<CompileError> for GenerationError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Cancelled => GenerationError::Cancelled,
            other => GenerationError::Compile(other),
        }
    }
}

/// Result of one `generate` call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub fingerprint: String,
    pub template: CompiledTemplate,
    pub email: Option<RenderedEmail>,
    pub validation: Option<ValidationResult>,
    pub metrics: PerformanceMetrics,
    /// Whether the result was served from the cache.
    pub cached: bool,
}

impl GenerationOutcome {
    fn from_generation(fingerprint: String, generation: CachedGeneration, cached: bool) -> Self {
        Self {
            fingerprint,
            template: generation.template,
            email: generation.email,
            validation: generation.validation,
            metrics: generation.metrics,
            cached,
        }
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    content_context: Option<&'a ContentContext>,
    design_requirements: Option<&'a DesignRequirements>,
    target_clients: Vec<EmailClient>,
    render_html: bool,
    validate: bool,
    performance: &'a PerformanceTargets,
}

/// Cache key over everything that changes the stored result. The TTL and
/// `use_cache` only decide whether and how long it is stored.
pub fn request_fingerprint(
    request: &GenerationRequest,
    options: &GenerationOptions,
) -> Result<String, serde_json::Error> {
    fingerprint(&FingerprintInput {
        content_context: request.content_context.as_ref(),
        design_requirements: request.design_requirements.as_ref(),
        target_clients: options.normalized_targets(),
        render_html: options.render_html,
        validate: options.validate,
        performance: &options.performance,
    })
}

/// In-flight key: subject plus campaign id.
pub fn coarse_key(request: &GenerationRequest) -> String {
    let subject = request
        .content_context
        .as_ref()
        .map(|c| c.subject.as_str())
        .unwrap_or_default();
    let campaign = request.campaign_id.as_deref().unwrap_or_default();
    sha256_hex(&format!("{}|{}", subject, campaign))
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_concurrent: usize,
    pub wait_timeout: Duration,
    pub default_ttl: chrono::Duration,
    pub cache_enabled: bool,
    pub sweep_policy: SweepPolicy,
}

impl ControllerSettings {
    pub fn from_config(generation: &GenerationConfig, cache: &CacheConfig) -> Self {
        Self {
            max_concurrent: generation.max_concurrent_generations.max(1),
            wait_timeout: generation.wait_timeout(),
            default_ttl: chrono::Duration::seconds(generation.default_cache_ttl_secs as i64),
            cache_enabled: cache.enabled,
            sweep_policy: SweepPolicy {
                idle: chrono::Duration::hours(cache.idle_eviction_hours),
                min_hits: cache.min_hits_to_keep,
            },
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            wait_timeout: Duration::from_secs(30),
            default_ttl: chrono::Duration::hours(2),
            cache_enabled: true,
            sweep_policy: SweepPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    generations: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    generation_time_ms: AtomicU64,
    cache_time_ms: AtomicU64,
}

/// Rolling controller statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStats {
    pub generations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub avg_generation_ms: f64,
    pub avg_cache_ms: f64,
    pub estimated_time_saved_ms: f64,
    pub in_flight: usize,
    pub store: CacheStoreStats,
}

enum Claim<'a> {
    Acquired(InFlightGuard<'a>),
    Busy(watch::Receiver<bool>),
}

/// Holds an in-flight slot. Dropping it frees the slot and wakes waiters.
struct InFlightGuard<'a> {
    controller: &'a GenerationController,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let sender = self
            .controller
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        if let Some(sender) = sender {
            sender.send_replace(true);
        }
    }
}

pub struct GenerationController {
    cache: Arc<dyn TemplateCache>,
    in_flight: Mutex<HashMap<String, watch::Sender<bool>>>,
    settings: ControllerSettings,
    counters: Counters,
}

impl GenerationController {
    pub fn new(cache: Arc<dyn TemplateCache>, settings: ControllerSettings) -> Self {
        Self {
            cache,
            in_flight: Mutex::new(HashMap::new()),
            settings,
            counters: Counters::default(),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Serves `request` from the cache or runs `pipeline` for it.
    ///
    /// At most one pipeline runs per coarse key. Callers that find the key
    /// busy wait for the running call to finish, up to the configured wait
    /// timeout, and then look at the cache again.
    pub async fn generate<F, Fut>(
        &self,
        request: &GenerationRequest,
        options: &GenerationOptions,
        pipeline: F,
    ) -> Result<GenerationOutcome, GenerationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedGeneration, GenerationError>>,
    {
        let fingerprint = request_fingerprint(request, options)
            .map_err(|e| GenerationError::Workflow(format!("fingerprint: {}", e)))?;
        let key = coarse_key(request);
        let use_cache = self.settings.cache_enabled && options.use_cache;
        let ttl = options
            .cache_time_secs
            .map(|secs| chrono::Duration::seconds(secs as i64))
            .unwrap_or(self.settings.default_ttl);

        let deadline = Instant::now() + self.settings.wait_timeout;
        let mut miss_recorded = false;

        loop {
            if use_cache {
                if let Some(outcome) = self.lookup(&fingerprint).await {
                    return Ok(outcome);
                }
            }
            if !miss_recorded {
                self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
                record_cache_miss();
                miss_recorded = true;
            }

            match self.try_claim(&key)? {
                Claim::Acquired(guard) => {
                    let result = self.run(fingerprint, ttl, use_cache, pipeline).await;
                    drop(guard);
                    return result;
                }
                Claim::Busy(mut done) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    debug!(fingerprint = short(&fingerprint), "Waiting for in-flight generation");
                    let finished = !remaining.is_zero()
                        && tokio::time::timeout(remaining, done.wait_for(|d| *d))
                            .await
                            .is_ok();
                    if finished {
                        continue;
                    }

                    if use_cache {
                        if let Some(outcome) = self.lookup(&fingerprint).await {
                            return Ok(outcome);
                        }
                    }
                    warn!(
                        fingerprint = short(&fingerprint),
                        wait_secs = self.settings.wait_timeout.as_secs(),
                        "Timed out waiting for in-flight generation, generating independently"
                    );
                    return self.run(fingerprint, ttl, use_cache, pipeline).await;
                }
            }
        }
    }

    async fn lookup(&self, fingerprint: &str) -> Option<GenerationOutcome> {
        let start = Instant::now();
        match self.cache.get(fingerprint).await {
            Ok(Some(entry)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .cache_time_ms
                    .fetch_add(elapsed_ms, Ordering::Relaxed);
                record_cache_hit();
                debug!(
                    fingerprint = short(fingerprint),
                    hit_count = entry.hit_count,
                    "Cache hit"
                );
                Some(GenerationOutcome::from_generation(
                    entry.fingerprint,
                    entry.payload,
                    true,
                ))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, fingerprint = short(fingerprint), "Cache lookup failed");
                None
            }
        }
    }

    fn try_claim(&self, key: &str) -> Result<Claim<'_>, GenerationError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(sender) = in_flight.get(key) {
            return Ok(Claim::Busy(sender.subscribe()));
        }

        if in_flight.len() >= self.settings.max_concurrent {
            record_generation_rejected();
            return Err(GenerationError::MaxConcurrentGenerationsExceeded {
                limit: self.settings.max_concurrent,
            });
        }

        let (sender, _) = watch::channel(false);
        in_flight.insert(key.to_string(), sender);
        Ok(Claim::Acquired(InFlightGuard {
            controller: self,
            key: key.to_string(),
        }))
    }

    async fn run<F, Fut>(
        &self,
        fingerprint: String,
        ttl: chrono::Duration,
        use_cache: bool,
        pipeline: F,
    ) -> Result<GenerationOutcome, GenerationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedGeneration, GenerationError>>,
    {
        let start = Instant::now();
        let result = pipeline().await;
        let elapsed = start.elapsed();

        let generation = match result {
            Ok(generation) => generation,
            Err(e) => {
                record_generation("failure", elapsed.as_secs_f64());
                warn!(fingerprint = short(&fingerprint), code = e.code(), error = %e, "Generation failed");
                return Err(e);
            }
        };

        self.counters.generations.fetch_add(1, Ordering::Relaxed);
        self.counters
            .generation_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        record_generation("success", elapsed.as_secs_f64());

        if use_cache {
            if let Err(e) = self.cache.put(&fingerprint, generation.clone(), ttl).await {
                warn!(error = %e, fingerprint = short(&fingerprint), "Failed to store generation in cache");
            }
        }

        info!(
            fingerprint = short(&fingerprint),
            duration_ms = elapsed.as_millis() as u64,
            "Template generated"
        );
        Ok(GenerationOutcome::from_generation(fingerprint, generation, false))
    }

    pub async fn stats(&self) -> ControllerStats {
        let generations = self.counters.generations.load(Ordering::Relaxed);
        let cache_hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.counters.cache_misses.load(Ordering::Relaxed);
        let generation_time = self.counters.generation_time_ms.load(Ordering::Relaxed) as f64;
        let cache_time = self.counters.cache_time_ms.load(Ordering::Relaxed) as f64;

        let lookups = cache_hits + cache_misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            cache_hits as f64 / lookups as f64
        };
        let avg_generation_ms = if generations == 0 {
            0.0
        } else {
            generation_time / generations as f64
        };
        let avg_cache_ms = if cache_hits == 0 {
            0.0
        } else {
            cache_time / cache_hits as f64
        };
        let estimated_time_saved_ms =
            (cache_hits as f64 * (avg_generation_ms - avg_cache_ms)).max(0.0);

        let store = self.cache.stats().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read cache store stats");
            CacheStoreStats::default()
        });

        ControllerStats {
            generations,
            cache_hits,
            cache_misses,
            hit_rate,
            avg_generation_ms,
            avg_cache_ms,
            estimated_time_saved_ms,
            in_flight: self.in_flight_count(),
            store,
        }
    }

    /// Evicts expired entries and idle entries with few hits.
    pub async fn sweep(&self) -> SweepReport {
        match self.cache.sweep(self.settings.sweep_policy).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Cache sweep failed");
                SweepReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::{generation, request};
    use domain::models::CompressionLevel;
    use async_trait::async_trait;
    use persistence::entities::CacheEntryEntity;
    use persistence::repositories::{CacheError, TemplateCacheRepository};
    use std::sync::atomic::AtomicUsize;

    fn controller() -> Arc<GenerationController> {
        Arc::new(GenerationController::new(
            Arc::new(TemplateCacheRepository::default()),
            ControllerSettings::default(),
        ))
    }

    struct BrokenCache;

    #[async_trait]
    impl TemplateCache for BrokenCache {
        async fn get(&self, _: &str) -> Result<Option<CacheEntryEntity>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn put(&self, _: &str, _: CachedGeneration, _: chrono::Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn remove(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn sweep(&self, _: SweepPolicy) -> Result<SweepReport, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn stats(&self) -> Result<CacheStoreStats, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_fingerprint_ignores_target_order_and_ttl() {
        let req = request(2);
        let a = GenerationOptions {
            target_clients: vec![EmailClient::Outlook, EmailClient::Gmail],
            cache_time_secs: Some(60),
            ..GenerationOptions::default()
        };
        let b = GenerationOptions {
            target_clients: vec![EmailClient::Gmail, EmailClient::Outlook, EmailClient::Gmail],
            ..GenerationOptions::default()
        };
        assert_eq!(
            request_fingerprint(&req, &a).unwrap(),
            request_fingerprint(&req, &b).unwrap()
        );

        let c = GenerationOptions {
            render_html: false,
            ..b.clone()
        };
        assert_ne!(
            request_fingerprint(&req, &b).unwrap(),
            request_fingerprint(&req, &c).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_covers_validate_and_performance() {
        let req = request(2);
        let base = request_fingerprint(&req, &GenerationOptions::default()).unwrap();

        let unvalidated = GenerationOptions {
            validate: false,
            ..GenerationOptions::default()
        };
        assert_ne!(base, request_fingerprint(&req, &unvalidated).unwrap());

        let uncompressed = GenerationOptions {
            performance: PerformanceTargets {
                compression_level: CompressionLevel::None,
                ..PerformanceTargets::default()
            },
            ..GenerationOptions::default()
        };
        assert_ne!(base, request_fingerprint(&req, &uncompressed).unwrap());

        let larger = GenerationOptions {
            performance: PerformanceTargets {
                max_size_kb: 500,
                ..PerformanceTargets::default()
            },
            ..GenerationOptions::default()
        };
        assert_ne!(base, request_fingerprint(&req, &larger).unwrap());

        let uncached = GenerationOptions {
            use_cache: false,
            ..GenerationOptions::default()
        };
        assert_eq!(base, request_fingerprint(&req, &uncached).unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_assets_but_not_content() {
        let options = GenerationOptions::default();
        let base = request_fingerprint(&request(1), &options).unwrap();
        assert_eq!(base, request_fingerprint(&request(4), &options).unwrap());

        let mut changed = request(1);
        changed.content_context.as_mut().unwrap().preheader = "Different".into();
        assert_ne!(base, request_fingerprint(&changed, &options).unwrap());
    }

    #[test]
    fn test_coarse_key_uses_subject_and_campaign() {
        let a = request(1);
        let mut b = request(3);
        assert_eq!(coarse_key(&a), coarse_key(&b));
        b.campaign_id = Some("autumn".into());
        assert_ne!(coarse_key(&a), coarse_key(&b));
        assert_eq!(coarse_key(&a).len(), 64);
    }

    #[test]
    fn test_error_codes_and_messages() {
        let err: GenerationError =
            RequestValidationError::new("MISSING_SUBJECT", "Email subject is required").into();
        assert_eq!(err.code(), "MISSING_SUBJECT");
        assert_eq!(err.to_string(), "Email subject is required");

        let err = GenerationError::Workflow("boom".into());
        assert_eq!(err.to_string(), "MJML generation workflow failed: boom");

        let err: GenerationError = CompileError::Cancelled.into();
        assert!(matches!(err, GenerationError::Cancelled));
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let controller = controller();
        let req = request(2);
        let options = GenerationOptions::default();

        let first = controller
            .generate(&req, &options, || async { Ok(generation("<mjml/>")) })
            .await
            .unwrap();
        assert!(!first.cached);

        let second = controller
            .generate(&req, &options, || async {
                Err(GenerationError::Workflow("pipeline must not run".into()))
            })
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.template.id, first.template.id);
        assert_eq!(second.fingerprint, first.fingerprint);

        let stats = controller.stats().await;
        assert_eq!(stats.generations, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.store.entries, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_options_that_change_the_result_miss_the_cache() {
        let controller = controller();
        let req = request(2);

        let unvalidated = GenerationOptions {
            validate: false,
            ..GenerationOptions::default()
        };
        let first = controller
            .generate(&req, &unvalidated, || async { Ok(generation("<mjml/>")) })
            .await
            .unwrap();
        assert!(!first.cached);

        let validated = controller
            .generate(&req, &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await
            .unwrap();
        assert!(!validated.cached);
        assert_ne!(validated.fingerprint, first.fingerprint);

        let uncompressed = GenerationOptions {
            performance: PerformanceTargets {
                compression_level: CompressionLevel::None,
                ..PerformanceTargets::default()
            },
            ..GenerationOptions::default()
        };
        let raw = controller
            .generate(&req, &uncompressed, || async { Ok(generation("<mjml/>")) })
            .await
            .unwrap();
        assert!(!raw.cached);

        assert_eq!(controller.stats().await.store.entries, 3);
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_cache() {
        let controller = controller();
        let req = request(2);
        let options = GenerationOptions {
            use_cache: false,
            ..GenerationOptions::default()
        };
        for _ in 0..2 {
            let outcome = controller
                .generate(&req, &options, || async { Ok(generation("<mjml/>")) })
                .await
                .unwrap();
            assert!(!outcome.cached);
        }
        assert_eq!(controller.stats().await.store.entries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_run_pipeline_once() {
        let controller = controller();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release, gate) = watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let controller = controller.clone();
            let runs = runs.clone();
            let mut gate = gate.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .generate(&request(2), &GenerationOptions::default(), || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.wait_for(|open| *open).await;
                        Ok(generation("<mjml/>"))
                    })
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.in_flight_count(), 1);
        release.send_replace(true);

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().template.id);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_ceiling_rejects_new_keys() {
        let controller = Arc::new(GenerationController::new(
            Arc::new(TemplateCacheRepository::default()),
            ControllerSettings {
                max_concurrent: 1,
                ..ControllerSettings::default()
            },
        ));
        let (release, gate) = watch::channel(false);

        let holder = {
            let controller = controller.clone();
            let mut gate = gate.clone();
            tokio::spawn(async move {
                controller
                    .generate(&request(1), &GenerationOptions::default(), || async move {
                        let _ = gate.wait_for(|open| *open).await;
                        Ok(generation("<mjml/>"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut other = request(1);
        other.campaign_id = Some("other-campaign".into());
        let err = controller
            .generate(&other, &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MaxConcurrentGenerationsExceeded { limit: 1 }
        ));

        release.send_replace(true);
        assert!(holder.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_failure_releases_claim() {
        let controller = controller();
        let req = request(1);
        let err = controller
            .generate(&req, &GenerationOptions::default(), || async {
                Err(GenerationError::Workflow("broken".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WORKFLOW_FAILED");
        assert_eq!(controller.in_flight_count(), 0);

        let ok = controller
            .generate(&req, &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_call_releases_claim() {
        let controller = controller();
        let req = request(1);
        let options = GenerationOptions::default();
        let pending = controller.generate(&req, &options, || {
            std::future::pending::<Result<CachedGeneration, GenerationError>>()
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_timeout_falls_back_to_own_generation() {
        let controller = Arc::new(GenerationController::new(
            Arc::new(TemplateCacheRepository::default()),
            ControllerSettings {
                wait_timeout: Duration::from_millis(30),
                ..ControllerSettings::default()
            },
        ));
        let (_release, gate) = watch::channel(false);

        let stuck = {
            let controller = controller.clone();
            let mut gate = gate.clone();
            tokio::spawn(async move {
                controller
                    .generate(&request(1), &GenerationOptions::default(), || async move {
                        let _ = gate.wait_for(|open| *open).await;
                        Ok(generation("<mjml/>"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let outcome = controller
            .generate(&request(1), &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await
            .unwrap();
        assert!(!outcome.cached);
        stuck.abort();
    }

    #[tokio::test]
    async fn test_cache_failures_are_swallowed() {
        let controller = GenerationController::new(Arc::new(BrokenCache), ControllerSettings::default());
        let outcome = controller
            .generate(&request(1), &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await
            .unwrap();
        assert!(!outcome.cached);
        assert_eq!(controller.sweep().await, SweepReport::default());
        assert_eq!(controller.stats().await.store, CacheStoreStats::default());
    }

    #[tokio::test]
    async fn test_sweep_uses_policy() {
        let controller = controller();
        controller
            .generate(
                &request(1),
                &GenerationOptions {
                    cache_time_secs: Some(3600),
                    ..GenerationOptions::default()
                },
                || async { Ok(generation("<mjml/>")) },
            )
            .await
            .unwrap();
        let report = controller.sweep().await;
        assert_eq!(report.evicted(), 0);
        assert_eq!(report.remaining, 1);
    }
}
