//! Common test utilities for integration tests.
//!
//! Everything runs in-process: the default config uses the builtin markup
//! compiler and the in-memory template cache.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use domain::services::{
    BackendOutput, BuiltinMarkupCompiler, Compiler, CompilerBackendError, CompilerOptions,
    MarkupCompiler,
};
use fake::{faker::company::en::CompanyName, Fake};
use mailcraft_api::{
    app::{create_app, AppState},
    config::Config,
    services::{ControllerSettings, GenerationController, GenerationDefaults, TemplateGenerationService},
};
use persistence::repositories::TemplateCacheRepository;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Embedded defaults plus `overrides`.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    Config::load_for_test(overrides).expect("Failed to load test config")
}

pub fn create_test_app(config: Config) -> Router {
    let state = AppState::from_config(config).expect("Failed to build app state");
    create_app(state)
}

/// Service wired to `backend` with an empty in-memory cache.
pub fn service_with_backend(
    backend: Arc<dyn MarkupCompiler>,
    settings: ControllerSettings,
) -> Arc<TemplateGenerationService> {
    let cache = Arc::new(TemplateCacheRepository::new(100));
    let controller = Arc::new(GenerationController::new(cache, settings));
    let compiler = Compiler::new(backend, CompilerOptions::default());
    Arc::new(TemplateGenerationService::new(
        controller,
        compiler,
        GenerationDefaults::default(),
    ))
}

/// A campaign id no other test uses.
pub fn unique_campaign() -> String {
    let company: String = CompanyName().fake();
    format!(
        "{}-{}",
        company.to_lowercase().replace(|c: char| !c.is_ascii_alphanumeric(), "-"),
        uuid::Uuid::new_v4().simple()
    )
}

/// A complete, valid generation request.
pub fn request_json(campaign_id: &str) -> Value {
    json!({
        "content_context": {
            "subject": "Autumn essentials are back",
            "preheader": "Layers, boots and more",
            "body": {
                "opening": "Hi there",
                "main_content": "Our autumn range has arrived with warm knits and sturdy boots.",
                "benefits": ["Free shipping over $50", "30-day returns"]
            },
            "calls_to_action": [
                { "text": "Shop autumn", "url": "https://shop.example.com/autumn" }
            ],
            "campaign_type": "seasonal",
            "brand_name": "Acme",
            "unsubscribe_url": "https://shop.example.com/unsubscribe"
        },
        "design_requirements": {
            "color_scheme": {
                "primary": "#0055ff",
                "accent": "#ff6600",
                "background": "#ffffff",
                "text": "#333333"
            }
        },
        "asset_manifest": {
            "images": [
                { "url": "https://cdn.example.com/autumn/hero.jpg", "alt_text": "Autumn hero", "width": 600 }
            ]
        },
        "campaign_id": campaign_id
    })
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Builtin compiler that counts renders and can be slowed down.
pub struct CountingCompiler {
    pub calls: AtomicUsize,
    delay: Duration,
    inner: BuiltinMarkupCompiler,
}

impl CountingCompiler {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            inner: BuiltinMarkupCompiler::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarkupCompiler for CountingCompiler {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.render(markup, options, cancel).await
    }
}

/// Builtin compiler that blocks every render until [`release`](Self::release).
pub struct GatedCompiler {
    gate: Semaphore,
    inner: BuiltinMarkupCompiler,
}

impl GatedCompiler {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            inner: BuiltinMarkupCompiler::new(),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1_000);
    }
}

#[async_trait]
impl MarkupCompiler for GatedCompiler {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CompilerBackendError::Unavailable(e.to_string()))?;
        self.inner.render(markup, options, cancel).await
    }
}

/// Builtin compiler whose first render fails.
pub struct FlakyCompiler {
    failed: AtomicBool,
    inner: BuiltinMarkupCompiler,
}

impl FlakyCompiler {
    pub fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            inner: BuiltinMarkupCompiler::new(),
        }
    }
}

#[async_trait]
impl MarkupCompiler for FlakyCompiler {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(CompilerBackendError::Rejected("first render fails".into()));
        }
        self.inner.render(markup, options, cancel).await
    }
}

/// Polls until `check` holds, for at most two seconds.
pub async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
