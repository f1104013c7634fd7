//! Template generation workflow.
//!
//! Glues the domain pipeline stages together behind the generation
//! controller: build, adapt, compile, inline, dark mode, optimize, validate.

use std::sync::Arc;
use std::time::Instant;

use domain::models::{
    CompiledTemplate, EmailClient, GenerationOptions, GenerationRequest, IssueCategory,
    PerformanceMetrics, PerformanceTargets, RenderedEmail, ScoreWeights, Severity,
    ValidationError, ValidationResult,
};
use domain::services::compiler::extract_css;
use domain::services::{
    adapt_html, adapt_markup, adaptation_notes, client_compatibility, inject_dark_mode,
    inline_css, optimize, validate_html, validate_markup, ClientCompatibility, Compiler,
    CompilerBackendError, DarkModeConfig, MarkupBuilder, OptimizeOutcome,
};
use persistence::entities::CachedGeneration;
use persistence::repositories::{SweepReport, TemplateCacheRepository};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::generation_controller::{
    ControllerSettings, ControllerStats, GenerationController, GenerationError, GenerationOutcome,
};
use super::mjml_compiler::build_compiler;
use crate::config::Config;

/// Defaults applied to calls that leave options unset.
#[derive(Debug, Clone)]
pub struct GenerationDefaults {
    pub target_clients: Vec<EmailClient>,
    pub performance: PerformanceTargets,
}

impl GenerationDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_clients: config.generation.default_target_clients.clone(),
            performance: config.performance.clone(),
        }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            target_clients: Vec::new(),
            performance: PerformanceTargets::default(),
        }
    }
}

/// One entry of a batch or compatibility report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub request: GenerationRequest,
    #[serde(default)]
    pub options: Option<GenerationOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub code: String,
    pub message: String,
}

impl From<&GenerationError> for ItemError {
    fn from(e: &GenerationError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GenerationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl BatchItemResult {
    fn from_result(id: String, result: Result<GenerationOutcome, GenerationError>) -> Self {
        match result {
            Ok(outcome) => Self {
                id,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                id,
                outcome: None,
                error: Some(ItemError::from(&e)),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Per-item compatibility breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityReport {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    pub clients: Vec<ClientCompatibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

pub struct TemplateGenerationService {
    controller: Arc<GenerationController>,
    compiler: Compiler,
    defaults: GenerationDefaults,
}

impl TemplateGenerationService {
    pub fn new(
        controller: Arc<GenerationController>,
        compiler: Compiler,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            controller,
            compiler,
            defaults,
        }
    }

    /// Wires the in-process cache, controller and configured compiler.
    pub fn from_config(config: &Config) -> Result<Self, CompilerBackendError> {
        let cache = Arc::new(TemplateCacheRepository::new(config.cache.max_entries));
        let controller = Arc::new(GenerationController::new(
            cache,
            ControllerSettings::from_config(&config.generation, &config.cache),
        ));
        let compiler = build_compiler(&config.compiler)?;
        Ok(Self::new(controller, compiler, GenerationDefaults::from_config(config)))
    }

    pub fn controller(&self) -> &Arc<GenerationController> {
        &self.controller
    }

    pub fn compiler_backend(&self) -> &'static str {
        self.compiler.backend_name()
    }

    /// Options used when a caller sends none.
    pub fn default_options(&self) -> GenerationOptions {
        GenerationOptions {
            target_clients: self.defaults.target_clients.clone(),
            performance: self.defaults.performance.clone(),
            ..GenerationOptions::default()
        }
    }

    fn resolve_options(&self, mut options: GenerationOptions) -> GenerationOptions {
        if options.target_clients.is_empty() {
            options.target_clients = self.defaults.target_clients.clone();
        }
        options
    }

    pub async fn generate_complete(
        &self,
        request: &GenerationRequest,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.generate_with_cancel(request, options, &CancellationToken::new())
            .await
    }

    /// Runs the full pipeline, or serves the cached result of an identical
    /// earlier call.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        options: GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        request.check()?;
        let options = self.resolve_options(options);
        let compiler = &self.compiler;

        self.controller
            .generate(request, &options, || {
                run_pipeline(compiler, request, &options, cancel)
            })
            .await
    }

    /// Generates every item concurrently. Results keep the input order and a
    /// failed item never affects its siblings.
    pub async fn generate_batch(self: &Arc<Self>, items: Vec<BatchItem>) -> Vec<BatchItemResult> {
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let service = Arc::clone(self);
            tasks.spawn(async move {
                let options = item.options.unwrap_or_else(|| service.default_options());
                let result = service.generate_complete(&item.request, options).await;
                (index, BatchItemResult::from_result(item.id, result))
            });
        }

        let mut slots: Vec<Option<BatchItemResult>> = vec![None; ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "Batch generation task failed"),
            }
        }

        let results: Vec<BatchItemResult> = slots
            .into_iter()
            .zip(ids)
            .map(|(slot, id)| {
                slot.unwrap_or_else(|| BatchItemResult {
                    id,
                    outcome: None,
                    error: Some(ItemError {
                        code: "TASK_FAILED".to_string(),
                        message: "Generation task aborted".to_string(),
                    }),
                })
            })
            .collect();

        info!(
            items = results.len(),
            failed = results.iter().filter(|r| !r.is_ok()).count(),
            "Batch generation finished"
        );
        results
    }

    /// Generates each item and scores the HTML per client. Items without
    /// target clients are scored against every known client.
    pub async fn compatibility_report(
        self: &Arc<Self>,
        items: Vec<BatchItem>,
    ) -> Vec<CompatibilityReport> {
        let items: Vec<BatchItem> = items
            .into_iter()
            .map(|mut item| {
                let mut options = item.options.take().unwrap_or_else(|| self.default_options());
                options.render_html = true;
                if options.target_clients.is_empty() {
                    options.target_clients = EmailClient::ALL.to_vec();
                }
                item.options = Some(options);
                item
            })
            .collect();
        let targets: Vec<Vec<EmailClient>> = items
            .iter()
            .map(|i| {
                i.options
                    .as_ref()
                    .map(GenerationOptions::normalized_targets)
                    .unwrap_or_default()
            })
            .collect();

        self.generate_batch(items)
            .await
            .into_iter()
            .zip(targets)
            .map(|(result, clients)| match (result.outcome, result.error) {
                (Some(outcome), _) => {
                    let html = outcome.email.as_ref().map(|e| e.html.as_str()).unwrap_or_default();
                    CompatibilityReport {
                        id: result.id,
                        overall_score: outcome.validation.as_ref().map(|v| v.score),
                        clients: clients
                            .iter()
                            .map(|client| client_compatibility(html, *client))
                            .collect(),
                        error: None,
                    }
                }
                (None, error) => CompatibilityReport {
                    id: result.id,
                    overall_score: None,
                    clients: Vec::new(),
                    error,
                },
            })
            .collect()
    }

    pub fn optimize_only(&self, html: &str, targets: Option<&PerformanceTargets>) -> OptimizeOutcome {
        optimize(html, targets.unwrap_or(&self.defaults.performance))
    }

    pub fn validate_markup(&self, markup: &str, targets: &[EmailClient]) -> ValidationResult {
        validate_markup(markup, targets)
    }

    pub fn validate_html(&self, html: &str, targets: &[EmailClient]) -> ValidationResult {
        validate_html(html, targets)
    }

    pub async fn cache_stats(&self) -> ControllerStats {
        self.controller.stats().await
    }

    pub async fn optimize_cache(&self) -> SweepReport {
        self.controller.sweep().await
    }
}

fn size_limit_error(outcome: &OptimizeOutcome, max_size_kb: usize) -> ValidationError {
    ValidationError {
        code: "SIZE_LIMIT_EXCEEDED".to_string(),
        message: format!(
            "Optimized HTML is {} bytes, over the {} KB ceiling",
            outcome.optimized_size, max_size_kb
        ),
        severity: Severity::High,
        category: IssueCategory::Performance,
        location: None,
        fix: Some("Reduce copy, sections or inline styles".to_string()),
    }
}

/// The generation pipeline proper. Runs only on cache misses.
async fn run_pipeline(
    compiler: &Compiler,
    request: &GenerationRequest,
    options: &GenerationOptions,
    cancel: &CancellationToken,
) -> Result<CachedGeneration, GenerationError> {
    let start = Instant::now();
    let targets = options.normalized_targets();

    let built = MarkupBuilder::build(request)?;
    debug!(layout = %built.layout, sections = built.sections.len(), "Markup built");

    let markup = adapt_markup(&built.markup, &targets);
    let template = CompiledTemplate::new(
        markup,
        built.layout,
        built.sections.len(),
        built.asset_usage_count,
    );

    let validation = options
        .validate
        .then(|| validate_markup(&template.markup, &targets));

    if !options.render_html {
        let metrics = template
            .performance_metrics()
            .clone()
            .with_timing(start.elapsed().as_millis() as u64);
        return Ok(CachedGeneration {
            template,
            email: None,
            validation,
            metrics,
        });
    }

    let compiled = compiler.compile(&template.markup, cancel).await?;
    debug!(
        backend = compiler.backend_name(),
        bytes = compiled.html.len(),
        repaired = compiled.repaired,
        "Markup compiled"
    );

    let mut html = adapt_html(&compiled.html, &targets);
    if targets.iter().any(|c| c.rules().strips_style_blocks) {
        html = inline_css(&html);
        debug!("Inlined CSS for style-stripping clients");
    }

    let dark_mode = request.design().map(|d| d.dark_mode).unwrap_or(false);
    if let Some(design) = request.design().filter(|d| d.dark_mode) {
        html = inject_dark_mode(&html, &DarkModeConfig::for_design(design));
        debug!("Injected dark mode styles");
    }

    let optimized = optimize(&html, &options.performance);
    debug!(
        original = optimized.original_size,
        optimized = optimized.optimized_size,
        passes = ?optimized.passes,
        "HTML optimized"
    );

    let mut validation =
        validation.map(|markup_result| markup_result.merge(validate_html(&optimized.html, &targets)));

    let mut warnings = compiled.warnings;
    warnings.extend(adaptation_notes(&targets));
    if optimized.ceiling_exceeded {
        let error = size_limit_error(&optimized, options.performance.max_size_kb);
        warnings.push(error.message.clone());
        if let Some(result) = validation.as_mut() {
            result.push_error(error, ScoreWeights::HTML);
        }
    }

    let render_duration_ms = start.elapsed().as_millis() as u64;
    let email = RenderedEmail {
        template_id: template.id,
        css: extract_css(&optimized.html),
        byte_size: optimized.html.len(),
        html: optimized.html,
        render_duration_ms,
        warnings,
        dark_mode,
    };
    let metrics = PerformanceMetrics::measure(&email.html).with_timing(render_duration_ms);

    Ok(CachedGeneration {
        template,
        email: Some(email),
        validation,
        metrics,
    })
}
