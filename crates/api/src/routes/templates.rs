//! Template generation endpoint handlers.

use axum::{extract::State, Json};
use domain::models::{
    EmailClient, GenerationOptions, GenerationRequest, PerformanceTargets, ValidationResult,
};
use persistence::repositories::SweepReport;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::{
    BatchItem, BatchItemResult, CompatibilityReport, ControllerStats, GenerationOutcome,
};

#[derive(Debug, Deserialize)]
pub struct GeneratePayload {
    pub request: GenerationRequest,
    #[serde(default)]
    pub options: Option<GenerationOptions>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchPayload {
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}

#[derive(Debug, Serialize)]
pub struct CompatibilityResponse {
    pub reports: Vec<CompatibilityReport>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OptimizePayload {
    #[validate(length(min = 1, message = "html must not be empty"))]
    pub html: String,
    #[serde(default)]
    pub performance: Option<PerformanceTargets>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub html: String,
    pub original_size: usize,
    pub optimized_size: usize,
    pub savings_percent: f64,
    pub ceiling_exceeded: bool,
    pub passes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidatePayload {
    #[validate(length(min = 1, message = "markup must not be empty"))]
    pub markup: Option<String>,
    #[validate(length(min = 1, message = "html must not be empty"))]
    pub html: Option<String>,
    #[serde(default)]
    pub target_clients: Vec<EmailClient>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub is_valid: bool,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<ValidationResult>,
}

/// Checks item count against the configured batch limit.
fn check_batch_size(items: &[BatchItem], max: usize) -> Result<(), ApiError> {
    if items.len() <= max {
        return Ok(());
    }
    let mut errors = ValidationErrors::new();
    let mut error = ValidationError::new("length");
    error.message = Some(format!("at most {} items per call", max).into());
    errors.add("items", error);
    Err(errors.into())
}

/// Generate one template.
///
/// POST /api/v1/templates/generate
pub async fn generate_template(
    State(state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> Result<Json<GenerationOutcome>, ApiError> {
    let options = payload
        .options
        .unwrap_or_else(|| state.service.default_options());
    let outcome = state
        .service
        .generate_complete(&payload.request, options)
        .await?;
    Ok(Json(outcome))
}

/// Generate several templates concurrently.
///
/// POST /api/v1/templates/batch
pub async fn generate_batch(
    State(state): State<AppState>,
    Json(payload): Json<BatchPayload>,
) -> Result<Json<BatchResponse>, ApiError> {
    payload.validate()?;
    check_batch_size(&payload.items, state.config.generation.max_batch_size)?;

    let results = state.service.generate_batch(payload.items).await;
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    info!(total = results.len(), succeeded, "Batch request served");

    Ok(Json(BatchResponse {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        results,
    }))
}

/// Per-client compatibility scores for each item.
///
/// POST /api/v1/templates/compatibility-report
pub async fn compatibility_report(
    State(state): State<AppState>,
    Json(payload): Json<BatchPayload>,
) -> Result<Json<CompatibilityResponse>, ApiError> {
    payload.validate()?;
    check_batch_size(&payload.items, state.config.generation.max_batch_size)?;

    let reports = state.service.compatibility_report(payload.items).await;
    Ok(Json(CompatibilityResponse { reports }))
}

/// Optimize caller-supplied HTML.
///
/// POST /api/v1/templates/optimize
pub async fn optimize_html(
    State(state): State<AppState>,
    Json(payload): Json<OptimizePayload>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    payload.validate()?;

    let outcome = state
        .service
        .optimize_only(&payload.html, payload.performance.as_ref());
    Ok(Json(OptimizeResponse {
        savings_percent: outcome.savings_percent(),
        html: outcome.html,
        original_size: outcome.original_size,
        optimized_size: outcome.optimized_size,
        ceiling_exceeded: outcome.ceiling_exceeded,
        passes: outcome.passes,
    }))
}

/// Validate markup, HTML or both. Both results are merged into the
/// top-level score.
///
/// POST /api/v1/templates/validate
pub async fn validate_template(
    State(state): State<AppState>,
    Json(payload): Json<ValidatePayload>,
) -> Result<Json<ValidateResponse>, ApiError> {
    payload.validate()?;

    let markup = payload
        .markup
        .as_deref()
        .map(|m| state.service.validate_markup(m, &payload.target_clients));
    let html = payload
        .html
        .as_deref()
        .map(|h| state.service.validate_html(h, &payload.target_clients));

    let combined = match (&markup, &html) {
        (Some(m), Some(h)) => m.clone().merge(h.clone()),
        (Some(only), None) | (None, Some(only)) => only.clone(),
        (None, None) => {
            let mut errors = ValidationErrors::new();
            let mut error = ValidationError::new("required");
            error.message = Some("markup or html is required".into());
            errors.add("markup", error);
            return Err(errors.into());
        }
    };

    Ok(Json(ValidateResponse {
        is_valid: combined.is_valid,
        score: combined.score,
        markup,
        html,
    }))
}

/// Cache and generation statistics.
///
/// GET /api/v1/templates/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<ControllerStats> {
    Json(state.service.cache_stats().await)
}

/// Run a cache sweep now.
///
/// POST /api/v1/templates/cache/sweep
pub async fn sweep_cache(State(state): State<AppState>) -> Json<SweepReport> {
    let report = state.service.optimize_cache().await;
    info!(evicted = report.evicted(), "Manual cache sweep");
    Json(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_payload_requires_items() {
        let payload: BatchPayload = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_check_batch_size() {
        let item: BatchItem = serde_json::from_value(serde_json::json!({
            "id": "a",
            "request": {}
        }))
        .unwrap();
        let items = vec![item.clone(), item];
        assert!(check_batch_size(&items, 2).is_ok());
        assert!(matches!(
            check_batch_size(&items, 1),
            Err(ApiError::Validation { .. })
        ));
    }

    #[test]
    fn test_validate_payload_rejects_empty_strings() {
        let payload: ValidatePayload = serde_json::from_str(r#"{"html":""}"#).unwrap();
        assert!(payload.validate().is_err());

        let payload: ValidatePayload =
            serde_json::from_str(r#"{"markup":"<mjml></mjml>","target_clients":["gmail"]}"#)
                .unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(payload.target_clients, vec![EmailClient::Gmail]);
    }
}
