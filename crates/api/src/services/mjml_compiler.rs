//! External markup compiler backends.
//!
//! `ProcessMarkupCompiler` drives the `mjml` executable over stdin/stdout;
//! `HttpMarkupCompiler` calls an MJML render API. Both implement
//! [`MarkupCompiler`] and are selected by [`build_compiler`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use domain::models::Severity;
use domain::services::{
    BackendOutput, BuiltinMarkupCompiler, Compiler, CompilerBackendError, CompilerOptions,
    Diagnostic, MarkupCompiler, ValidationLevel,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{CompilerConfig, CompilerProvider};

lazy_static::lazy_static! {
    static ref LINE_REGEX: regex::Regex = regex::Regex::new(r"(?i)line\s+(\d+)").unwrap();
    static ref TAG_REGEX: regex::Regex = regex::Regex::new(r"\b(mj-[a-z-]+)\b").unwrap();
}

/// Turns one line of compiler output into a diagnostic.
fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let message = line.trim();
    if message.is_empty() {
        return None;
    }
    Some(Diagnostic {
        message: message.to_string(),
        severity: Severity::Medium,
        tag: TAG_REGEX.captures(message).map(|c| c[1].to_string()),
        line: LINE_REGEX
            .captures(message)
            .and_then(|c| c[1].parse().ok()),
    })
}

// ============================================================================
// Process backend
// ============================================================================

pub struct ProcessMarkupCompiler {
    binary_path: String,
    timeout: Duration,
}

impl ProcessMarkupCompiler {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    fn args(options: &CompilerOptions) -> Vec<String> {
        vec![
            "-i".to_string(),
            "-s".to_string(),
            format!("--config.validationLevel={}", options.validation_level),
            format!("--config.keepComments={}", options.keep_comments),
        ]
    }
}

#[async_trait]
impl MarkupCompiler for ProcessMarkupCompiler {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        let mut child = Command::new(&self.binary_path)
            .args(Self::args(options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CompilerBackendError::Unavailable(format!("{}: {}", self.binary_path, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CompilerBackendError::Unavailable("stdin not captured".into()))?;
        stdin
            .write_all(markup.as_bytes())
            .await
            .map_err(|e| CompilerBackendError::Unavailable(e.to_string()))?;
        drop(stdin);

        let timeout_ms = self.timeout.as_millis() as u64;
        // Dropping the child on either early branch kills the process.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompilerBackendError::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(output) => output.map_err(|e| CompilerBackendError::Unavailable(e.to_string()))?,
                Err(_) => return Err(CompilerBackendError::Timeout(timeout_ms)),
            },
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(CompilerBackendError::Rejected(stderr.trim().to_string()));
        }

        let html = String::from_utf8(output.stdout)
            .map_err(|e| CompilerBackendError::InvalidOutput(e.to_string()))?;
        if html.trim().is_empty() {
            return Err(CompilerBackendError::InvalidOutput("empty output".into()));
        }

        Ok(BackendOutput {
            html,
            diagnostics: stderr.lines().filter_map(parse_diagnostic).collect(),
        })
    }
}

// ============================================================================
// HTTP backend
// ============================================================================

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    mjml: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    errors: Vec<RenderError>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderError {
    #[serde(default)]
    line: Option<usize>,
    message: String,
    #[serde(default)]
    tag_name: Option<String>,
}

impl From<RenderError> for Diagnostic {
    fn from(e: RenderError) -> Self {
        Diagnostic {
            message: e.message,
            severity: Severity::Medium,
            tag: e.tag_name,
            line: e.line,
        }
    }
}

pub struct HttpMarkupCompiler {
    client: Client,
    url: String,
    authorization: String,
    timeout_ms: u64,
    circuit_breaker: CircuitBreaker,
}

impl HttpMarkupCompiler {
    pub fn new(config: &CompilerConfig) -> Result<Self, CompilerBackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CompilerBackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            authorization: basic_auth(&config.app_id, &config.secret_key),
            timeout_ms: config.timeout_ms,
            circuit_breaker: CircuitBreaker::new(
                config.circuit_breaker_failures,
                Duration::from_secs(config.circuit_breaker_reset_secs),
            ),
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    async fn call_render_api(&self, markup: &str) -> Result<RenderResponse, CompilerBackendError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(&RenderRequest { mjml: markup })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompilerBackendError::Timeout(self.timeout_ms)
                } else {
                    CompilerBackendError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompilerBackendError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let body: RenderResponse = response
            .json()
            .await
            .map_err(|e| CompilerBackendError::InvalidOutput(e.to_string()))?;

        if !status.is_success() {
            return Err(CompilerBackendError::Rejected(
                body.message.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(body)
    }
}

fn basic_auth(app_id: &str, secret_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", app_id, secret_key)))
}

/// Whether a failure says something about the health of the remote service.
fn counts_against_circuit(error: &CompilerBackendError) -> bool {
    matches!(
        error,
        CompilerBackendError::Timeout(_)
            | CompilerBackendError::Unavailable(_)
            | CompilerBackendError::InvalidOutput(_)
    )
}

#[async_trait]
impl MarkupCompiler for HttpMarkupCompiler {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        if !self.circuit_breaker.is_allowed().await {
            return Err(CompilerBackendError::CircuitOpen);
        }

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompilerBackendError::Cancelled),
            result = self.call_render_api(markup) => result,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let body = match result {
            Ok(body) => {
                self.circuit_breaker.record_success().await;
                body
            }
            Err(e) => {
                if counts_against_circuit(&e) {
                    self.circuit_breaker.record_failure().await;
                }
                error!(error = %e, duration_ms, "Markup render API call failed");
                return Err(e);
            }
        };

        let diagnostics: Vec<Diagnostic> = match options.validation_level {
            ValidationLevel::Skip => Vec::new(),
            _ => body.errors.into_iter().map(Diagnostic::from).collect(),
        };
        if options.validation_level == ValidationLevel::Strict && !diagnostics.is_empty() {
            return Err(CompilerBackendError::Rejected(
                diagnostics
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }

        let html = body
            .html
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| CompilerBackendError::InvalidOutput("response has no html".into()))?;

        debug!(duration_ms, diagnostics = diagnostics.len(), "Markup rendered by API");
        Ok(BackendOutput { html, diagnostics })
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Builds the compiler front-end for the configured backend.
pub fn build_compiler(config: &CompilerConfig) -> Result<Compiler, CompilerBackendError> {
    let backend: Arc<dyn MarkupCompiler> = match config.provider {
        CompilerProvider::Builtin => Arc::new(BuiltinMarkupCompiler::new()),
        CompilerProvider::Process => Arc::new(ProcessMarkupCompiler::new(
            config.binary_path.clone(),
            Duration::from_millis(config.timeout_ms),
        )),
        CompilerProvider::Http => Arc::new(HttpMarkupCompiler::new(config)?),
    };

    let options = CompilerOptions {
        validation_level: config.validation_level,
        keep_comments: config.keep_comments,
    };
    Ok(Compiler::new(backend, options).with_fail_on(config.fail_on))
}
