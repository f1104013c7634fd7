//! Compiler front-end: structural gate, nested-section repair, backend dispatch.
//!
//! Backends implement [`MarkupCompiler`]. The front-end owns everything that does
//! not depend on the backend: rejecting unusable markup before any work is done,
//! repairing illegal nesting, applying the diagnostics policy, extracting CSS.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::Severity;

use super::markup::{Element, MarkupDocument, MarkupNode};

lazy_static::lazy_static! {
    static ref STYLE_CONTENT_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<style\b[^>]*>(.*?)</style>").unwrap();
}

/// Elements that occupy a full-width row of the body.
pub const SECTION_TAGS: &[&str] = &["mj-section", "mj-hero"];

/// List elements the compiler cannot render.
pub const LIST_TAGS: &[&str] = &["mj-list", "mj-list-item"];

/// Strictness passed to the backend's own markup validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Strict,
    #[default]
    Soft,
    Skip,
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationLevel::Strict => write!(f, "strict"),
            ValidationLevel::Soft => write!(f, "soft"),
            ValidationLevel::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    #[serde(default)]
    pub validation_level: ValidationLevel,
    #[serde(default)]
    pub keep_comments: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            validation_level: ValidationLevel::Soft,
            keep_comments: false,
        }
    }
}

/// A problem reported by a backend while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.tag, self.line) {
            (Some(tag), Some(line)) => write!(f, "<{}> line {}: {}", tag, line, self.message),
            (Some(tag), None) => write!(f, "<{}>: {}", tag, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Raw backend result.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
pub enum CompilerBackendError {
    #[error("Markup compiler timed out after {0} ms")]
    Timeout(u64),

    #[error("Markup compiler unavailable: {0}")]
    Unavailable(String),

    #[error("Markup compiler circuit breaker is open")]
    CircuitOpen,

    #[error("Markup compiler rejected the markup: {0}")]
    Rejected(String),

    #[error("Markup compiler returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("Markup compilation cancelled")]
    Cancelled,
}

/// A markup-to-HTML backend.
#[async_trait]
pub trait MarkupCompiler: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError>;
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid markup structure: {}", .0.join("; "))]
    Structure(Vec<String>),

    #[error("Compiler reported {} blocking diagnostic(s): {}", .0.len(), .0.first().map(|d| d.to_string()).unwrap_or_default())]
    Diagnostics(Vec<Diagnostic>),

    #[error(transparent)]
    Backend(#[from] CompilerBackendError),

    #[error("Compilation cancelled")]
    Cancelled,
}

/// Compiled HTML with extracted CSS and non-fatal findings.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub html: String,
    pub css: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Diagnostics rendered as warning strings.
    pub warnings: Vec<String>,
    /// Number of nested sections that were hoisted out of their parent.
    pub repaired: usize,
}

/// Front-end shared by every backend.
#[derive(Clone)]
pub struct Compiler {
    backend: Arc<dyn MarkupCompiler>,
    options: CompilerOptions,
    fail_on: Option<Severity>,
}

impl Compiler {
    pub fn new(backend: Arc<dyn MarkupCompiler>, options: CompilerOptions) -> Self {
        Self {
            backend,
            options,
            fail_on: None,
        }
    }

    /// Makes diagnostics at or above `severity` fatal.
    pub fn with_fail_on(mut self, severity: Option<Severity>) -> Self {
        self.fail_on = severity;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn compile(
        &self,
        markup: &str,
        cancel: &CancellationToken,
    ) -> Result<CompileOutput, CompileError> {
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }

        let mut doc = MarkupDocument::parse(markup)
            .map_err(|e| CompileError::Structure(vec![e.to_string()]))?;

        let problems = check_structure(&doc);
        if !problems.is_empty() {
            return Err(CompileError::Structure(problems));
        }

        let repaired = repair_nested_sections(&mut doc);
        let source = if repaired > 0 {
            debug!(repaired, "Hoisted nested sections");
            doc.to_markup()
        } else {
            markup.to_string()
        };

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompileError::Cancelled),
            result = self.backend.render(&source, &self.options, cancel) => result,
        };
        let output = match output {
            Ok(output) => output,
            Err(CompilerBackendError::Cancelled) => return Err(CompileError::Cancelled),
            Err(e) => return Err(e.into()),
        };

        if let Some(threshold) = self.fail_on {
            let blocking: Vec<Diagnostic> = output
                .diagnostics
                .iter()
                .filter(|d| d.severity >= threshold)
                .cloned()
                .collect();
            if !blocking.is_empty() {
                return Err(CompileError::Diagnostics(blocking));
            }
        }

        let warnings: Vec<String> = output.diagnostics.iter().map(|d| d.to_string()).collect();
        for warning in &warnings {
            warn!(backend = self.backend.name(), diagnostic = %warning, "Compiler diagnostic downgraded to warning");
        }

        let css = extract_css(&output.html);
        Ok(CompileOutput {
            html: output.html,
            css,
            diagnostics: output.diagnostics,
            warnings,
            repaired,
        })
    }
}

/// Concatenated contents of every `<style>` block.
pub fn extract_css(html: &str) -> String {
    STYLE_CONTENT_REGEX
        .captures_iter(html)
        .map(|c| c[1].trim().to_string())
        .filter(|css| !css.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn is_section(el: &Element) -> bool {
    SECTION_TAGS.iter().any(|t| el.is(t))
}

/// Blocking structural problems, in document order.
pub fn check_structure(doc: &MarkupDocument) -> Vec<String> {
    let mut problems = Vec::new();
    let Some(root) = doc.root() else {
        problems.push("Missing <mjml> root element".to_string());
        return problems;
    };
    if root.child("mj-head").is_none() {
        problems.push("Missing <mj-head> element".to_string());
    }
    match root.child("mj-body") {
        None => problems.push("Missing <mj-body> element".to_string()),
        Some(body) => {
            if count_top_level_sections(body) == 0 {
                problems.push("<mj-body> contains no sections".to_string());
            }
        }
    }
    for el in root.descendants() {
        if LIST_TAGS.iter().any(|t| el.is(t)) {
            problems.push(format!("<{}> is not supported by the compiler", el.tag));
        }
    }
    problems
}

/// Sections directly in the body or inside a top-level `mj-wrapper`.
pub fn count_top_level_sections(body: &Element) -> usize {
    body.child_elements()
        .map(|el| {
            if el.is("mj-wrapper") {
                el.child_elements().filter(|c| is_section(c)).count()
            } else if is_section(el) {
                1
            } else {
                0
            }
        })
        .sum()
}

/// Splits every section that contains another section into siblings.
///
/// `A{pre B{inner} post}` becomes `A(pre), B{inner}, A(post)`; parts of `A`
/// without element content are dropped. Returns the number of hoisted sections.
pub fn repair_nested_sections(doc: &mut MarkupDocument) -> usize {
    let Some(body) = doc.body_mut() else {
        return 0;
    };
    let mut repaired = 0;
    body.children = repair_container(std::mem::take(&mut body.children), &mut repaired);
    repaired
}

fn repair_container(children: Vec<MarkupNode>, repaired: &mut usize) -> Vec<MarkupNode> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            MarkupNode::Element(mut el) if el.is("mj-wrapper") => {
                el.children = repair_container(std::mem::take(&mut el.children), repaired);
                out.push(MarkupNode::Element(el));
            }
            MarkupNode::Element(el) if is_section(&el) => {
                out.extend(hoist(el, repaired).into_iter().map(MarkupNode::Element));
            }
            other => out.push(other),
        }
    }
    out
}

/// Breaks `el` around any section found among its descendants.
fn hoist(el: Element, repaired: &mut usize) -> Vec<Element> {
    let Element {
        tag,
        attrs,
        children,
        self_closing,
    } = el;

    let mut out = Vec::new();
    let mut current: Vec<MarkupNode> = Vec::new();
    let mut split = false;

    let shell = |children: Vec<MarkupNode>| Element {
        tag: tag.clone(),
        attrs: attrs.clone(),
        children,
        self_closing: false,
    };

    for child in children {
        let MarkupNode::Element(child) = child else {
            current.push(child);
            continue;
        };
        // Sections nested deeper were counted where they were first found.
        if is_section(&child) {
            *repaired += 1;
        }
        for piece in hoist(child, repaired) {
            if is_section(&piece) {
                split = true;
                let part = std::mem::take(&mut current);
                if part.iter().any(|n| matches!(n, MarkupNode::Element(_))) {
                    out.push(shell(part));
                }
                out.push(piece);
            } else {
                current.push(MarkupNode::Element(piece));
            }
        }
    }

    if !split {
        out.push(Element {
            tag,
            attrs,
            children: current,
            self_closing,
        });
    } else if current.iter().any(|n| matches!(n, MarkupNode::Element(_))) {
        out.push(shell(current));
    }
    out
}
