//! Compiled and rendered template models.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::client::EmailClient;
use super::section::LayoutType;

lazy_static::lazy_static! {
    static ref IMAGE_TAG_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<(?:img|mj-image|mj-hero)\b").unwrap();
    static ref STYLE_BLOCK_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<(?:style|mj-style)\b[^>]*>(.*?)</(?:style|mj-style)>").unwrap();
}

/// Assumed delivery throughput for load-time estimates (1 Mbit/s).
const BYTES_PER_MS: usize = 125;

/// Assumed per-image fetch overhead.
const IMAGE_FETCH_MS: u64 = 40;

/// Size and resource snapshot of a markup or HTML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub byte_size: usize,
    pub css_rule_count: usize,
    pub image_count: usize,
    pub estimated_load_time_ms: u64,
    /// Wall-clock time spent in the pipeline, used as a CPU proxy.
    pub cpu_time_ms: u64,
    pub generation_duration_ms: u64,
}

impl PerformanceMetrics {
    /// Measures a document. Timing fields are left at zero.
    pub fn measure(document: &str) -> Self {
        let byte_size = document.len();
        let image_count = IMAGE_TAG_REGEX.find_iter(document).count();
        let css_rule_count = STYLE_BLOCK_REGEX
            .captures_iter(document)
            .map(|c| count_css_rules(&c[1]))
            .sum();
        let estimated_load_time_ms =
            (byte_size / BYTES_PER_MS) as u64 + image_count as u64 * IMAGE_FETCH_MS;

        Self {
            byte_size,
            css_rule_count,
            image_count,
            estimated_load_time_ms,
            cpu_time_ms: 0,
            generation_duration_ms: 0,
        }
    }

    pub fn with_timing(mut self, duration_ms: u64) -> Self {
        self.cpu_time_ms = duration_ms;
        self.generation_duration_ms = duration_ms;
        self
    }
}

/// Counts leaf rule blocks (`selector { ... }`), skipping at-rule wrappers.
fn count_css_rules(css: &str) -> usize {
    let mut count = 0;
    let mut depth = 0usize;
    let mut saw_nested = Vec::new();
    for ch in css.chars() {
        match ch {
            '{' => {
                if let Some(last) = saw_nested.last_mut() {
                    *last = true;
                }
                saw_nested.push(false);
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if let Some(false) = saw_nested.pop() {
                    count += 1;
                }
            }
            _ => {}
        }
    }
    count
}

/// Output of the compile step: the intermediate markup and what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub id: Uuid,
    pub markup: String,
    pub layout_type: LayoutType,
    pub section_count: usize,
    pub asset_usage_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    metrics: OnceLock<PerformanceMetrics>,
}

impl CompiledTemplate {
    pub fn new(
        markup: String,
        layout_type: LayoutType,
        section_count: usize,
        asset_usage_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            markup,
            layout_type,
            section_count,
            asset_usage_count,
            created_at: Utc::now(),
            metrics: OnceLock::new(),
        }
    }

    /// Metrics of the markup, computed on first access.
    pub fn performance_metrics(&self) -> &PerformanceMetrics {
        self.metrics.get_or_init(|| PerformanceMetrics::measure(&self.markup))
    }
}

/// Final client-safe HTML plus render bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedEmail {
    /// Id of the [`CompiledTemplate`] this email was rendered from.
    pub template_id: Uuid,
    pub html: String,
    pub css: String,
    pub byte_size: usize,
    pub render_duration_ms: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub dark_mode: bool,
}

/// Compression policy of the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    None,
    #[default]
    Standard,
    Aggressive,
}

impl CompressionLevel {
    /// Next stronger level, if any.
    pub fn escalate(&self) -> Option<CompressionLevel> {
        match self {
            CompressionLevel::None => Some(CompressionLevel::Standard),
            CompressionLevel::Standard => Some(CompressionLevel::Aggressive),
            CompressionLevel::Aggressive => None,
        }
    }
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionLevel::None => write!(f, "none"),
            CompressionLevel::Standard => write!(f, "standard"),
            CompressionLevel::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionLevel::None),
            "standard" => Ok(CompressionLevel::Standard),
            "aggressive" => Ok(CompressionLevel::Aggressive),
            other => Err(format!("unknown compression level '{}'", other)),
        }
    }
}

fn default_max_size_kb() -> usize {
    100
}

/// Size and compression targets for the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformanceTargets {
    #[serde(default)]
    pub compression_level: CompressionLevel,
    /// Ceiling on the total HTML size, in KiB.
    #[serde(default = "default_max_size_kb", alias = "max_image_size")]
    pub max_size_kb: usize,
}

impl PerformanceTargets {
    pub fn max_bytes(&self) -> usize {
        self.max_size_kb * 1024
    }
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::default(),
            max_size_kb: default_max_size_kb(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub target_clients: Vec<EmailClient>,
    #[serde(default = "default_true")]
    pub render_html: bool,
    /// Cache TTL in seconds. Only affects expiry, never the cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_time_secs: Option<u64>,
    #[serde(default)]
    pub performance: PerformanceTargets,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            target_clients: Vec::new(),
            render_html: true,
            cache_time_secs: None,
            performance: PerformanceTargets::default(),
            validate: true,
            use_cache: true,
        }
    }
}

impl GenerationOptions {
    /// Target clients sorted and de-duplicated.
    pub fn normalized_targets(&self) -> Vec<EmailClient> {
        let mut targets = self.target_clients.clone();
        targets.sort();
        targets.dedup();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_css_rules_skips_media_wrapper() {
        let css = "p{color:red} @media (max-width:480px){ .a{x:1} .b{y:2} } h1{z:3}";
        assert_eq!(count_css_rules(css), 4);
    }

    #[test]
    fn test_measure_counts_images_and_rules() {
        let html = r#"<html><head><style>p{color:red}a{color:blue}</style></head>
            <body><img src="a.png"><IMG src="b.png"></body></html>"#;
        let metrics = PerformanceMetrics::measure(html);
        assert_eq!(metrics.image_count, 2);
        assert_eq!(metrics.css_rule_count, 2);
        assert_eq!(metrics.byte_size, html.len());
        assert!(metrics.estimated_load_time_ms >= 80);
    }

    #[test]
    fn test_compiled_template_metrics_are_lazy_and_stable() {
        let template = CompiledTemplate::new(
            "<mjml><mj-body><mj-image src=\"x\"/></mj-body></mjml>".to_string(),
            LayoutType::Minimal,
            1,
            1,
        );
        let first = template.performance_metrics().clone();
        assert_eq!(first.image_count, 1);
        assert_eq!(template.performance_metrics(), &first);
    }

    #[test]
    fn test_compression_escalation() {
        assert_eq!(CompressionLevel::None.escalate(), Some(CompressionLevel::Standard));
        assert_eq!(
            CompressionLevel::Standard.escalate(),
            Some(CompressionLevel::Aggressive)
        );
        assert_eq!(CompressionLevel::Aggressive.escalate(), None);
    }

    #[test]
    fn test_performance_targets_accept_legacy_field_name() {
        let targets: PerformanceTargets =
            serde_json::from_str(r#"{"compression_level":"aggressive","max_image_size":50}"#)
                .unwrap();
        assert_eq!(targets.compression_level, CompressionLevel::Aggressive);
        assert_eq!(targets.max_bytes(), 51_200);
    }

    #[test]
    fn test_normalized_targets() {
        let options = GenerationOptions {
            target_clients: vec![EmailClient::Yahoo, EmailClient::Gmail, EmailClient::Yahoo],
            ..GenerationOptions::default()
        };
        assert_eq!(
            options.normalized_targets(),
            vec![EmailClient::Gmail, EmailClient::Yahoo]
        );
    }
}
