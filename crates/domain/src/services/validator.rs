//! Validation and scoring of markup and compiled HTML.
//!
//! Both entry points are pure functions over their input. Every check pushes
//! independent findings; the score is derived from the findings by
//! [`ValidationResult::scored`].

use serde::Serialize;
use shared::validation::normalize_hex_color;

use crate::models::{
    DarkModeMethod, EmailClient, IssueCategory, ScoreWeights, Severity, UnsupportedCss,
    ValidationError, ValidationResult, ValidationWarning,
};

use super::compiler::{is_section, LIST_TAGS};
use super::dark_mode::{dark_mode_coverage, extract_dark_map};
use super::markup::{Element, MarkupDocument};

lazy_static::lazy_static! {
    static ref DOCTYPE_REGEX: regex::Regex =
        regex::Regex::new(r#"(?is)^\s*<!DOCTYPE\s+html\s+PUBLIC\s+"-//W3C//DTD XHTML 1\.0 Transitional//EN""#).unwrap();
    static ref TABLE_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<table\b").unwrap();
    static ref HTML5_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<(article|section|nav|header|footer|aside|main|figure|figcaption)\b").unwrap();
    static ref STYLESHEET_LINK_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)<link\b[^>]*rel\s*=\s*["']?stylesheet"#).unwrap();
    static ref TITLE_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap();
    static ref LINK_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)<a\b[^>]*\shref\s*=\s*"[^"]+""#).unwrap();
    static ref IMG_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<img\b[^>]*>").unwrap();
    static ref ALT_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)\salt\s*=").unwrap();
    static ref SRC_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\ssrc\s*=\s*"([^"]*)""#).unwrap();
    static ref H1_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<h1\b").unwrap();
    static ref STYLE_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sstyle\s*=\s*"([^"]*)""#).unwrap();
    static ref TEXT_COLOR_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)(?:^|[;\s])color\s*:\s*(#[0-9a-f]{3,6})\b").unwrap();
    static ref BG_COLOR_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)background-color\s*:\s*(#[0-9a-f]{3,6})\b").unwrap();
    static ref TABLE_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<table\b[^>]*>").unwrap();
    static ref STYLE_TAG_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<style\b[^>]*>(.*?)</style>").unwrap();
    static ref ELEMENT_REGEX: regex::Regex =
        regex::Regex::new(r"<[a-zA-Z]").unwrap();
    static ref RICH_ELEMENT_REGEX: regex::Regex =
        regex::Regex::new(r"<(video|audio|picture|source|form|input|button|iframe|svg)\b").unwrap();
    static ref IMG_WIDTH_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)<img\b[^>]*\swidth\s*=\s*"?(\d+)"#).unwrap();
}

/// Size after which a template is considered heavy.
pub const MAX_RECOMMENDED_BYTES: usize = 100 * 1024;

/// Element count after which markup is considered complex.
pub const MAX_RECOMMENDED_ELEMENTS: usize = 50;

/// Markup elements the pipeline understands.
const KNOWN_MARKUP_TAGS: &[&str] = &[
    "mjml", "mj-head", "mj-body", "mj-title", "mj-preview", "mj-attributes", "mj-all",
    "mj-class", "mj-style", "mj-font", "mj-breakpoint", "mj-section", "mj-column", "mj-group",
    "mj-wrapper", "mj-hero", "mj-text", "mj-image", "mj-button", "mj-divider", "mj-spacer",
    "mj-table", "mj-raw", "mj-social", "mj-social-element", "mj-navbar", "mj-navbar-link",
    "mj-carousel", "mj-carousel-image", "mj-accordion", "mj-accordion-element",
    "mj-accordion-title", "mj-accordion-text",
];

fn error(code: &str, severity: Severity, message: impl Into<String>) -> ValidationError {
    ValidationError {
        code: code.to_string(),
        message: message.into(),
        severity,
        category: IssueCategory::Structural,
        location: None,
        fix: None,
    }
}

fn warning(code: &str, category: IssueCategory, message: impl Into<String>) -> ValidationWarning {
    ValidationWarning {
        code: code.to_string(),
        message: message.into(),
        category,
        location: None,
        recommendation: None,
    }
}

trait WithHints: Sized {
    fn at(self, location: impl Into<String>) -> Self;
    fn hint(self, text: impl Into<String>) -> Self;
}

impl WithHints for ValidationError {
    fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn hint(mut self, text: impl Into<String>) -> Self {
        self.fix = Some(text.into());
        self
    }
}

impl WithHints for ValidationWarning {
    fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn hint(mut self, text: impl Into<String>) -> Self {
        self.recommendation = Some(text.into());
        self
    }
}

// ============================================================================
// Markup validation
// ============================================================================

/// Validates intermediate markup.
pub fn validate_markup(markup: &str, targets: &[EmailClient]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let doc = match MarkupDocument::parse(markup) {
        Ok(doc) => doc,
        Err(e) => {
            errors.push(
                error("MARKUP_PARSE_ERROR", Severity::Critical, e.to_string())
                    .hint("Close every opened element"),
            );
            return ValidationResult::scored(errors, warnings, ScoreWeights::MARKUP);
        }
    };

    let Some(root) = doc.root() else {
        errors.push(
            error("MISSING_ROOT", Severity::Critical, "Missing <mjml> root element")
                .hint("Wrap the template in <mjml>...</mjml>"),
        );
        return ValidationResult::scored(errors, warnings, ScoreWeights::MARKUP);
    };

    let head = root.child("mj-head");
    if head.is_none() {
        errors.push(
            error("MISSING_HEAD", Severity::High, "Missing <mj-head> element")
                .hint("Add an <mj-head> with title and preview text"),
        );
    }
    let body = root.child("mj-body");
    match body {
        None => errors.push(
            error("MISSING_BODY", Severity::Critical, "Missing <mj-body> element")
                .hint("Add an <mj-body> containing the sections"),
        ),
        Some(body) => check_markup_body(body, &mut errors, &mut warnings),
    }

    check_markup_content(head, body, &mut warnings);

    if markup.len() > MAX_RECOMMENDED_BYTES {
        warnings.push(
            warning(
                "LARGE_TEMPLATE",
                IssueCategory::Performance,
                format!("Markup is {} bytes, above the {} byte recommendation", markup.len(), MAX_RECOMMENDED_BYTES),
            )
            .hint("Reduce sections or move copy to a landing page"),
        );
    }
    let element_count = body.map(|b| b.descendants().len()).unwrap_or(0);
    if element_count > MAX_RECOMMENDED_ELEMENTS {
        warnings.push(
            warning(
                "HIGH_COMPLEXITY",
                IssueCategory::Performance,
                format!("Body has {} elements (high complexity)", element_count),
            )
            .hint("Simplify the layout to improve rendering speed"),
        );
    }

    warnings.extend(client_warnings(markup, targets));

    ValidationResult::scored(errors, warnings, ScoreWeights::MARKUP)
}

fn check_markup_body(
    body: &Element,
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let sections: Vec<&Element> = body
        .descendants()
        .into_iter()
        .filter(|el| is_section(el))
        .collect();
    if sections.is_empty() {
        errors.push(
            error("NO_SECTIONS", Severity::High, "<mj-body> contains no sections")
                .hint("Add at least one <mj-section>"),
        );
    }
    for (i, section) in sections.iter().enumerate() {
        if section.descendants().iter().any(|d| is_section(d)) {
            errors.push(
                error("NESTED_SECTION", Severity::High, "Section nested inside another section")
                    .at(format!("{}[{}]", section.tag, i))
                    .hint("Split the outer section around the inner one"),
            );
        }
    }

    for (i, el) in body.descendants().into_iter().enumerate() {
        let tag = el.tag.to_ascii_lowercase();
        if LIST_TAGS.contains(&tag.as_str()) || !KNOWN_MARKUP_TAGS.contains(&tag.as_str()) {
            warnings.push(
                warning(
                    "DISALLOWED_ELEMENT",
                    IssueCategory::Structural,
                    format!("<{}> is not supported in email markup", el.tag),
                )
                .at(format!("element[{}]", i))
                .hint("Use mj-text with inline HTML instead"),
            );
            continue;
        }
        match tag.as_str() {
            "mj-image" => {
                if el.attr("src").map_or(true, |s| s.trim().is_empty()) {
                    warnings.push(
                        warning("MISSING_IMAGE_SRC", IssueCategory::Structural, "Image without src")
                            .at(format!("mj-image[{}]", i)),
                    );
                }
                if el.attr("alt").is_none() {
                    warnings.push(
                        warning("MISSING_ALT_TEXT", IssueCategory::Accessibility, "Image without alt text")
                            .at(format!("mj-image[{}]", i))
                            .hint("Describe the image, or use alt=\"\" for decoration"),
                    );
                }
            }
            "mj-button" => {
                if el.attr("href").map_or(true, |s| s.trim().is_empty()) {
                    warnings.push(
                        warning("MISSING_BUTTON_HREF", IssueCategory::Structural, "Button without href")
                            .at(format!("mj-button[{}]", i)),
                    );
                }
            }
            _ => {}
        }
    }
}

fn check_markup_content(
    head: Option<&Element>,
    body: Option<&Element>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let has_text = |tag: &str| {
        head.and_then(|h| h.child(tag))
            .map(|el| !el.text().trim().is_empty())
            .unwrap_or(false)
    };
    if !has_text("mj-title") {
        warnings.push(
            warning("MISSING_TITLE", IssueCategory::Content, "No <mj-title>")
                .hint("Set the title to the email subject"),
        );
    }
    if !has_text("mj-preview") {
        warnings.push(
            warning("MISSING_PREVIEW", IssueCategory::Content, "No preview text")
                .hint("Add <mj-preview> to control the inbox snippet"),
        );
    }

    let elements = body.map(|b| b.descendants()).unwrap_or_default();
    if !elements.iter().any(|el| el.is("mj-button")) {
        warnings.push(
            warning("NO_CTA", IssueCategory::Content, "No call-to-action button")
                .hint("Add an <mj-button> linking to the campaign target"),
        );
    }
    let has_image = elements.iter().any(|el| {
        el.is("mj-image") || (el.is("mj-hero") && el.attr("background-url").is_some())
    });
    if !has_image {
        warnings.push(warning("NO_IMAGES", IssueCategory::Content, "Template has no images"));
    }
}

// ============================================================================
// HTML validation
// ============================================================================

/// Validates compiled email HTML.
pub fn validate_html(html: &str, targets: &[EmailClient]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !DOCTYPE_REGEX.is_match(html) {
        errors.push(
            error(
                "MISSING_DOCTYPE",
                Severity::High,
                "Missing XHTML 1.0 Transitional DOCTYPE",
            )
            .at("document")
            .hint("Start the document with the XHTML 1.0 Transitional DOCTYPE"),
        );
    }
    if !TABLE_REGEX.is_match(html) {
        errors.push(
            error("NO_TABLE_LAYOUT", Severity::High, "Layout does not use tables")
                .hint("Use role=\"presentation\" tables for layout; flex and grid are not acceptable"),
        );
    }
    for m in HTML5_REGEX.captures_iter(html) {
        errors.push(
            error(
                "HTML5_ELEMENT",
                Severity::Medium,
                format!("<{}> is not supported by email clients", &m[1]),
            )
            .at(m[1].to_ascii_lowercase())
            .hint("Replace with a table cell or div"),
        );
    }
    if STYLESHEET_LINK_REGEX.is_match(html) {
        warnings.push(
            warning(
                "EXTERNAL_STYLESHEET",
                IssueCategory::Compatibility,
                "External stylesheet links are dropped by most clients",
            )
            .hint("Inline the styles or embed them in <style>"),
        );
    }

    check_html_content(html, &mut warnings);

    if html.len() > MAX_RECOMMENDED_BYTES {
        warnings.push(
            warning(
                "LARGE_TEMPLATE",
                IssueCategory::Performance,
                format!("HTML is {} bytes, above the {} byte recommendation", html.len(), MAX_RECOMMENDED_BYTES),
            )
            .hint("Raise the compression level or trim content"),
        );
    }

    check_accessibility(html, &mut warnings);
    warnings.extend(client_warnings(html, targets));

    ValidationResult::scored(errors, warnings, ScoreWeights::HTML)
}

fn check_html_content(html: &str, warnings: &mut Vec<ValidationWarning>) {
    let has_title = TITLE_REGEX
        .captures(html)
        .map(|c| !c[1].trim().is_empty())
        .unwrap_or(false);
    if !has_title {
        warnings.push(warning("MISSING_TITLE", IssueCategory::Content, "No <title>"));
    }
    if !LINK_REGEX.is_match(html) {
        warnings.push(warning("NO_CTA", IssueCategory::Content, "No link or call-to-action"));
    }
    if !IMG_REGEX.is_match(html) {
        warnings.push(warning("NO_IMAGES", IssueCategory::Content, "Template has no images"));
    }
}

fn check_accessibility(html: &str, warnings: &mut Vec<ValidationWarning>) {
    if !H1_REGEX.is_match(html) {
        warnings.push(
            warning("MISSING_H1", IssueCategory::Accessibility, "No <h1> heading")
                .hint("Give the email one top-level heading for screen readers"),
        );
    }

    for (i, img) in IMG_REGEX.find_iter(html).enumerate() {
        let tag = img.as_str();
        if !ALT_ATTR_REGEX.is_match(tag) {
            let location = SRC_ATTR_REGEX
                .captures(tag)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| format!("img[{}]", i));
            warnings.push(
                warning("MISSING_ALT_TEXT", IssueCategory::Accessibility, "Image without alt text")
                    .at(location)
                    .hint("Describe the image, or use alt=\"\" for decoration"),
            );
        }
    }

    for style in STYLE_ATTR_REGEX.captures_iter(html) {
        let style = &style[1];
        let text = TEXT_COLOR_REGEX.captures(style).map(|c| normalize_hex_color(&c[1]));
        let background = BG_COLOR_REGEX.captures(style).map(|c| normalize_hex_color(&c[1]));
        if let (Some(text), Some(background)) = (text, background) {
            if text == background {
                warnings.push(
                    warning(
                        "SAME_COLOR_TEXT",
                        IssueCategory::Accessibility,
                        format!("Text color {} equals its background", text),
                    )
                    .hint("Pick a text color with sufficient contrast"),
                );
            }
        }
    }

    for table in TABLE_OPEN_REGEX.find_iter(html) {
        if table.as_str().contains("role=\"presentation\"") {
            continue;
        }
        let rest = &html[table.end()..];
        let content = &rest[..rest.find("</table").unwrap_or(rest.len())];
        if !content.to_ascii_lowercase().contains("<th") {
            warnings.push(
                warning(
                    "DATA_TABLE_WITHOUT_HEADERS",
                    IssueCategory::Accessibility,
                    "Data table has no header cells",
                )
                .hint("Add <th> cells, or role=\"presentation\" for layout tables"),
            );
        }
    }

    let dark_map = extract_dark_map(html);
    if !dark_map.is_empty() {
        let coverage = dark_mode_coverage(html, &dark_map);
        if !coverage.unmatched.is_empty() {
            warnings.push(
                warning(
                    "DARK_MODE_SELECTOR_MISMATCH",
                    IssueCategory::Compatibility,
                    format!(
                        "{} inline color declaration(s) will not match the dark-mode selectors",
                        coverage.unmatched.len()
                    ),
                )
                .at(coverage.unmatched.join(", "))
                .hint("Write inline colors as 'property: #rrggbb' in lower case"),
            );
        }
    }
}

// ============================================================================
// Per-client compatibility
// ============================================================================

/// Whether `lower` (an already lower-cased document) declares `css`.
fn declares(lower: &str, css: &UnsupportedCss) -> bool {
    lower.match_indices(css.property).any(|(at, _)| {
        let at_boundary = lower[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '-'));
        let Some(value) = lower[at + css.property.len()..].trim_start().strip_prefix(':') else {
            return false;
        };
        let value = value.trim_start();
        at_boundary
            && css.value.map_or(true, |expected| {
                value.strip_prefix("inline-").unwrap_or(value).starts_with(expected)
            })
    })
}

fn has_unguarded_style(html: &str) -> bool {
    STYLE_TAG_REGEX
        .captures_iter(html)
        .any(|c| !c[1].trim().is_empty() && !c[1].contains("@media"))
}

fn client_code(client: EmailClient, suffix: &str) -> String {
    format!("{}_{}", client.to_string().to_ascii_uppercase(), suffix)
}

/// Compatibility findings for a single client, read from its [`ClientRules`].
///
/// [`ClientRules`]: crate::models::ClientRules
pub fn client_issues(document: &str, client: EmailClient) -> Vec<ValidationWarning> {
    let rules = client.rules();
    let lower = document.to_ascii_lowercase();

    let mut issues: Vec<ValidationWarning> = rules
        .unsupported_css
        .iter()
        .filter(|css| declares(&lower, css))
        .map(|css| warning(css.code, IssueCategory::Compatibility, css.message).at(rules.display_name))
        .collect();

    let mut unsupported: Vec<&str> = RICH_ELEMENT_REGEX
        .captures_iter(&lower)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|tag| !rules.supports_element(tag))
        .collect();
    unsupported.sort_unstable();
    unsupported.dedup();
    if !unsupported.is_empty() {
        issues.push(
            warning(
                &client_code(client, "MEDIA_ELEMENT"),
                IssueCategory::Compatibility,
                format!("{} cannot render <{}>", rules.display_name, unsupported.join(">, <")),
            )
            .at(rules.display_name)
            .hint("Link to the media with a static image instead"),
        );
    }

    let too_wide = IMG_WIDTH_REGEX
        .captures_iter(document)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|width| *width > rules.max_image_width_px)
        .count();
    if too_wide > 0 {
        issues.push(
            warning(
                &client_code(client, "IMAGE_TOO_WIDE"),
                IssueCategory::Compatibility,
                format!(
                    "{} image(s) wider than the {}px {} allows",
                    too_wide, rules.max_image_width_px, rules.display_name
                ),
            )
            .at(rules.display_name)
            .hint("Resize images to the content width"),
        );
    }

    if rules.requires_guarded_styles && has_unguarded_style(document) {
        issues.push(
            warning(
                &client_code(client, "UNGUARDED_STYLE"),
                IssueCategory::Compatibility,
                format!(
                    "Style block without media queries; {} may strip it",
                    rules.display_name
                ),
            )
            .at(rules.display_name),
        );
    }

    if !rules.honors_dark_media_query() && lower.contains("prefers-color-scheme") {
        issues.push(
            warning(
                &client_code(client, "DARK_MODE_IGNORED"),
                IssueCategory::Compatibility,
                format!(
                    "{} ignores prefers-color-scheme and applies its own color inversion",
                    rules.display_name
                ),
            )
            .at(rules.display_name)
            .hint("Pick colors that stay readable when inverted"),
        );
    }

    if let Some(limit) = rules.max_html_bytes {
        if document.len() > limit {
            issues.push(
                warning(
                    &client_code(client, "SIZE_LIMIT"),
                    IssueCategory::Compatibility,
                    format!(
                        "{} clips messages over {} bytes (document is {})",
                        rules.display_name,
                        limit,
                        document.len()
                    ),
                )
                .at(rules.display_name)
                .hint("Reduce the HTML size"),
            );
        }
    }
    issues
}

fn client_warnings(document: &str, targets: &[EmailClient]) -> Vec<ValidationWarning> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for client in targets {
        if seen.contains(client) {
            continue;
        }
        seen.push(*client);
        out.extend(client_issues(document, *client));
    }
    out
}

/// Per-client view used by compatibility reports.
#[derive(Debug, Clone, Serialize)]
pub struct ClientCompatibility {
    pub client: EmailClient,
    pub display_name: &'static str,
    pub score: u8,
    pub dark_mode: DarkModeMethod,
    pub supported_css: Vec<&'static str>,
    pub issues: Vec<ValidationWarning>,
    pub workarounds: Vec<&'static str>,
}

pub fn client_compatibility(html: &str, client: EmailClient) -> ClientCompatibility {
    let rules = client.rules();
    let issues = client_issues(html, client);
    let score = ValidationResult::scored(Vec::new(), issues.clone(), ScoreWeights::HTML).score;
    ClientCompatibility {
        client,
        display_name: rules.display_name,
        score,
        dark_mode: rules.dark_mode,
        supported_css: rules.supported_css.to_vec(),
        issues,
        workarounds: rules.workarounds.to_vec(),
    }
}
