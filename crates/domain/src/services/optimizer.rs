//! HTML size optimizer.
//!
//! Compression is table-driven by [`CompressionLevel`]. When the result is still
//! over the size ceiling a reduction pass escalates the level and then strips
//! comments and `data-*` attributes; if that is not enough the outcome is
//! flagged so the caller can raise a validation error.

use serde::Serialize;
use tracing::debug;

use crate::models::{CompressionLevel, PerformanceTargets};

use super::builtin_compiler::XHTML_DOCTYPE;
use super::css_inliner::{format_declarations, parse_declarations};

lazy_static::lazy_static! {
    static ref COMMENT_REGEX: regex::Regex =
        regex::Regex::new(r"(?s)<!--(.*?)-->").unwrap();
    static ref CSS_COMMENT_REGEX: regex::Regex =
        regex::Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref BETWEEN_TAGS_REGEX: regex::Regex =
        regex::Regex::new(r">\s+<").unwrap();
    static ref WHITESPACE_RUN_REGEX: regex::Regex =
        regex::Regex::new(r"\s{2,}").unwrap();
    static ref PROTECTED_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<script\b.*?</script\s*>|<pre\b.*?</pre\s*>|<textarea\b.*?</textarea\s*>").unwrap();
    static ref STYLE_BLOCK_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style\s*>)").unwrap();
    static ref SCRIPT_BLOCK_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)(<script\b[^>]*>)(.*?)(</script\s*>)").unwrap();
    static ref OPTIONAL_TYPE_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\s+type\s*=\s*"text/(?:css|javascript)""#).unwrap();
    static ref EMPTY_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\s+(?:class|style)\s*=\s*"\s*""#).unwrap();
    static ref STYLE_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sstyle\s*=\s*"([^"]*)""#).unwrap();
    static ref DATA_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\s+data-[\w-]+\s*=\s*(?:"[^"]*"|'[^']*')"#).unwrap();
    static ref DOCTYPE_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)^\s*<!DOCTYPE[^>]*>").unwrap();
}

pub const SHORT_DOCTYPE: &str = "<!DOCTYPE html>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizeOutcome {
    pub html: String,
    pub original_size: usize,
    pub optimized_size: usize,
    /// Still over the ceiling after every reduction pass.
    pub ceiling_exceeded: bool,
    /// Names of the passes that ran, in order.
    pub passes: Vec<String>,
}

impl OptimizeOutcome {
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size.saturating_sub(self.optimized_size)) as f64 * 100.0
            / self.original_size as f64
    }
}

/// Compresses `html` at `level`.
pub fn compress(html: &str, level: CompressionLevel) -> String {
    compress_with(html, level, true)
}

fn compress_with(html: &str, level: CompressionLevel, short_doctype: bool) -> String {
    match level {
        CompressionLevel::None => html.to_string(),
        CompressionLevel::Standard => standard(html),
        CompressionLevel::Aggressive => {
            let mut out = standard(html);
            out = OPTIONAL_TYPE_REGEX.replace_all(&out, "").into_owned();
            out = canonicalize_inline_styles(&out);
            out = EMPTY_ATTR_REGEX.replace_all(&out, "").into_owned();
            out = minify_scripts(&out);
            if short_doctype {
                out = DOCTYPE_REGEX.replace(&out, SHORT_DOCTYPE).into_owned();
            }
            out
        }
    }
}

fn standard(html: &str) -> String {
    let out = strip_comments(html);
    let out = map_unprotected(&out, |part| {
        let part = BETWEEN_TAGS_REGEX.replace_all(part, "><");
        WHITESPACE_RUN_REGEX.replace_all(&part, " ").into_owned()
    });
    STYLE_BLOCK_REGEX
        .replace_all(&out, |c: &regex::Captures| {
            format!("{}{}{}", &c[1], minify_css(&c[2]), &c[3])
        })
        .into_owned()
}

/// Runs the size ceiling policy on top of [`compress`]. Every pass keeps the
/// XHTML email doctype, including `aggressive`.
pub fn optimize(html: &str, targets: &PerformanceTargets) -> OptimizeOutcome {
    let original_size = html.len();
    let max_bytes = targets.max_bytes();
    let mut level = targets.compression_level;
    let mut passes = vec![level.to_string()];
    let mut out = compress_with(html, level, false);

    if out.len() > max_bytes {
        while out.len() > max_bytes {
            let Some(next) = level.escalate() else { break };
            level = next;
            out = compress_with(&out, level, false);
            passes.push(format!("escalate:{}", level));
        }
        if out.len() > max_bytes {
            out = strip_data_attributes(&strip_comments(&out));
            passes.push("strip".to_string());
        }
        debug!(
            original_size,
            optimized_size = out.len(),
            max_bytes,
            passes = ?passes,
            "Ran size reduction"
        );
    }

    let optimized_size = out.len();
    OptimizeOutcome {
        html: out,
        original_size,
        optimized_size,
        ceiling_exceeded: optimized_size > max_bytes,
        passes,
    }
}

/// True for comment bodies that belong to Outlook conditional comments.
fn is_conditional(body: &str) -> bool {
    let body = body.trim_start();
    body.starts_with("[if") || body.starts_with("<![endif]") || body.starts_with("[endif]")
}

/// Removes comments, keeping MSO conditional comments.
pub fn strip_comments(html: &str) -> String {
    COMMENT_REGEX
        .replace_all(html, |c: &regex::Captures| {
            if is_conditional(&c[1]) {
                c[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

pub fn strip_data_attributes(html: &str) -> String {
    DATA_ATTR_REGEX.replace_all(html, "").into_owned()
}

/// Applies `f` to every part of `html` outside `<script>`, `<pre>` and `<textarea>`.
fn map_unprotected<F>(html: &str, f: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in PROTECTED_REGEX.find_iter(html) {
        out.push_str(&f(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&html[last..]));
    out
}

/// Minifies CSS, leaving quoted strings untouched.
pub fn minify_css(css: &str) -> String {
    let css = CSS_COMMENT_REGEX.replace_all(css, "");
    let mut out = String::with_capacity(css.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for ch in css.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            c if c.is_whitespace() => pending_space = true,
            '{' | '}' | ';' | ':' | ',' => {
                if ch == '}' && out.ends_with(';') {
                    out.pop();
                }
                out.push(ch);
                pending_space = false;
            }
            _ => {
                let after_punct = matches!(out.chars().last(), None | Some('{' | '}' | ';' | ':' | ','));
                if pending_space && !after_punct {
                    out.push(' ');
                }
                pending_space = false;
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

fn canonicalize_inline_styles(html: &str) -> String {
    STYLE_ATTR_REGEX
        .replace_all(html, |c: &regex::Captures| {
            let declarations = parse_declarations(&c[1]);
            format!(" style=\"{}\"", format_declarations(&declarations))
        })
        .into_owned()
}

fn minify_scripts(html: &str) -> String {
    SCRIPT_BLOCK_REGEX
        .replace_all(html, |c: &regex::Captures| {
            let body: Vec<&str> = c[2]
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with("//"))
                .collect();
            format!("{}{}{}", &c[1], body.join("\n"), &c[3])
        })
        .into_owned()
}

/// True when the document still declares the XHTML email doctype.
pub fn has_email_doctype(html: &str) -> bool {
    html.trim_start().starts_with(XHTML_DOCTYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(
            "{}\n<html>\n  <head>\n    <style type=\"text/css\">\n      p {{ color : red ; }}\n      [style*=\"color: #ffffff\"] {{ color: #1a1a1a !important; }}\n    </style>\n  </head>\n  <body>\n    <!-- note -->\n    <!--[if mso]><table><tr><td><![endif]-->\n    {}\n    <!--[if mso]></td></tr></table><![endif]-->\n  </body>\n</html>",
            XHTML_DOCTYPE, body
        )
    }

    fn targets(level: CompressionLevel, max_size_kb: usize) -> PerformanceTargets {
        PerformanceTargets {
            compression_level: level,
            max_size_kb,
        }
    }

    #[test]
    fn test_none_is_noop() {
        let html = doc("<p>x</p>");
        assert_eq!(compress(&html, CompressionLevel::None), html);
    }

    #[test]
    fn test_standard_removes_comments_but_keeps_mso() {
        let out = compress(&doc("<p>x</p>"), CompressionLevel::Standard);
        assert!(!out.contains("note"));
        assert!(out.contains("<!--[if mso]><table><tr><td><![endif]-->"));
        assert!(out.contains("<!--[if mso]></td></tr></table><![endif]-->"));
        assert!(!out.contains(">\n"));
        assert!(has_email_doctype(&out));
    }

    #[test]
    fn test_standard_minifies_css_but_not_selector_strings() {
        let out = compress(&doc("<p>x</p>"), CompressionLevel::Standard);
        assert!(out.contains("p{color:red}"));
        assert!(out.contains("[style*=\"color: #ffffff\"]{color:#1a1a1a !important}"));
    }

    #[test]
    fn test_keeps_if_not_mso_wrapper() {
        let html = "<head><!--[if !mso]><!--><meta x=\"1\" /><!--<![endif]--></head>";
        assert_eq!(strip_comments(html), html);
    }

    #[test]
    fn test_aggressive_strips_optional_attributes() {
        let out = compress(
            &doc("<p class=\"\" style=\"color:#333333;margin:0\">x</p><script type=\"text/javascript\">\n// c\nvar a = 1;\n</script>"),
            CompressionLevel::Aggressive,
        );
        assert!(out.starts_with(SHORT_DOCTYPE));
        assert!(!out.contains("type=\"text/css\""));
        assert!(!out.contains("type=\"text/javascript\""));
        assert!(out.contains("<p style=\"color: #333333; margin: 0;\">x</p>"));
        assert!(out.contains("<script>var a = 1;</script>"));
    }

    #[test]
    fn test_optimize_aggressive_keeps_email_doctype() {
        let outcome = optimize(&doc("<p>x</p>"), &targets(CompressionLevel::Aggressive, 100));
        assert_eq!(outcome.passes, vec!["aggressive".to_string()]);
        assert!(outcome.html.starts_with(XHTML_DOCTYPE));
        assert!(!outcome.html.starts_with(SHORT_DOCTYPE));
    }

    #[test]
    fn test_within_ceiling_runs_single_pass() {
        let outcome = optimize(&doc("<p>x</p>"), &targets(CompressionLevel::Standard, 100));
        assert!(!outcome.ceiling_exceeded);
        assert_eq!(outcome.passes, vec!["standard".to_string()]);
        assert!(outcome.optimized_size < outcome.original_size);
        assert!(outcome.savings_percent() > 0.0);
    }

    #[test]
    fn test_reduction_pass_strips_data_attributes_and_keeps_doctype() {
        let payload = "z".repeat(2048);
        let html = doc(&format!("<p data-track=\"{}\">x</p>", payload));
        let outcome = optimize(&html, &targets(CompressionLevel::Standard, 1));
        assert!(!outcome.ceiling_exceeded, "{}", outcome.optimized_size);
        assert_eq!(
            outcome.passes,
            vec!["standard".to_string(), "escalate:aggressive".to_string(), "strip".to_string()]
        );
        assert!(!outcome.html.contains("data-track"));
        assert!(has_email_doctype(&outcome.html));
    }

    #[test]
    fn test_ceiling_exceeded_is_reported() {
        let html = doc(&format!("<p>{}</p>", "word ".repeat(600)));
        let outcome = optimize(&html, &targets(CompressionLevel::Aggressive, 1));
        assert!(outcome.ceiling_exceeded);
        assert_eq!(outcome.passes, vec!["aggressive".to_string(), "strip".to_string()]);
    }
}
