//! Dark-mode stylesheet injection.
//!
//! Overrides are attribute selectors against inline styles
//! (`[style*="color: #ffffff"]`), so they only fire when the inline
//! declaration is written exactly as `property: value`. [`dark_mode_coverage`]
//! reports inline colors the selectors will miss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::validation::normalize_hex_color;

use crate::models::DesignRequirements;

lazy_static::lazy_static! {
    static ref HEAD_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<head\b[^>]*>").unwrap();
    static ref HEAD_CLOSE_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)</head\s*>").unwrap();
    static ref STYLE_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sstyle\s*=\s*"([^"]*)""#).unwrap();
    static ref COLOR_DECL_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)(background-color|(?:^|[^-a-z])color)\s*:\s*(#[0-9a-f]{3,6})\b").unwrap();
    static ref DARK_SELECTOR_REGEX: regex::Regex =
        regex::Regex::new(r#"\[style\*="(?:background-)?color: (#[0-9a-fA-F]{3,6})"\]\s*\{\s*(?:background-)?color:\s*(#[0-9a-fA-F]{3,6})"#).unwrap();
}

pub const DARK_STYLE_ID: &str = "dark-mode";

pub const COLOR_SCHEME_META: &str = concat!(
    "<meta name=\"color-scheme\" content=\"light dark\" />",
    "<meta name=\"supported-color-schemes\" content=\"light dark\" />",
);

/// Neutral light -> dark pairs used when the design gives no mapping.
pub const DEFAULT_DARK_PAIRS: &[(&str, &str)] = &[
    ("#ffffff", "#1a1a1a"),
    ("#f5f5f5", "#2d2d2d"),
    ("#f4f4f4", "#2d2d2d"),
    ("#eeeeee", "#333333"),
    ("#000000", "#ffffff"),
    ("#333333", "#e5e5e5"),
];

/// An extra dark-mode rule for a specific selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDarkRule {
    pub selector: String,
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarkModeConfig {
    /// Light color -> dark color, hex.
    pub color_map: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_rules: Vec<CustomDarkRule>,
}

impl DarkModeConfig {
    pub fn from_map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            color_map: normalize_map(pairs),
            custom_rules: Vec::new(),
        }
    }

    /// Resolves the color map: explicit design tokens, then the scheme's dark
    /// palette, then [`DEFAULT_DARK_PAIRS`].
    pub fn for_design(design: &DesignRequirements) -> Self {
        if !design.dark_mode_colors.is_empty() {
            return Self::from_map(&design.dark_mode_colors);
        }
        if let Some(scheme) = &design.color_scheme {
            if let Some(dark) = &scheme.dark {
                return Self::from_map([
                    (&scheme.background, &dark.background),
                    (&scheme.text, &dark.text),
                    (&scheme.primary, &dark.primary),
                    (&scheme.accent, &dark.accent),
                ]);
            }
        }
        Self::from_map(DEFAULT_DARK_PAIRS.iter().copied())
    }
}

fn normalize_map<I, K, V>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(l, d)| (normalize_hex_color(l.as_ref()), normalize_hex_color(d.as_ref())))
        .filter(|(l, d)| l != d)
        .collect()
}

/// The `<style>` block holding color-scheme declarations and overrides.
pub fn dark_mode_stylesheet(config: &DarkModeConfig) -> String {
    let mut rules = String::new();
    for (light, dark) in &config.color_map {
        rules.push_str(&format!(
            "[style*=\"color: {light}\"] {{ color: {dark} !important; }} \
             [style*=\"background-color: {light}\"] {{ background-color: {dark} !important; }} "
        ));
    }
    for rule in &config.custom_rules {
        rules.push_str(&format!(
            "{} {{ {}: {} !important; }} ",
            rule.selector, rule.property, rule.value
        ));
    }
    format!(
        "<style type=\"text/css\" id=\"{}\">:root {{ color-scheme: light dark; supported-color-schemes: light dark; }} \
         @media (prefers-color-scheme: dark) {{ {}}}</style>",
        DARK_STYLE_ID, rules
    )
}

/// Adds the dark-mode block before `</head>` (prepended when there is no head)
/// and the color-scheme meta hints after `<head>`. Running twice is a no-op.
pub fn inject_dark_mode(html: &str, config: &DarkModeConfig) -> String {
    if html.contains(&format!("id=\"{}\"", DARK_STYLE_ID)) {
        return html.to_string();
    }
    let block = dark_mode_stylesheet(config);

    let mut out = match HEAD_CLOSE_REGEX.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.start()], block, &html[m.start()..]),
        None => format!("{}{}", block, html),
    };

    if !out.contains("name=\"color-scheme\"") {
        if let Some(m) = HEAD_OPEN_REGEX.find(&out) {
            out = format!("{}{}{}", &out[..m.end()], COLOR_SCHEME_META, &out[m.end()..]);
        }
    }
    out
}

/// How many inline colors the dark-mode selectors will catch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DarkModeCoverage {
    pub matched: usize,
    /// Inline declarations of mapped colors written in a form the selectors miss.
    pub unmatched: Vec<String>,
}

pub fn dark_mode_coverage(html: &str, color_map: &BTreeMap<String, String>) -> DarkModeCoverage {
    let mut coverage = DarkModeCoverage::default();
    for style in STYLE_ATTR_REGEX.captures_iter(html) {
        let style = &style[1];
        for decl in COLOR_DECL_REGEX.captures_iter(style) {
            let raw_prop = decl[1].trim_start_matches(|c: char| !c.is_ascii_alphabetic());
            let prop = raw_prop.to_ascii_lowercase();
            let color = normalize_hex_color(&decl[2]);
            if !color_map.contains_key(&color) {
                continue;
            }
            if style.contains(&format!("{}: {}", prop, color)) {
                coverage.matched += 1;
            } else {
                coverage.unmatched.push(format!("{}: {}", raw_prop, &decl[2]));
            }
        }
    }
    coverage
}

/// Light -> dark pairs declared by an injected dark-mode block.
pub fn extract_dark_map(html: &str) -> BTreeMap<String, String> {
    DARK_SELECTOR_REGEX
        .captures_iter(html)
        .map(|c| (normalize_hex_color(&c[1]), normalize_hex_color(&c[2])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorScheme, DarkPalette};

    const HTML: &str = r#"<html><head><title>x</title></head><body style="background-color: #ffffff;"><p style="color: #333333;">Hi</p></body></html>"#;

    #[test]
    fn test_scenario_explicit_map_rule() {
        let config = DarkModeConfig::from_map([("#ffffff", "#1a1a1a")]);
        let out = inject_dark_mode(HTML, &config);
        assert!(out.contains("@media (prefers-color-scheme: dark)"));
        assert!(out.contains(r#"[style*="color: #ffffff"] { color: #1a1a1a !important; }"#));
        assert!(out.contains(
            r#"[style*="background-color: #ffffff"] { background-color: #1a1a1a !important; }"#
        ));
        let block = out.find("prefers-color-scheme").unwrap();
        assert!(block < out.find("</head>").unwrap());
    }

    #[test]
    fn test_meta_hints_added_once() {
        let config = DarkModeConfig::from_map([("#ffffff", "#1a1a1a")]);
        let out = inject_dark_mode(HTML, &config);
        assert!(out.contains("<head><meta name=\"color-scheme\""));
        assert_eq!(inject_dark_mode(&out, &config), out);
    }

    #[test]
    fn test_prepends_without_head() {
        let out = inject_dark_mode("<p>x</p>", &DarkModeConfig::from_map([("#fff", "#000")]));
        assert!(out.starts_with("<style type=\"text/css\" id=\"dark-mode\">"));
        assert!(out.contains("color: #ffffff"));
    }

    #[test]
    fn test_custom_rules_are_emitted() {
        let mut config = DarkModeConfig::default();
        config.custom_rules.push(CustomDarkRule {
            selector: ".logo".to_string(),
            property: "filter".to_string(),
            value: "invert(1)".to_string(),
        });
        let out = dark_mode_stylesheet(&config);
        assert!(out.contains(".logo { filter: invert(1) !important; }"));
    }

    fn design() -> DesignRequirements {
        DesignRequirements {
            color_scheme: Some(ColorScheme {
                primary: "#0055FF".to_string(),
                accent: "#ff6600".to_string(),
                background: "#fff".to_string(),
                text: "#333333".to_string(),
                dark: None,
            }),
            dark_mode: true,
            ..DesignRequirements::default()
        }
    }

    #[test]
    fn test_color_map_precedence() {
        let mut design = design();
        let defaults = DarkModeConfig::for_design(&design);
        assert_eq!(defaults.color_map.len(), DEFAULT_DARK_PAIRS.len());

        design.color_scheme.as_mut().unwrap().dark = Some(DarkPalette {
            primary: "#66a3ff".to_string(),
            accent: "#ffa366".to_string(),
            background: "#121212".to_string(),
            text: "#eeeeee".to_string(),
        });
        let palette = DarkModeConfig::for_design(&design);
        assert_eq!(palette.color_map.get("#ffffff").map(String::as_str), Some("#121212"));
        assert_eq!(palette.color_map.get("#0055ff").map(String::as_str), Some("#66a3ff"));

        design
            .dark_mode_colors
            .insert("#FFFFFF".to_string(), "#000000".to_string());
        let explicit = DarkModeConfig::for_design(&design);
        assert_eq!(explicit.color_map.len(), 1);
        assert_eq!(explicit.color_map.get("#ffffff").map(String::as_str), Some("#000000"));
    }

    #[test]
    fn test_coverage_flags_compact_declarations() {
        let map = DarkModeConfig::from_map([("#ffffff", "#1a1a1a"), ("#333333", "#e5e5e5")]).color_map;
        let html = r#"<td style="background-color: #ffffff;"><p style="color:#333333">x</p><span style="color: #FFF;">y</span><i style="color: #123456;">z</i></td>"#;
        let coverage = dark_mode_coverage(html, &map);
        assert_eq!(coverage.matched, 1);
        assert_eq!(coverage.unmatched, vec!["color: #333333".to_string(), "color: #FFF".to_string()]);
    }

    #[test]
    fn test_extract_dark_map_round_trips_injected_block() {
        let config = DarkModeConfig::from_map([("#ffffff", "#1a1a1a"), ("#000000", "#ffffff")]);
        let out = inject_dark_mode(HTML, &config);
        assert_eq!(extract_dark_map(&out), config.color_map);
    }
}
