//! CSS inliner for clients that strip `<style>` blocks.
//!
//! Rules with simple selectors (`tag`, `.class`, `#id`, `tag.class`, `tag#id`)
//! are copied onto matching elements. Everything else (at-rules, pseudo
//! classes, descendant selectors) is kept in a single preserved style block.

use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref STYLE_BLOCK_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").unwrap();
    static ref CSS_COMMENT_REGEX: regex::Regex =
        regex::Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref SIMPLE_SELECTOR_REGEX: regex::Regex =
        regex::Regex::new(r"^([a-zA-Z][a-zA-Z0-9-]*)?(?:\.([a-zA-Z_][\w-]*))?(?:#([a-zA-Z_][\w-]*))?$").unwrap();
    static ref OPEN_TAG_REGEX: regex::Regex =
        regex::Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)((?:\s+[^<>]*?)?)\s*(/?)>").unwrap();
    static ref CLASS_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sclass\s*=\s*"([^"]*)""#).unwrap();
    static ref ID_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sid\s*=\s*"([^"]*)""#).unwrap();
    static ref STYLE_ATTR_REGEX: regex::Regex =
        regex::Regex::new(r#"(?i)\sstyle\s*=\s*"([^"]*)""#).unwrap();
    static ref BODY_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<body\b").unwrap();
    static ref HEAD_CLOSE_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)</head\s*>").unwrap();
}

/// A selector the inliner can match without a DOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
}

impl SimpleSelector {
    pub fn parse(selector: &str) -> Option<Self> {
        let caps = SIMPLE_SELECTOR_REGEX.captures(selector.trim())?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
        let selector = Self {
            tag: part(1).map(|t| t.to_ascii_lowercase()),
            class: part(2),
            id: part(3),
        };
        if selector.tag.is_none() && selector.class.is_none() && selector.id.is_none() {
            return None;
        }
        Some(selector)
    }

    /// CSS specificity packed as `ids * 100 + classes * 10 + tags`.
    pub fn specificity(&self) -> u32 {
        u32::from(self.id.is_some()) * 100
            + u32::from(self.class.is_some()) * 10
            + u32::from(self.tag.is_some())
    }

    fn matches(&self, tag: &str, classes: &[&str], id: Option<&str>) -> bool {
        self.tag.as_deref().map_or(true, |t| t.eq_ignore_ascii_case(tag))
            && self.class.as_deref().map_or(true, |c| classes.contains(&c))
            && self.id.as_deref().map_or(true, |i| id == Some(i))
    }
}

#[derive(Debug, Clone)]
pub struct CssRule {
    pub selector: SimpleSelector,
    pub declarations: Vec<(String, String)>,
    order: usize,
}

/// A stylesheet split into inlinable rules and preserved text.
#[derive(Debug, Clone, Default)]
pub struct ParsedStylesheet {
    pub rules: Vec<CssRule>,
    pub preserved: Vec<String>,
}

/// Parses `prop: value; ...` into ordered pairs, lowercasing property names.
pub fn parse_declarations(text: &str) -> Vec<(String, String)> {
    text.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            if prop.is_empty() || value.is_empty() {
                return None;
            }
            Some((prop, value.to_string()))
        })
        .collect()
}

pub fn format_declarations(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(p, v)| format!("{}: {};", p, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index of the `}` closing the block whose `{` is at `open`.
fn matching_brace(css: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in css[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_stylesheet(css: &str) -> ParsedStylesheet {
    let css = CSS_COMMENT_REGEX.replace_all(css, "");
    let css = css.as_ref();
    let mut parsed = ParsedStylesheet::default();
    let mut pos = 0;

    while pos < css.len() {
        let rest = &css[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        let next_brace = css[pos..].find('{').map(|i| pos + i);
        if trimmed.starts_with('@') {
            let next_semi = css[pos..].find(';').map(|i| pos + i);
            match (next_semi, next_brace) {
                (Some(semi), Some(brace)) if semi < brace => {
                    parsed.preserved.push(css[pos..=semi].trim().to_string());
                    pos = semi + 1;
                }
                (Some(semi), None) => {
                    parsed.preserved.push(css[pos..=semi].trim().to_string());
                    pos = semi + 1;
                }
                (_, Some(brace)) => {
                    let end = matching_brace(css, brace).unwrap_or(css.len() - 1);
                    parsed.preserved.push(css[pos..=end].trim().to_string());
                    pos = end + 1;
                }
                (None, None) => break,
            }
            continue;
        }

        let Some(brace) = next_brace else { break };
        let end = css[brace..].find('}').map(|i| brace + i).unwrap_or(css.len());
        let selectors = css[pos..brace].trim();
        let body = &css[brace + 1..end.min(css.len())];
        pos = (end + 1).min(css.len());

        let declarations = parse_declarations(body);
        if declarations.is_empty() {
            continue;
        }
        let mut kept = Vec::new();
        for selector in selectors.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match SimpleSelector::parse(selector) {
                Some(simple) => parsed.rules.push(CssRule {
                    selector: simple,
                    declarations: declarations.clone(),
                    order: parsed.rules.len(),
                }),
                None => kept.push(selector),
            }
        }
        if !kept.is_empty() {
            parsed.preserved.push(format!(
                "{} {{ {} }}",
                kept.join(", "),
                format_declarations(&declarations)
            ));
        }
    }
    parsed
}

/// Inlines every simple rule from the document's style blocks.
pub fn inline_css(html: &str) -> String {
    let css: String = STYLE_BLOCK_REGEX
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect::<Vec<_>>()
        .join("\n");
    if css.trim().is_empty() {
        return html.to_string();
    }
    let mut sheet = parse_stylesheet(&css);
    sheet
        .rules
        .sort_by_key(|r| (r.selector.specificity(), r.order));

    let stripped = STYLE_BLOCK_REGEX.replace_all(html, "").into_owned();
    let start = BODY_OPEN_REGEX
        .find(&stripped)
        .map(|m| m.start())
        .unwrap_or(0);
    let (head_part, body_part) = stripped.split_at(start);

    let body_part = OPEN_TAG_REGEX.replace_all(body_part, |caps: &regex::Captures| {
        let tag = &caps[1];
        let attrs = &caps[2];
        let closing = &caps[3];
        match apply_rules(tag, attrs, &sheet.rules) {
            Some(new_attrs) => {
                let slash = if closing.is_empty() { "" } else { " /" };
                format!("<{}{}{}>", tag, new_attrs, slash)
            }
            None => caps[0].to_string(),
        }
    });

    let mut out = format!("{}{}", head_part, body_part);
    if !sheet.preserved.is_empty() {
        let block = format!(
            "<style type=\"text/css\">{}</style>",
            sheet.preserved.join("\n")
        );
        out = match HEAD_CLOSE_REGEX.find(&out) {
            Some(m) => format!("{}{}{}", &out[..m.start()], block, &out[m.start()..]),
            None => format!("{}{}", block, out),
        };
    }
    out
}

/// New attribute text for a tag, or `None` when no rule matches.
fn apply_rules(tag: &str, attrs: &str, rules: &[CssRule]) -> Option<String> {
    let class_value = CLASS_ATTR_REGEX.captures(attrs).map(|c| c[1].to_string());
    let classes: Vec<&str> = class_value
        .as_deref()
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    let id_value = ID_ATTR_REGEX.captures(attrs).map(|c| c[1].to_string());

    let mut computed: Vec<(String, String)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for rule in rules
        .iter()
        .filter(|r| r.selector.matches(tag, &classes, id_value.as_deref()))
    {
        for (prop, value) in &rule.declarations {
            match index.get(prop) {
                Some(&i) => computed[i].1 = value.clone(),
                None => {
                    index.insert(prop.clone(), computed.len());
                    computed.push((prop.clone(), value.clone()));
                }
            }
        }
    }
    if computed.is_empty() {
        return None;
    }

    let existing = STYLE_ATTR_REGEX
        .captures(attrs)
        .map(|c| parse_declarations(&c[1]))
        .unwrap_or_default();
    let mut merged: Vec<(String, String)> = computed
        .into_iter()
        .filter(|(p, _)| !existing.iter().any(|(e, _)| e == p))
        .collect();
    merged.extend(existing);
    let style = format_declarations(&merged).replace('"', "'");

    let new_attrs = match STYLE_ATTR_REGEX.find(attrs) {
        Some(m) => format!(
            "{} style=\"{}\"{}",
            &attrs[..m.start()],
            style,
            &attrs[m.end()..]
        ),
        None => format!("{} style=\"{}\"", attrs.trim_end(), style),
    };
    Some(new_attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_selector_parsing() {
        let s = SimpleSelector::parse("td.hero").unwrap();
        assert_eq!(s.tag.as_deref(), Some("td"));
        assert_eq!(s.class.as_deref(), Some("hero"));
        assert_eq!(s.specificity(), 11);
        assert_eq!(SimpleSelector::parse("#main").unwrap().specificity(), 100);
        assert!(SimpleSelector::parse("a:hover").is_none());
        assert!(SimpleSelector::parse(".list li").is_none());
        assert!(SimpleSelector::parse("*").is_none());
    }

    #[test]
    fn test_stylesheet_keeps_at_rules() {
        let sheet = parse_stylesheet(
            "@import url(x.css); p { color: red } @media (max-width:480px) { .a { width:100% } } \
             @font-face { font-family: X; src: url(x.woff) } a:hover, h1 { color: blue; }",
        );
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.preserved.len(), 4);
        assert!(sheet.preserved[0].starts_with("@import"));
        assert!(sheet.preserved[1].starts_with("@media"));
        assert!(sheet.preserved[1].ends_with("} }"));
        assert!(sheet.preserved[2].starts_with("@font-face"));
        assert_eq!(sheet.preserved[3], "a:hover { color: blue; }");
    }

    #[test]
    fn test_inline_applies_rules_and_removes_blocks() {
        let html = r#"<html><head><style>p { color: #333333; } .lead { font-size: 18px }</style></head><body><p class="lead">Hi</p><p>There</p></body></html>"#;
        let out = inline_css(html);
        assert!(!out.contains("<style"));
        assert!(out.contains(r#"<p class="lead" style="color: #333333; font-size: 18px;">Hi</p>"#));
        assert!(out.contains(r#"<p style="color: #333333;">There</p>"#));
    }

    #[test]
    fn test_existing_inline_styles_win() {
        let html = r#"<html><head><style>td { color: red; padding: 4px }</style></head><body><td style="color:blue">x</td></body></html>"#;
        let out = inline_css(html);
        assert!(out.contains(r#"<td style="padding: 4px; color: blue;">x</td>"#));
    }

    #[test]
    fn test_specificity_beats_source_order() {
        let html = r#"<html><head><style>#cta { color: green } a.btn { color: red } a { color: blue }</style></head><body><a id="cta" class="btn" href="x">Go</a></body></html>"#;
        let out = inline_css(html);
        assert!(out.contains(r#"style="color: green;""#));
    }

    #[test]
    fn test_media_queries_survive_in_head() {
        let html = "<html><head><title>t</title><style>p { margin: 0 } @media only screen and (max-width:480px) { .col { width: 100% !important } }</style></head><body><p>x</p></body></html>";
        let out = inline_css(html);
        let head_end = out.find("</head>").unwrap();
        let preserved = out.find("@media only screen").unwrap();
        assert!(preserved < head_end);
        assert_eq!(out.matches("<style").count(), 1);
        assert!(out.contains(r#"<p style="margin: 0;">x</p>"#));
    }

    #[test]
    fn test_self_closing_tags_keep_slash() {
        let html = r#"<html><head><style>img { border: 0 }</style></head><body><img src="a.png" alt="a" /></body></html>"#;
        let out = inline_css(html);
        assert!(out.contains(r#"<img src="a.png" alt="a" style="border: 0;" />"#));
    }

    #[test]
    fn test_head_elements_untouched() {
        let html = r#"<html><head><title>t</title><style>title { color: red } body { margin: 0 }</style></head><body><p>x</p></body></html>"#;
        let out = inline_css(html);
        assert!(out.contains("<title>t</title>"));
        assert!(out.contains(r#"<body style="margin: 0;">"#));
    }

    #[test]
    fn test_no_styles_is_noop() {
        let html = "<html><body><p>x</p></body></html>";
        assert_eq!(inline_css(html), html);
    }
}
