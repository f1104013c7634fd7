//! Per-client markup and HTML transforms.
//!
//! Which transform runs for which client is decided by the [`ClientRules`]
//! table; this module only knows how to perform each transform.

use tracing::debug;

use crate::models::{ClientRules, EmailClient, HtmlTransform, MarkupTransform};

use super::builtin_compiler::XHTML_DOCTYPE;
use super::markup::{Element, MarkupDocument, MarkupNode};

lazy_static::lazy_static! {
    static ref DOCTYPE_REGEX: regex::Regex =
        regex::Regex::new(r"(?is)^\s*<!DOCTYPE[^>]*>").unwrap();
    static ref HEAD_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<head\b[^>]*>").unwrap();
    static ref HTML_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<html\b[^>]*>").unwrap();
    static ref BODY_OPEN_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)<body\b[^>]*>").unwrap();
    static ref BODY_CLOSE_REGEX: regex::Regex =
        regex::Regex::new(r"(?i)</body\s*>").unwrap();
}

pub const OUTLOOK_TABLE_CLASS: &str = "outlook-table";

pub const META_BLOCK: &str = concat!(
    "<meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />",
    "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />",
    "<meta name=\"format-detection\" content=\"telephone=no, date=no, address=no, email=no\" />",
    "<!--[if !mso]><!--><meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\" /><!--<![endif]-->",
);

const MSO_OPEN: &str = "<!--[if mso]><table role=\"presentation\" align=\"center\" width=\"600\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\"><tr><td><![endif]-->";
const MSO_CLOSE: &str = "<!--[if mso]></td></tr></table><![endif]-->";

pub const MOBILE_MEDIA_QUERY: &str = "@media only screen and (max-width:480px) { \
.mobile-full { width:100% !important; } \
table.column, td.column { display:block !important; width:100% !important; } }";

/// Rule records for the targets, without duplicates, in target order.
fn rules_for(targets: &[EmailClient]) -> Vec<&'static ClientRules> {
    let mut seen = Vec::new();
    for client in targets {
        if !seen.contains(client) {
            seen.push(*client);
        }
    }
    seen.into_iter().map(|c| c.rules()).collect()
}

fn wants_markup(targets: &[EmailClient], transform: MarkupTransform) -> bool {
    rules_for(targets)
        .iter()
        .any(|r| r.markup_transforms.contains(&transform))
}

fn wants_html(targets: &[EmailClient], transform: HtmlTransform) -> bool {
    rules_for(targets)
        .iter()
        .any(|r| r.html_transforms.contains(&transform))
}

/// Pre-compile transforms. Markup that cannot be parsed is returned unchanged
/// so the compiler front-end can report it.
pub fn adapt_markup(markup: &str, targets: &[EmailClient]) -> String {
    let mut doc = match MarkupDocument::parse(markup) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Skipping markup adaptation for unparseable markup");
            return markup.to_string();
        }
    };

    let mut changed = false;
    if wants_markup(targets, MarkupTransform::HeroToSection) {
        changed |= hero_to_section(&mut doc);
    }
    if wants_markup(targets, MarkupTransform::SectionTableClass) {
        changed |= add_section_class(&mut doc, OUTLOOK_TABLE_CLASS);
    }
    if wants_markup(targets, MarkupTransform::MobileMediaQuery) {
        changed |= ensure_mobile_media_query(&mut doc);
    }

    if changed {
        doc.to_markup()
    } else {
        markup.to_string()
    }
}

/// Replaces every `mj-hero` in the body with an image + content section.
fn hero_to_section(doc: &mut MarkupDocument) -> bool {
    let Some(body) = doc.body_mut() else {
        return false;
    };
    let mut changed = false;
    for node in body.children.iter_mut() {
        let MarkupNode::Element(el) = node else { continue };
        if !el.is("mj-hero") {
            continue;
        }
        let hero = std::mem::replace(el, Element::new("mj-section"));
        let mut column = Element::new("mj-column");
        if let Some(url) = hero.attr("background-url").filter(|u| !u.is_empty()) {
            column = column.with_child(
                Element::empty("mj-image")
                    .with_attr("src", url)
                    .with_attr("alt", "")
                    .with_attr("padding", "0px"),
            );
        }
        column
            .children
            .extend(hero.children.iter().filter(|n| !matches!(n, MarkupNode::Text(_))).cloned());

        *el = Element::new("mj-section")
            .with_opt_attr("background-color", hero.attr("background-color"))
            .with_opt_attr("padding", hero.attr("padding"))
            .with_opt_attr("css-class", hero.attr("css-class"))
            .with_child(column);
        changed = true;
    }
    changed
}

fn add_section_class(doc: &mut MarkupDocument, class: &str) -> bool {
    let Some(body) = doc.body_mut() else {
        return false;
    };
    let mut changed = false;
    tag_sections(body, class, &mut changed);
    changed
}

fn tag_sections(el: &mut Element, class: &str, changed: &mut bool) {
    for child in el.child_elements_mut() {
        if child.is("mj-section") {
            let current = child.attr("css-class").unwrap_or_default().to_string();
            if !current.split_whitespace().any(|c| c == class) {
                let value = if current.trim().is_empty() {
                    class.to_string()
                } else {
                    format!("{} {}", current.trim(), class)
                };
                child.set_attr("css-class", value);
                *changed = true;
            }
        }
        tag_sections(child, class, changed);
    }
}

fn ensure_mobile_media_query(doc: &mut MarkupDocument) -> bool {
    let Some(head) = doc.head_mut() else {
        return false;
    };
    let has_media = head
        .child_elements()
        .any(|el| el.is("mj-style") && el.text().contains("@media"));
    if has_media {
        return false;
    }
    head.children.push(MarkupNode::Element(
        Element::new("mj-style").with_raw(MOBILE_MEDIA_QUERY),
    ));
    true
}

/// Post-compile transforms plus doctype and meta normalization for every document.
pub fn adapt_html(html: &str, targets: &[EmailClient]) -> String {
    let mut html = normalize_doctype(html);
    html = inject_meta_block(&html);
    if wants_html(targets, HtmlTransform::MsoTableWrapper) {
        html = wrap_mso_tables(&html);
    }
    html
}

/// Replaces any doctype with the XHTML 1.0 Transitional one, or prepends it.
pub fn normalize_doctype(html: &str) -> String {
    if DOCTYPE_REGEX.is_match(html) {
        DOCTYPE_REGEX.replace(html, XHTML_DOCTYPE).into_owned()
    } else {
        format!("{}{}", XHTML_DOCTYPE, html.trim_start())
    }
}

/// Inserts [`META_BLOCK`] right after `<head>`, once.
pub fn inject_meta_block(html: &str) -> String {
    if html.contains("name=\"format-detection\"") {
        return html.to_string();
    }
    if let Some(m) = HEAD_OPEN_REGEX.find(html) {
        return format!("{}{}{}", &html[..m.end()], META_BLOCK, &html[m.end()..]);
    }
    if let Some(m) = HTML_OPEN_REGEX.find(html) {
        return format!(
            "{}<head>{}</head>{}",
            &html[..m.end()],
            META_BLOCK,
            &html[m.end()..]
        );
    }
    html.to_string()
}

/// Wraps the body content in `<!--[if mso]>` table shims, once.
pub fn wrap_mso_tables(html: &str) -> String {
    if html.contains(MSO_OPEN) {
        return html.to_string();
    }
    let (Some(open), Some(close)) = (BODY_OPEN_REGEX.find(html), BODY_CLOSE_REGEX.find(html)) else {
        return html.to_string();
    };
    if close.start() < open.end() {
        return html.to_string();
    }
    format!(
        "{}{}{}{}{}",
        &html[..open.end()],
        MSO_OPEN,
        &html[open.end()..close.start()],
        MSO_CLOSE,
        &html[close.start()..]
    )
}

/// Known workarounds for the targets, prefixed with the client name.
pub fn adaptation_notes(targets: &[EmailClient]) -> Vec<String> {
    rules_for(targets)
        .into_iter()
        .flat_map(|rules| {
            rules
                .workarounds
                .iter()
                .map(move |w| format!("{}: {}", rules.display_name, w))
        })
        .collect()
}
