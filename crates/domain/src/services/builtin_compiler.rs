//! In-process markup compiler.
//!
//! Renders the supported subset of the markup (sections, columns, text,
//! images, buttons, heroes, dividers, spacers, tables, raw HTML, wrappers)
//! into XHTML, table-based email HTML. Unsupported elements are skipped and
//! reported as diagnostics.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::Severity;

use super::compiler::{
    BackendOutput, CompilerBackendError, CompilerOptions, Diagnostic, MarkupCompiler,
    ValidationLevel,
};
use super::markup::{escape_attr, Element, MarkupDocument, MarkupNode};

pub const XHTML_DOCTYPE: &str = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">";

const DEFAULT_BODY_WIDTH: u32 = 600;
const DEFAULT_PADDING: &str = "10px 25px";
const HORIZONTAL_PADDING_PX: u32 = 50;

const RESET_CSS: &str = "#outlook a { padding:0; }
body { margin:0; padding:0; -webkit-text-size-adjust:100%; -ms-text-size-adjust:100%; }
table, td { border-collapse:collapse; mso-table-lspace:0pt; mso-table-rspace:0pt; }
img { border:0; height:auto; line-height:100%; outline:none; text-decoration:none; -ms-interpolation-mode:bicubic; }
p { display:block; margin:13px 0; }";

const UNSUPPORTED: &[&str] = &[
    "mj-social",
    "mj-social-element",
    "mj-navbar",
    "mj-carousel",
    "mj-carousel-image",
    "mj-accordion",
    "mj-accordion-element",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinMarkupCompiler;

impl BuiltinMarkupCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MarkupCompiler for BuiltinMarkupCompiler {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn render(
        &self,
        markup: &str,
        options: &CompilerOptions,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, CompilerBackendError> {
        if cancel.is_cancelled() {
            return Err(CompilerBackendError::Cancelled);
        }
        let doc = MarkupDocument::parse(markup)
            .map_err(|e| CompilerBackendError::Rejected(e.to_string()))?;

        let mut renderer = Renderer::new(&doc, options);
        let html = renderer.render_document(&doc);
        let diagnostics = match options.validation_level {
            ValidationLevel::Skip => Vec::new(),
            ValidationLevel::Soft => renderer.diagnostics,
            ValidationLevel::Strict if renderer.diagnostics.is_empty() => Vec::new(),
            ValidationLevel::Strict => {
                let first = renderer
                    .diagnostics
                    .first()
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                return Err(CompilerBackendError::Rejected(first));
            }
        };

        Ok(BackendOutput { html, diagnostics })
    }
}

/// Formats declarations as `prop: value;` pairs, skipping empty values.
fn style(declarations: &[(&str, &str)]) -> String {
    declarations
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}: {};", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn px(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

struct Renderer {
    keep_comments: bool,
    /// Per-tag defaults from `mj-attributes`.
    defaults: HashMap<String, Vec<(String, String)>>,
    /// Named attribute sets from `mj-class`.
    classes: HashMap<String, Vec<(String, String)>>,
    diagnostics: Vec<Diagnostic>,
    body_width: u32,
}

impl Renderer {
    fn new(doc: &MarkupDocument, options: &CompilerOptions) -> Self {
        let mut defaults: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut classes: HashMap<String, Vec<(String, String)>> = HashMap::new();

        if let Some(attributes) = doc.head().and_then(|h| h.child("mj-attributes")) {
            for el in attributes.child_elements() {
                if el.is("mj-class") {
                    if let Some(name) = el.attr("name") {
                        let attrs = el
                            .attrs
                            .iter()
                            .filter(|(k, _)| k != "name")
                            .cloned()
                            .collect();
                        classes.insert(name.to_string(), attrs);
                    }
                } else {
                    defaults
                        .entry(el.tag.to_ascii_lowercase())
                        .or_default()
                        .extend(el.attrs.iter().cloned());
                }
            }
        }

        let body_width = doc
            .body()
            .and_then(|b| b.attr("width"))
            .and_then(px)
            .unwrap_or(DEFAULT_BODY_WIDTH);

        Self {
            keep_comments: options.keep_comments,
            defaults,
            classes,
            diagnostics: Vec::new(),
            body_width,
        }
    }

    /// Attribute lookup: own value, then `mj-class`, tag defaults, `mj-all`.
    fn attr(&self, el: &Element, name: &str) -> Option<String> {
        if let Some(v) = el.attr(name) {
            return Some(v.to_string());
        }
        if let Some(class_list) = el.attr("mj-class") {
            for class in class_list.split_whitespace() {
                if let Some(v) = self.classes.get(class).and_then(|attrs| lookup(attrs, name)) {
                    return Some(v);
                }
            }
        }
        if let Some(v) = self
            .defaults
            .get(&el.tag.to_ascii_lowercase())
            .and_then(|attrs| lookup(attrs, name))
        {
            return Some(v);
        }
        self.defaults.get("mj-all").and_then(|attrs| lookup(attrs, name))
    }

    fn attr_or(&self, el: &Element, name: &str, fallback: &str) -> String {
        self.attr(el, name).unwrap_or_else(|| fallback.to_string())
    }

    fn diagnose(&mut self, el: &Element, severity: Severity, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            message: message.into(),
            severity,
            tag: Some(el.tag.clone()),
            line: None,
        });
    }

    fn render_document(&mut self, doc: &MarkupDocument) -> String {
        let head = doc.head();
        let title = head
            .and_then(|h| h.child("mj-title"))
            .map(|t| t.text())
            .unwrap_or_default();
        let preview = head
            .and_then(|h| h.child("mj-preview"))
            .map(|t| t.text())
            .unwrap_or_default();

        let mut head_html = String::new();
        head_html.push_str(&format!("<title>{}</title>", title));
        head_html.push_str(&format!("<style type=\"text/css\">{}</style>", RESET_CSS));
        if let Some(head) = head {
            for el in head.child_elements() {
                if el.is("mj-font") {
                    if let Some(href) = el.attr("href") {
                        head_html.push_str(&format!(
                            "<!--[if !mso]><!--><link href=\"{}\" rel=\"stylesheet\" type=\"text/css\" /><!--<![endif]-->",
                            escape_attr(href)
                        ));
                    }
                }
            }
            let user_css: Vec<String> = head
                .child_elements()
                .filter(|el| el.is("mj-style"))
                .map(|el| el.text().trim().to_string())
                .filter(|css| !css.is_empty())
                .collect();
            if !user_css.is_empty() {
                head_html.push_str(&format!(
                    "<style type=\"text/css\">{}</style>",
                    user_css.join("\n")
                ));
            }
        }

        let (background, body_html) = match doc.body() {
            Some(body) => {
                let background = self.attr(body, "background-color").unwrap_or_default();
                (background, self.render_body_children(&body.children))
            }
            None => (String::new(), String::new()),
        };

        let mut html = String::new();
        html.push_str(XHTML_DOCTYPE);
        html.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:v=\"urn:schemas-microsoft-com:vml\" xmlns:o=\"urn:schemas-microsoft-com:office:office\">");
        html.push_str("<head>");
        html.push_str(&head_html);
        html.push_str("</head>");
        html.push_str(&format!(
            "<body style=\"{}\">",
            style(&[
                ("margin", "0"),
                ("padding", "0"),
                ("word-spacing", "normal"),
                ("background-color", &background),
            ])
        ));
        if !preview.trim().is_empty() {
            html.push_str(&format!(
                "<div style=\"display: none; font-size: 1px; line-height: 1px; max-height: 0px; max-width: 0px; opacity: 0; overflow: hidden;\">{}</div>",
                preview
            ));
        }
        html.push_str(&format!(
            "<table role=\"presentation\" class=\"email-container\" align=\"center\" width=\"{w}\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\" style=\"width: {w}px; margin: 0 auto;\"><tr><td>",
            w = self.body_width
        ));
        html.push_str(&body_html);
        html.push_str("</td></tr></table></body></html>");
        html
    }

    fn render_body_children(&mut self, children: &[MarkupNode]) -> String {
        let mut out = String::new();
        for child in children {
            match child {
                MarkupNode::Element(el) if el.is("mj-section") => out.push_str(&self.render_section(el)),
                MarkupNode::Element(el) if el.is("mj-hero") => out.push_str(&self.render_hero(el)),
                MarkupNode::Element(el) if el.is("mj-wrapper") => out.push_str(&self.render_wrapper(el)),
                MarkupNode::Element(el) if el.is("mj-raw") => out.push_str(&el.text()),
                MarkupNode::Element(el) => {
                    self.diagnose(el, Severity::Medium, "Element is not allowed directly in <mj-body>; skipped");
                }
                MarkupNode::Comment(text) => self.push_comment(&mut out, text),
                MarkupNode::Text(_) => {}
            }
        }
        out
    }

    fn push_comment(&self, out: &mut String, text: &str) {
        if self.keep_comments {
            out.push_str(&format!("<!--{}-->", text));
        }
    }

    fn section_table(&self, el: &Element, inner: &str) -> String {
        let background = self.attr(el, "background-color").unwrap_or_default();
        let image = self.attr(el, "background-url");
        let image_css = image
            .as_deref()
            .map(|url| format!("url('{}')", url))
            .unwrap_or_default();
        let class = self.attr(el, "css-class").unwrap_or_default();
        let padding = self.attr_or(el, "padding", "20px 0");
        let text_align = self.attr_or(el, "text-align", "center");

        let mut table = String::from("<table role=\"presentation\"");
        if !class.is_empty() {
            table.push_str(&format!(" class=\"{}\"", escape_attr(&class)));
        }
        if let Some(url) = &image {
            table.push_str(&format!(" background=\"{}\"", escape_attr(url)));
        }
        table.push_str(" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\"");
        let table_style = style(&[
            ("background-color", &background),
            ("background-image", &image_css),
            ("background-repeat", if image.is_some() { "no-repeat" } else { "" }),
            ("background-position", if image.is_some() { "center top" } else { "" }),
        ]);
        if !table_style.is_empty() {
            table.push_str(&format!(" style=\"{}\"", escape_attr(&table_style)));
        }
        table.push_str(&format!(
            "><tr><td style=\"{}\">{}</td></tr></table>",
            style(&[("padding", &padding), ("text-align", &text_align)]),
            inner
        ));
        table
    }

    fn render_wrapper(&mut self, el: &Element) -> String {
        let inner = self.render_body_children(&el.children);
        self.section_table(el, &inner)
    }

    fn render_section(&mut self, el: &Element) -> String {
        let mut columns: Vec<&Element> = Vec::new();
        let mut loose: Vec<&Element> = Vec::new();
        for child in el.child_elements() {
            if child.is("mj-column") {
                columns.push(child);
            } else if child.is("mj-group") {
                columns.extend(child.child_elements().filter(|c| c.is("mj-column")));
            } else {
                loose.push(child);
            }
        }
        if !loose.is_empty() {
            self.diagnose(el, Severity::Low, "Content outside <mj-column> rendered as its own column");
        }

        let count = columns.len() + usize::from(!loose.is_empty());
        let count = count.max(1) as u32;
        let mut cells = String::new();
        for column in columns {
            cells.push_str(&self.render_column(column, count));
        }
        if !loose.is_empty() {
            let content_width = self.column_content_width(count);
            let rows: String = loose
                .into_iter()
                .map(|c| self.render_content(c, content_width))
                .collect();
            cells.push_str(&self.column_cell(None, count, &rows));
        }

        let inner = format!(
            "<table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\"><tr>{}</tr></table>",
            cells
        );
        self.section_table(el, &inner)
    }

    fn column_content_width(&self, count: u32) -> u32 {
        (self.body_width / count).saturating_sub(HORIZONTAL_PADDING_PX)
    }

    fn column_cell(&self, column: Option<&Element>, count: u32, rows: &str) -> String {
        let pct = format!("{}%", 100 / count);
        let (class, background) = match column {
            Some(c) => (
                self.attr(c, "css-class").unwrap_or_default(),
                self.attr(c, "background-color").unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        let class = if class.is_empty() {
            "column".to_string()
        } else {
            format!("column {}", class)
        };
        format!(
            "<td class=\"{}\" valign=\"top\" width=\"{}\" style=\"{}\"><table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\">{}</table></td>",
            escape_attr(&class),
            pct,
            style(&[
                ("vertical-align", "top"),
                ("width", &pct),
                ("background-color", &background),
            ]),
            rows
        )
    }

    fn render_column(&mut self, column: &Element, count: u32) -> String {
        let content_width = self.column_content_width(count);
        let mut rows = String::new();
        for child in &column.children {
            match child {
                MarkupNode::Element(el) => rows.push_str(&self.render_content(el, content_width)),
                MarkupNode::Comment(text) => self.push_comment(&mut rows, text),
                MarkupNode::Text(_) => {}
            }
        }
        self.column_cell(Some(column), count, &rows)
    }

    fn cell(&self, el: &Element, inner: &str) -> String {
        let align = self.attr_or(el, "align", "left");
        let padding = self.attr_or(el, "padding", DEFAULT_PADDING);
        let class = self.attr(el, "css-class").unwrap_or_default();
        let class_attr = if class.is_empty() {
            String::new()
        } else {
            format!(" class=\"{}\"", escape_attr(&class))
        };
        format!(
            "<tr><td align=\"{}\"{} style=\"{}\">{}</td></tr>",
            escape_attr(&align),
            class_attr,
            style(&[("padding", &padding)]),
            inner
        )
    }

    fn render_content(&mut self, el: &Element, content_width: u32) -> String {
        let tag = el.tag.to_ascii_lowercase();
        match tag.as_str() {
            "mj-text" => {
                let div_style = style(&[
                    ("font-family", &self.attr(el, "font-family").unwrap_or_default()),
                    ("font-size", &self.attr_or(el, "font-size", "13px")),
                    ("line-height", &self.attr_or(el, "line-height", "1")),
                    ("color", &self.attr_or(el, "color", "#000000")),
                    ("text-align", &self.attr_or(el, "align", "left")),
                ]);
                let inner = format!("<div style=\"{}\">{}</div>", escape_attr(&div_style), el.text());
                self.cell(el, &inner)
            }
            "mj-image" => {
                let Some(src) = self.attr(el, "src") else {
                    self.diagnose(el, Severity::Medium, "Image without src; skipped");
                    return String::new();
                };
                let width = self
                    .attr(el, "width")
                    .and_then(|w| px(&w))
                    .unwrap_or(content_width)
                    .min(content_width.max(1));
                let alt = self.attr(el, "alt").unwrap_or_default();
                let class = self.attr(el, "css-class").unwrap_or_default();
                let mut img = format!(
                    "<img src=\"{}\" alt=\"{}\" width=\"{}\"",
                    escape_attr(&src),
                    escape_attr(&alt),
                    width
                );
                if !class.is_empty() {
                    img.push_str(&format!(" class=\"{}\"", escape_attr(&class)));
                }
                img.push_str(" style=\"border: 0; display: block; outline: none; text-decoration: none; height: auto; width: 100%;\" />");
                let inner = match self.attr(el, "href") {
                    Some(href) => format!("<a href=\"{}\" target=\"_blank\">{}</a>", escape_attr(&href), img),
                    None => img,
                };
                let mut cell_el = el.clone();
                if cell_el.attr("align").is_none() && self.attr(el, "align").is_none() {
                    cell_el.set_attr("align", "center");
                }
                self.cell(&cell_el, &inner)
            }
            "mj-button" => {
                let background = self.attr_or(el, "background-color", "#414141");
                let color = self.attr_or(el, "color", "#ffffff");
                let radius = self.attr_or(el, "border-radius", "3px");
                let border = self.attr(el, "border").unwrap_or_default();
                let href = self.attr(el, "href").unwrap_or_default();
                if href.is_empty() {
                    self.diagnose(el, Severity::Low, "Button without href");
                }
                let link_style = style(&[
                    ("display", "inline-block"),
                    ("padding", &self.attr_or(el, "inner-padding", "12px 24px")),
                    ("background-color", &background),
                    ("color", &color),
                    ("font-family", &self.attr(el, "font-family").unwrap_or_default()),
                    ("font-size", &self.attr_or(el, "font-size", "13px")),
                    ("font-weight", "bold"),
                    ("text-decoration", "none"),
                    ("border-radius", &radius),
                ]);
                let cell_style = style(&[
                    ("border", &border),
                    ("border-radius", &radius),
                    ("background-color", &background),
                ]);
                let inner = format!(
                    "<table role=\"presentation\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\"><tr><td align=\"center\" bgcolor=\"{}\" style=\"{}\"><a href=\"{}\" target=\"_blank\" style=\"{}\">{}</a></td></tr></table>",
                    escape_attr(&background),
                    escape_attr(&cell_style),
                    escape_attr(&href),
                    escape_attr(&link_style),
                    el.text()
                );
                let mut cell_el = el.clone();
                if self.attr(el, "align").is_none() {
                    cell_el.set_attr("align", "center");
                }
                self.cell(&cell_el, &inner)
            }
            "mj-divider" => {
                let border = format!(
                    "{} {} {}",
                    self.attr_or(el, "border-width", "1px"),
                    self.attr_or(el, "border-style", "solid"),
                    self.attr_or(el, "border-color", "#cccccc")
                );
                let inner = format!(
                    "<p style=\"{}\">&#160;</p>",
                    style(&[("border-top", &border), ("font-size", "1px"), ("margin", "0"), ("width", "100%")])
                );
                self.cell(el, &inner)
            }
            "mj-spacer" => {
                let height = self.attr_or(el, "height", "20px");
                format!(
                    "<tr><td style=\"{}\">&#160;</td></tr>",
                    style(&[("height", &height), ("line-height", &height)])
                )
            }
            "mj-table" => {
                let inner = format!(
                    "<table cellpadding=\"0\" cellspacing=\"0\" width=\"{}\" border=\"0\" style=\"{}\">{}</table>",
                    escape_attr(&self.attr_or(el, "width", "100%")),
                    style(&[
                        ("color", &self.attr_or(el, "color", "#000000")),
                        ("font-family", &self.attr(el, "font-family").unwrap_or_default()),
                        ("font-size", &self.attr_or(el, "font-size", "13px")),
                    ]),
                    el.text()
                );
                self.cell(el, &inner)
            }
            "mj-raw" => format!("<tr><td>{}</td></tr>", el.text()),
            _ if UNSUPPORTED.contains(&tag.as_str()) => {
                self.diagnose(el, Severity::Medium, "Element is not supported by the built-in compiler; skipped");
                String::new()
            }
            _ => {
                self.diagnose(el, Severity::Low, "Unknown element; skipped");
                String::new()
            }
        }
    }

    fn render_hero(&mut self, el: &Element) -> String {
        let content_width = self.column_content_width(1);
        let mut rows = String::new();
        for child in &el.children {
            match child {
                MarkupNode::Element(c) => rows.push_str(&self.render_content(c, content_width)),
                MarkupNode::Comment(text) => self.push_comment(&mut rows, text),
                MarkupNode::Text(_) => {}
            }
        }
        let background = self.attr(el, "background-color").unwrap_or_default();
        let padding = self.attr_or(el, "padding", "0px");
        let image = self.attr(el, "background-url").unwrap_or_default();
        let image_css = if image.is_empty() {
            String::new()
        } else {
            format!("url('{}')", image)
        };
        format!(
            "<table role=\"presentation\" class=\"hero\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\" background=\"{}\" style=\"{}\"><tr><td style=\"{}\"><table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" border=\"0\">{}</table></td></tr></table>",
            escape_attr(&image),
            escape_attr(&style(&[
                ("background-color", &background),
                ("background-image", &image_css),
                ("background-position", "center center"),
                ("background-repeat", "no-repeat"),
            ])),
            style(&[("padding", &padding)]),
            rows
        )
    }
}

fn lookup(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::fixtures::request;
    use crate::services::markup_builder::MarkupBuilder;

    async fn render(markup: &str, options: CompilerOptions) -> Result<BackendOutput, CompilerBackendError> {
        BuiltinMarkupCompiler::new()
            .render(markup, &options, &CancellationToken::new())
            .await
    }

    const SIMPLE: &str = r##"<mjml>
      <mj-head>
        <mj-title>Hello</mj-title>
        <mj-preview>Peek</mj-preview>
        <mj-attributes><mj-text color="#333333" /><mj-all font-family="Arial" /></mj-attributes>
        <mj-style>.x { color: red; }</mj-style>
      </mj-head>
      <mj-body background-color="#ffffff">
        <!-- intro -->
        <mj-section background-color="#f4f4f4">
          <mj-column><mj-text><h1>Title</h1></mj-text></mj-column>
          <mj-column><mj-image src="https://cdn.example.com/a.png" alt="A" /></mj-column>
        </mj-section>
      </mj-body>
    </mjml>"##;

    #[tokio::test]
    async fn test_renders_xhtml_table_document() {
        let out = render(SIMPLE, CompilerOptions::default()).await.unwrap();
        assert!(out.html.starts_with(XHTML_DOCTYPE));
        assert!(out.html.contains("<title>Hello</title>"));
        assert!(out.html.contains("Peek"));
        assert!(out.html.contains("<table role=\"presentation\""));
        assert!(out.html.contains("background-color: #f4f4f4;"));
        assert!(out.html.contains("<h1>Title</h1>"));
        assert!(out.html.contains(".x { color: red; }"));
        assert!(out.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_attribute_defaults_apply() {
        let out = render(SIMPLE, CompilerOptions::default()).await.unwrap();
        assert!(out.html.contains("font-family: Arial;"));
        assert!(out.html.contains("color: #333333;"));
    }

    #[tokio::test]
    async fn test_two_columns_split_width() {
        let out = render(SIMPLE, CompilerOptions::default()).await.unwrap();
        assert_eq!(out.html.matches("width=\"50%\"").count(), 2);
        // 600 / 2 - 50 horizontal padding
        assert!(out.html.contains("width=\"250\""));
    }

    #[tokio::test]
    async fn test_comments_follow_keep_comments() {
        let dropped = render(SIMPLE, CompilerOptions::default()).await.unwrap();
        assert!(!dropped.html.contains("intro"));

        let kept = render(
            SIMPLE,
            CompilerOptions {
                keep_comments: true,
                ..CompilerOptions::default()
            },
        )
        .await
        .unwrap();
        assert!(kept.html.contains("<!-- intro -->"));
    }

    const WITH_SOCIAL: &str = "<mjml><mj-head></mj-head><mj-body><mj-section><mj-column><mj-social></mj-social></mj-column></mj-section></mj-body></mjml>";

    #[tokio::test]
    async fn test_validation_levels() {
        let soft = render(WITH_SOCIAL, CompilerOptions::default()).await.unwrap();
        assert_eq!(soft.diagnostics.len(), 1);
        assert_eq!(soft.diagnostics[0].tag.as_deref(), Some("mj-social"));

        let skip = render(
            WITH_SOCIAL,
            CompilerOptions {
                validation_level: ValidationLevel::Skip,
                keep_comments: false,
            },
        )
        .await
        .unwrap();
        assert!(skip.diagnostics.is_empty());

        let strict = render(
            WITH_SOCIAL,
            CompilerOptions {
                validation_level: ValidationLevel::Strict,
                keep_comments: false,
            },
        )
        .await;
        assert!(matches!(strict, Err(CompilerBackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_renders_built_markup() {
        let built = MarkupBuilder::build(&request(4, 800)).unwrap();
        let out = render(&built.markup, CompilerOptions::default()).await.unwrap();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert!(out.html.contains("<h1"));
        assert!(out.html.contains("https://shop.example.com/spring"));
        assert!(out.html.contains("class=\"hero\""));
        assert!(out.html.contains("@media only screen"));
    }

    #[test]
    fn test_style_skips_empty_values() {
        assert_eq!(style(&[("a", "1"), ("b", ""), ("c", "2")]), "a: 1; c: 2;");
    }
}
