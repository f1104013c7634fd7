//! Intermediate markup tree: parsing, building and serialization.
//!
//! The markup is the XML-like responsive email format (`mjml`, `mj-head`,
//! `mj-body`, `mj-section`, ...). Content of "ending" tags such as `mj-text`
//! or `mj-button` is raw HTML and is kept verbatim as a single text node.

use thiserror::Error;

/// Tags whose content is raw HTML rather than nested markup.
pub const RAW_CONTENT_TAGS: &[&str] = &[
    "mj-text",
    "mj-button",
    "mj-raw",
    "mj-style",
    "mj-title",
    "mj-preview",
    "mj-table",
    "mj-navbar-link",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),

    #[error("Unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("Missing closing tag for <{0}>")]
    MissingClosingTag(String),
}

/// One node of the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    Element(Element),
    Text(String),
    Comment(String),
}

impl MarkupNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            MarkupNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            MarkupNode::Element(el) => Some(el),
            _ => None,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            MarkupNode::Element(el) => el.write_to(out),
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
    }
}

/// A markup element with ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<MarkupNode>,
    pub self_closing: bool,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// A self-closing element such as `<mj-image ... />`.
    pub fn empty(tag: impl Into<String>) -> Self {
        Self {
            self_closing: true,
            ..Self::new(tag)
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Adds the attribute only when a value is present.
    pub fn with_opt_attr(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.with_attr(name, v),
            _ => self,
        }
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(MarkupNode::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(MarkupNode::Element));
        self
    }

    /// Sets raw (already escaped) content.
    pub fn with_raw(mut self, content: impl Into<String>) -> Self {
        self.children.push(MarkupNode::Text(content.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(MarkupNode::as_element)
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(MarkupNode::as_element_mut)
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.is(tag))
    }

    pub fn child_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|el| el.is(tag))
    }

    /// Concatenated raw text of direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                MarkupNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All descendant elements, depth first.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.self_closing && self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

/// A parsed markup document (top-level nodes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkupDocument {
    pub nodes: Vec<MarkupNode>,
}

impl MarkupDocument {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Parser::new(input).parse()
    }

    /// The `<mjml>` root element, if present.
    pub fn root(&self) -> Option<&Element> {
        self.nodes
            .iter()
            .filter_map(MarkupNode::as_element)
            .find(|el| el.is("mjml"))
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes
            .iter_mut()
            .filter_map(MarkupNode::as_element_mut)
            .find(|el| el.is("mjml"))
    }

    pub fn head(&self) -> Option<&Element> {
        self.root().and_then(|r| r.child("mj-head"))
    }

    pub fn body(&self) -> Option<&Element> {
        self.root().and_then(|r| r.child("mj-body"))
    }

    pub fn body_mut(&mut self) -> Option<&mut Element> {
        self.root_mut().and_then(|r| r.child_mut("mj-body"))
    }

    pub fn head_mut(&mut self) -> Option<&mut Element> {
        self.root_mut().and_then(|r| r.child_mut("mj-head"))
    }

    /// Every element in the document, depth first.
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        for el in self.nodes.iter().filter_map(MarkupNode::as_element) {
            out.push(el);
            collect_descendants(el, &mut out);
        }
        out
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_to(&mut out);
        }
        out
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn parse(mut self) -> Result<MarkupDocument, ParseError> {
        // Stack of open elements; index 0 is a synthetic document root.
        let mut stack: Vec<Element> = vec![Element::new("#document")];

        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<!--") {
                let start = self.pos;
                let end = rest
                    .find("-->")
                    .ok_or(ParseError::UnterminatedComment(start))?;
                let text = rest[4..end].to_string();
                self.pos += end + 3;
                push_node(&mut stack, MarkupNode::Comment(text));
            } else if rest.starts_with("</") {
                let start = self.pos;
                let end = rest.find('>').ok_or(ParseError::UnterminatedTag(start))?;
                let name = rest[2..end].trim().to_string();
                self.pos += end + 1;
                close_element(&mut stack, &name);
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                let element = self.parse_open_tag()?;
                if element.self_closing {
                    push_node(&mut stack, MarkupNode::Element(element));
                } else if is_raw_tag(&element.tag) {
                    let element = self.parse_raw_content(element)?;
                    push_node(&mut stack, MarkupNode::Element(element));
                } else {
                    stack.push(element);
                }
            } else {
                let next = rest[1..].find('<').map(|i| i + 1).unwrap_or(rest.len());
                let text = &rest[..next];
                self.pos += next;
                if !text.trim().is_empty() {
                    push_node(&mut stack, MarkupNode::Text(text.to_string()));
                }
            }
        }

        while stack.len() > 1 {
            let open = stack.last().map(|e| e.tag.clone()).unwrap_or_default();
            return Err(ParseError::MissingClosingTag(open));
        }

        let root = stack.pop().unwrap_or_else(|| Element::new("#document"));
        Ok(MarkupDocument {
            nodes: root.children,
        })
    }

    fn parse_open_tag(&mut self) -> Result<Element, ParseError> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        let mut i = self.pos + 1;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        let mut element = Element::new(&self.input[self.pos + 1..i]);

        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                return Err(ParseError::UnterminatedTag(start));
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' if bytes.get(i + 1) == Some(&b'>') => {
                    element.self_closing = true;
                    i += 2;
                    break;
                }
                _ => {
                    let name_start = i;
                    while i < bytes.len() && is_name_byte(bytes[i]) {
                        i += 1;
                    }
                    if i == name_start {
                        // Stray character inside the tag; skip it.
                        i += 1;
                        continue;
                    }
                    let name = self.input[name_start..i].to_string();
                    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    if bytes.get(i) == Some(&b'=') {
                        i += 1;
                        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        let value = match bytes.get(i) {
                            Some(&q) if q == b'"' || q == b'\'' => {
                                let close = self.input[i + 1..]
                                    .find(q as char)
                                    .ok_or(ParseError::UnterminatedTag(start))?;
                                let value = &self.input[i + 1..i + 1 + close];
                                i += close + 2;
                                value
                            }
                            _ => {
                                let value_start = i;
                                while i < bytes.len()
                                    && !bytes[i].is_ascii_whitespace()
                                    && bytes[i] != b'>'
                                {
                                    i += 1;
                                }
                                &self.input[value_start..i]
                            }
                        };
                        element.attrs.push((name, unescape_attr(value)));
                    } else {
                        element.attrs.push((name, String::new()));
                    }
                }
            }
        }

        self.pos = i;
        Ok(element)
    }

    fn parse_raw_content(&mut self, mut element: Element) -> Result<Element, ParseError> {
        let closing = format!("</{}", element.tag.to_ascii_lowercase());
        let rest = self.rest();
        let lower = rest.to_ascii_lowercase();
        let end = lower
            .find(&closing)
            .ok_or_else(|| ParseError::MissingClosingTag(element.tag.clone()))?;
        let content = &rest[..end];
        let after = rest[end..]
            .find('>')
            .ok_or(ParseError::UnterminatedTag(self.pos + end))?;
        if !content.is_empty() {
            element.children.push(MarkupNode::Text(content.to_string()));
        }
        self.pos += end + after + 1;
        Ok(element)
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.'
}

fn is_raw_tag(tag: &str) -> bool {
    RAW_CONTENT_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

fn push_node(stack: &mut [Element], node: MarkupNode) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

/// Pops open elements until `name` is closed. Unknown closing tags are ignored.
fn close_element(stack: &mut Vec<Element>, name: &str) {
    let Some(index) = stack.iter().rposition(|el| el.is(name)) else {
        return;
    };
    if index == 0 {
        return;
    }
    while stack.len() > index {
        if let Some(el) = stack.pop() {
            push_node(stack, MarkupNode::Element(el));
        }
    }
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
