//! Markup builder: request -> ordered sections -> intermediate markup.
//!
//! Layout selection is a pure function of a few request signals. Every section
//! kind renders itself through [`SectionFragment`], dispatched from a single
//! match in [`render_section`].

use thiserror::Error;
use tracing::debug;

use crate::models::{
    BenefitsContent, CampaignType, ColorScheme, CtaContent, CustomContent, FooterContent,
    GalleryContent, GalleryImage, GenerationRequest, HeroContent, LayoutType,
    RequestValidationError, SectionContent, SectionPosition, TemplateSection, TextContent,
    Typography, UrgencyContent, Background,
};

use super::markup::{escape_attr, escape_text, Element};

/// Body copy shorter than this (serialized) always gets the minimal layout.
pub const MINIMAL_BODY_LEN: usize = 500;

/// Body copy longer than this is treated as content-heavy.
pub const HEAVY_BODY_LEN: usize = 1500;

/// Maximum number of gallery images following the hero image.
pub const GALLERY_MAX_IMAGES: usize = 3;

const FOOTER_BACKGROUND: &str = "#f4f4f4";
const FOOTER_TEXT_COLOR: &str = "#555555";

/// Fixed responsive and benefit-list styles emitted in every head.
pub const BASE_STYLES: &str = "@media only screen and (max-width:480px) { \
.mobile-full { width:100% !important; max-width:100% !important; } \
.mobile-pad { padding-left:12px !important; padding-right:12px !important; } } \
.benefit-list { margin:0; padding:0 0 0 18px; } \
.benefit-list li { padding:4px 0; }";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0}")]
    InvalidRequest(#[from] RequestValidationError),
}

/// Request properties that drive layout selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSignals {
    pub image_count: usize,
    /// Length of the JSON-serialized body.
    pub body_len: usize,
    pub cta_count: usize,
    pub campaign_type: CampaignType,
    pub target_audience: Option<String>,
}

impl LayoutSignals {
    pub fn from_request(request: &GenerationRequest) -> Self {
        let content = request.content();
        Self {
            image_count: request.asset_manifest.image_count(),
            body_len: content
                .and_then(|c| c.body.as_ref())
                .map(|b| b.serialized_len())
                .unwrap_or(0),
            cta_count: content.map(|c| c.calls_to_action.len()).unwrap_or(0),
            campaign_type: content.map(|c| c.campaign_type).unwrap_or_default(),
            target_audience: content.and_then(|c| c.target_audience.clone()),
        }
    }
}

/// Picks the layout tier. Tiers are evaluated in priority order; first match wins.
pub fn select_layout(signals: &LayoutSignals) -> LayoutType {
    if signals.image_count <= 2 || signals.body_len < MINIMAL_BODY_LEN {
        return LayoutType::Minimal;
    }
    if signals.body_len > HEAVY_BODY_LEN || signals.campaign_type == CampaignType::Newsletter {
        return LayoutType::ContentHeavy;
    }
    if signals.cta_count > 1 || signals.campaign_type == CampaignType::Promotional {
        return LayoutType::CtaFocused;
    }
    let luxury_audience = signals
        .target_audience
        .as_deref()
        .map(|a| a.trim().eq_ignore_ascii_case("luxury"))
        .unwrap_or(false);
    if signals.campaign_type == CampaignType::Luxury || luxury_audience {
        return LayoutType::LuxuryVisual;
    }
    LayoutType::GalleryFocused
}

/// Output of [`MarkupBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltMarkup {
    pub layout: LayoutType,
    pub sections: Vec<TemplateSection>,
    pub markup: String,
    pub asset_usage_count: usize,
}

/// Colors and fonts every fragment draws from.
#[derive(Debug, Clone)]
pub struct Theme {
    pub primary: String,
    pub accent: String,
    pub background: String,
    pub text: String,
    pub heading_font: String,
    pub body_font: String,
    pub base_size_px: u8,
}

impl Theme {
    pub fn new(scheme: &ColorScheme, typography: &Typography) -> Self {
        Self {
            primary: scheme.primary.clone(),
            accent: scheme.accent.clone(),
            background: scheme.background.clone(),
            text: scheme.text.clone(),
            heading_font: typography.heading_font.clone(),
            body_font: typography.body_font.clone(),
            base_size_px: typography.base_size_px,
        }
    }
}

pub struct MarkupBuilder;

impl MarkupBuilder {
    /// Validates the request, plans the sections and serializes them.
    pub fn build(request: &GenerationRequest) -> Result<BuiltMarkup, BuildError> {
        request.check()?;

        let content = request.content().ok_or_else(|| RequestValidationError {
            code: "MISSING_CONTENT_CONTEXT",
            message: "Content context is required".to_string(),
        })?;
        let design = request.design().ok_or_else(|| RequestValidationError {
            code: "MISSING_DESIGN_REQUIREMENTS",
            message: "Design requirements are required".to_string(),
        })?;
        let scheme = request.color_scheme().ok_or_else(|| RequestValidationError {
            code: "MISSING_COLOR_SCHEME",
            message: "A color scheme is required".to_string(),
        })?;

        let layout = select_layout(&LayoutSignals::from_request(request));
        let sections = match &request.template_design {
            Some(design) if !design.sections.is_empty() => design.sections.clone(),
            _ => plan_sections(request, layout),
        };
        debug!(
            layout = %layout,
            sections = sections.len(),
            "Planned template sections"
        );

        let theme = Theme::new(scheme, &design.typography);
        let head = render_head(&content.subject, &content.preheader, &theme);
        let body = Element::new("mj-body")
            .with_attr("background-color", &theme.background)
            .with_attr("width", "600px")
            .with_children(sections.iter().map(|s| render_section(s, &theme)));
        let markup = Element::new("mjml").with_child(head).with_child(body).to_markup();

        let asset_usage_count = sections.iter().map(|s| s.content.image_count()).sum();

        Ok(BuiltMarkup {
            layout,
            sections,
            markup,
            asset_usage_count,
        })
    }
}

/// Builds the section list for a layout tier. Sections without content are skipped.
pub fn plan_sections(request: &GenerationRequest, layout: LayoutType) -> Vec<TemplateSection> {
    let Some(content) = request.content() else {
        return Vec::new();
    };
    let Some(scheme) = request.color_scheme() else {
        return Vec::new();
    };
    let body = content.body.clone().unwrap_or_default();
    let images = &request.asset_manifest.images;

    let mut sections = Vec::new();
    for position in layout.section_priority() {
        let (payload, background) = match position {
            SectionPosition::Hero => {
                let Some(image) = images.first() else { continue };
                let hero = HeroContent {
                    title: content.subject.clone(),
                    subtitle: body.opening.clone(),
                    image_url: image.url.clone(),
                    image_alt: image.alt_text.clone(),
                };
                let background = Background {
                    color: Some(scheme.primary.clone()),
                    image_url: Some(image.url.clone()),
                };
                (SectionContent::Hero(hero), background)
            }
            SectionPosition::Content => {
                let mut paragraphs: Vec<String> = body
                    .main_content
                    .split("\n\n")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                paragraphs.extend(
                    [&body.social_proof, &body.closing]
                        .into_iter()
                        .flatten()
                        .filter(|p| !p.trim().is_empty())
                        .cloned(),
                );
                if paragraphs.is_empty() {
                    continue;
                }
                (
                    SectionContent::Content(TextContent {
                        heading: None,
                        paragraphs,
                    }),
                    Background::color(&scheme.background),
                )
            }
            SectionPosition::Gallery => {
                let gallery: Vec<GalleryImage> = images
                    .iter()
                    .skip(1)
                    .take(GALLERY_MAX_IMAGES)
                    .map(|a| GalleryImage {
                        url: a.url.clone(),
                        alt: a.alt_text.clone(),
                    })
                    .collect();
                if gallery.is_empty() {
                    continue;
                }
                (
                    SectionContent::Gallery(GalleryContent { images: gallery }),
                    Background::color(&scheme.background),
                )
            }
            SectionPosition::Benefits => {
                if body.benefits.is_empty() {
                    continue;
                }
                (
                    SectionContent::Benefits(BenefitsContent {
                        heading: None,
                        items: body.benefits.clone(),
                    }),
                    Background::color(&scheme.background),
                )
            }
            SectionPosition::Urgency => {
                let Some(messages) = body.urgency() else { continue };
                (
                    SectionContent::Urgency(UrgencyContent {
                        messages: messages.to_vec(),
                    }),
                    Background::color(&scheme.accent),
                )
            }
            SectionPosition::Cta => {
                let Some(primary) = content.primary_cta() else { continue };
                (
                    SectionContent::Cta(CtaContent {
                        primary: primary.clone(),
                        secondary: content.calls_to_action.get(1).cloned(),
                        lead_in: None,
                    }),
                    Background::color(&scheme.background),
                )
            }
            SectionPosition::Footer => {
                let text = content
                    .footer_text
                    .clone()
                    .or_else(|| content.brand_name.as_ref().map(|b| format!("© {}", b)))
                    .unwrap_or_default();
                (
                    SectionContent::Footer(FooterContent {
                        text,
                        unsubscribe_url: content.unsubscribe_url.clone(),
                    }),
                    Background::color(FOOTER_BACKGROUND),
                )
            }
            SectionPosition::Custom => continue,
        };

        sections.push(TemplateSection {
            id: format!("{}-{}", position, sections.len()),
            background,
            font: None,
            content: payload,
        });
    }
    sections
}

fn render_head(subject: &str, preheader: &str, theme: &Theme) -> Element {
    let base_size = format!("{}px", theme.base_size_px);
    let attributes = Element::new("mj-attributes")
        .with_child(Element::empty("mj-all").with_attr("font-family", &theme.body_font))
        .with_child(
            Element::empty("mj-text")
                .with_attr("font-size", &base_size)
                .with_attr("color", &theme.text)
                .with_attr("line-height", "1.5"),
        )
        .with_child(
            Element::empty("mj-button")
                .with_attr("background-color", &theme.primary)
                .with_attr("color", "#ffffff")
                .with_attr("font-size", &base_size)
                .with_attr("border-radius", "4px"),
        )
        .with_child(Element::empty("mj-section").with_attr("padding", "20px 0"));

    let mut head = Element::new("mj-head")
        .with_child(Element::new("mj-title").with_raw(escape_text(subject)));
    if !preheader.trim().is_empty() {
        head = head.with_child(Element::new("mj-preview").with_raw(escape_text(preheader)));
    }
    head.with_child(attributes)
        .with_child(Element::new("mj-style").with_raw(BASE_STYLES))
}

/// Renders one section into its markup fragment.
pub fn render_section(section: &TemplateSection, theme: &Theme) -> Element {
    match &section.content {
        SectionContent::Hero(c) => c.fragment(section, theme),
        SectionContent::Content(c) => c.fragment(section, theme),
        SectionContent::Gallery(c) => c.fragment(section, theme),
        SectionContent::Benefits(c) => c.fragment(section, theme),
        SectionContent::Urgency(c) => c.fragment(section, theme),
        SectionContent::Cta(c) => c.fragment(section, theme),
        SectionContent::Footer(c) => c.fragment(section, theme),
        SectionContent::Custom(c) => c.fragment(section, theme),
    }
}

/// Markup generator for one section payload.
pub trait SectionFragment {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element;
}

/// Section frame shared by every non-hero fragment.
fn frame(section: &TemplateSection, theme: &Theme) -> Element {
    let color = section
        .background
        .color
        .as_deref()
        .unwrap_or(&theme.background);
    Element::new("mj-section")
        .with_attr("background-color", color)
        .with_opt_attr("background-url", section.background.image_url.as_deref())
        .with_attr("css-class", format!("section-{}", section.position()))
}

fn text_block(section: &TemplateSection, html: String) -> Element {
    let mut text = Element::new("mj-text").with_attr("css-class", "mobile-pad");
    if let Some(font) = &section.font {
        text.set_attr("font-family", &font.family);
        if let Some(size) = font.size_px {
            text.set_attr("font-size", format!("{}px", size));
        }
        if let Some(color) = &font.color {
            text.set_attr("color", color);
        }
    }
    text.with_raw(html)
}

fn paragraphs(lines: &[String]) -> String {
    lines
        .iter()
        .map(|p| format!("<p>{}</p>", escape_text(p)))
        .collect()
}

impl SectionFragment for HeroContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let color = section.background.color.as_deref().unwrap_or(&theme.primary);
        let mut html = format!(
            "<h1 style=\"margin:0;font-family:{}\">{}</h1>",
            escape_attr(&theme.heading_font),
            escape_text(&self.title)
        );
        if !self.subtitle.trim().is_empty() {
            html.push_str(&format!("<p>{}</p>", escape_text(&self.subtitle)));
        }
        Element::new("mj-hero")
            .with_attr("mode", "fluid-height")
            .with_attr("background-url", &self.image_url)
            .with_attr("background-color", color)
            .with_attr("padding", "60px 20px")
            .with_child(
                Element::new("mj-text")
                    .with_attr("align", "center")
                    .with_attr("color", "#ffffff")
                    .with_raw(html),
            )
    }
}

impl SectionFragment for TextContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let mut html = String::new();
        if let Some(heading) = &self.heading {
            html.push_str(&format!("<h2>{}</h2>", escape_text(heading)));
        }
        html.push_str(&paragraphs(&self.paragraphs));
        frame(section, theme).with_child(Element::new("mj-column").with_child(text_block(section, html)))
    }
}

impl SectionFragment for GalleryContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let columns = self.images.iter().map(|image| {
            Element::new("mj-column").with_child(
                Element::empty("mj-image")
                    .with_attr("src", &image.url)
                    .with_attr("alt", &image.alt)
                    .with_attr("css-class", "mobile-full"),
            )
        });
        frame(section, theme).with_children(columns)
    }
}

impl SectionFragment for BenefitsContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let mut html = String::new();
        if let Some(heading) = &self.heading {
            html.push_str(&format!("<h2>{}</h2>", escape_text(heading)));
        }
        html.push_str("<ul class=\"benefit-list\">");
        for item in &self.items {
            html.push_str(&format!("<li>{}</li>", escape_text(item)));
        }
        html.push_str("</ul>");
        frame(section, theme).with_child(Element::new("mj-column").with_child(text_block(section, html)))
    }
}

impl SectionFragment for UrgencyContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let html: String = self
            .messages
            .iter()
            .filter(|m| !m.trim().is_empty())
            .map(|m| format!("<p><strong>{}</strong></p>", escape_text(m)))
            .collect();
        let text = text_block(section, html)
            .with_attr("align", "center")
            .with_attr("color", "#ffffff");
        frame(section, theme).with_child(Element::new("mj-column").with_child(text))
    }
}

impl SectionFragment for CtaContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let mut column = Element::new("mj-column");
        if let Some(lead_in) = &self.lead_in {
            column = column.with_child(
                text_block(section, paragraphs(std::slice::from_ref(lead_in)))
                    .with_attr("align", "center"),
            );
        }
        column = column.with_child(
            Element::new("mj-button")
                .with_attr("href", &self.primary.url)
                .with_attr("background-color", &theme.primary)
                .with_attr("align", "center")
                .with_raw(escape_text(&self.primary.text)),
        );
        if let Some(secondary) = &self.secondary {
            column = column.with_child(
                Element::new("mj-button")
                    .with_attr("href", &secondary.url)
                    .with_attr("background-color", &theme.background)
                    .with_attr("color", &theme.primary)
                    .with_attr("border", format!("2px solid {}", theme.primary))
                    .with_attr("align", "center")
                    .with_raw(escape_text(&secondary.text)),
            );
        }
        frame(section, theme).with_child(column)
    }
}

impl SectionFragment for FooterContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        let mut html = String::new();
        if !self.text.trim().is_empty() {
            html.push_str(&format!("<p>{}</p>", escape_text(&self.text)));
        }
        if let Some(url) = &self.unsubscribe_url {
            html.push_str(&format!(
                "<p><a href=\"{}\" style=\"color:{}\">Unsubscribe</a></p>",
                escape_attr(url),
                FOOTER_TEXT_COLOR
            ));
        }
        let text = text_block(section, html)
            .with_attr("align", "center")
            .with_attr("font-size", "12px")
            .with_attr("color", FOOTER_TEXT_COLOR);
        frame(section, theme).with_child(Element::new("mj-column").with_child(text))
    }
}

impl SectionFragment for CustomContent {
    fn fragment(&self, section: &TemplateSection, theme: &Theme) -> Element {
        frame(section, theme).with_child(
            Element::new("mj-column").with_child(Element::new("mj-raw").with_raw(self.markup.clone())),
        )
    }
}
