//! Template section and layout models.

use serde::{Deserialize, Serialize};

use super::request::CallToAction;

/// Position tag of a section inside the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionPosition {
    Hero,
    Content,
    Gallery,
    Benefits,
    Urgency,
    Cta,
    Footer,
    Custom,
}

impl std::fmt::Display for SectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionPosition::Hero => write!(f, "hero"),
            SectionPosition::Content => write!(f, "content"),
            SectionPosition::Gallery => write!(f, "gallery"),
            SectionPosition::Benefits => write!(f, "benefits"),
            SectionPosition::Urgency => write!(f, "urgency"),
            SectionPosition::Cta => write!(f, "cta"),
            SectionPosition::Footer => write!(f, "footer"),
            SectionPosition::Custom => write!(f, "custom"),
        }
    }
}

/// Layout strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    Minimal,
    ContentHeavy,
    CtaFocused,
    LuxuryVisual,
    GalleryFocused,
}

impl LayoutType {
    /// Section ordering used by this layout tier.
    pub fn section_priority(&self) -> &'static [SectionPosition] {
        use SectionPosition::*;
        match self {
            LayoutType::Minimal => &[Hero, Content, Cta, Footer],
            LayoutType::ContentHeavy => &[Hero, Content, Benefits, Urgency, Gallery, Cta, Footer],
            LayoutType::CtaFocused => &[Hero, Urgency, Cta, Benefits, Content, Footer],
            LayoutType::LuxuryVisual => &[Hero, Gallery, Content, Benefits, Cta, Footer],
            LayoutType::GalleryFocused => {
                &[Hero, Gallery, Content, Benefits, Urgency, Cta, Footer]
            }
        }
    }
}

impl std::fmt::Display for LayoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutType::Minimal => write!(f, "minimal"),
            LayoutType::ContentHeavy => write!(f, "content-heavy"),
            LayoutType::CtaFocused => write!(f, "cta-focused"),
            LayoutType::LuxuryVisual => write!(f, "luxury-visual"),
            LayoutType::GalleryFocused => write!(f, "gallery-focused"),
        }
    }
}

/// Section background: a solid color and an optional image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Background {
    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            image_url: None,
        }
    }
}

/// Font override for a single section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_px: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroContent {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub image_url: String,
    #[serde(default)]
    pub image_alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryImage {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryContent {
    pub images: Vec<GalleryImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitsContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyContent {
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtaContent {
    pub primary: CallToAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<CallToAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooterContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe_url: Option<String>,
}

/// Raw intermediate markup supplied by the caller; emitted as-is inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomContent {
    pub markup: String,
}

/// Closed set of section payloads, one variant per position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum SectionContent {
    Hero(HeroContent),
    Content(TextContent),
    Gallery(GalleryContent),
    Benefits(BenefitsContent),
    Urgency(UrgencyContent),
    Cta(CtaContent),
    Footer(FooterContent),
    Custom(CustomContent),
}

impl SectionContent {
    pub fn position(&self) -> SectionPosition {
        match self {
            SectionContent::Hero(_) => SectionPosition::Hero,
            SectionContent::Content(_) => SectionPosition::Content,
            SectionContent::Gallery(_) => SectionPosition::Gallery,
            SectionContent::Benefits(_) => SectionPosition::Benefits,
            SectionContent::Urgency(_) => SectionPosition::Urgency,
            SectionContent::Cta(_) => SectionPosition::Cta,
            SectionContent::Footer(_) => SectionPosition::Footer,
            SectionContent::Custom(_) => SectionPosition::Custom,
        }
    }

    /// Number of images the section renders.
    pub fn image_count(&self) -> usize {
        match self {
            SectionContent::Hero(_) => 1,
            SectionContent::Gallery(g) => g.images.len(),
            _ => 0,
        }
    }
}

/// One visual block of the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSection {
    pub id: String,
    #[serde(default)]
    pub background: Background,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<FontSpec>,
    pub content: SectionContent,
}

impl TemplateSection {
    pub fn position(&self) -> SectionPosition {
        self.content.position()
    }
}
