//! Domain models for Mailcraft.

pub mod client;
pub mod request;
pub mod section;
pub mod template;
pub mod validation;

pub use client::{
    ClientRules, DarkModeMethod, EmailClient, HtmlTransform, MarkupTransform, UnsupportedCss,
};
pub use request::{
    Asset, AssetManifest, CallToAction, CampaignType, ColorScheme, ContentBody, ContentContext,
    DarkPalette, DesignRequirements, GenerationRequest, RequestValidationError, TemplateDesign,
    Typography,
};
pub use section::{
    Background, BenefitsContent, CtaContent, CustomContent, FontSpec, FooterContent,
    GalleryContent, GalleryImage, HeroContent, LayoutType, SectionContent, SectionPosition,
    TemplateSection, TextContent, UrgencyContent,
};
pub use template::{
    CompiledTemplate, CompressionLevel, GenerationOptions, PerformanceMetrics,
    PerformanceTargets, RenderedEmail,
};
pub use validation::{
    IssueCategory, ScoreWeights, Severity, ValidationError, ValidationResult, ValidationWarning,
};
