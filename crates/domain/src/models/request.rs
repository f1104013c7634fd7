//! Generation request domain model.
//!
//! A `GenerationRequest` is the immutable contract between upstream content/design
//! authoring and the template pipeline. It must pass [`GenerationRequest::check`]
//! before any compilation work starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::validation::{validate_hex_color, validate_link_url};
use thiserror::Error;
use validator::Validate;

use super::section::TemplateSection;

/// Campaign type used by layout selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    Newsletter,
    Promotional,
    Luxury,
    Announcement,
    Seasonal,
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for CampaignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignType::Newsletter => write!(f, "newsletter"),
            CampaignType::Promotional => write!(f, "promotional"),
            CampaignType::Luxury => write!(f, "luxury"),
            CampaignType::Announcement => write!(f, "announcement"),
            CampaignType::Seasonal => write!(f, "seasonal"),
            CampaignType::Other => write!(f, "other"),
        }
    }
}

/// A call-to-action button.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct CallToAction {
    #[validate(length(min = 1, max = 80, message = "CTA text must be 1-80 characters"))]
    pub text: String,

    #[validate(custom(function = "validate_link_url"))]
    pub url: String,
}

/// Structured body copy of the email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentBody {
    #[serde(default)]
    pub opening: String,
    #[serde(default)]
    pub main_content: String,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_elements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing: Option<String>,
}

impl ContentBody {
    /// True when there is no copy at all.
    pub fn is_empty(&self) -> bool {
        self.opening.trim().is_empty()
            && self.main_content.trim().is_empty()
            && self.benefits.is_empty()
    }

    /// Length of the JSON serialization, used by layout selection.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }

    /// Urgency lines, if any were supplied and are non-empty.
    pub fn urgency(&self) -> Option<&[String]> {
        self.urgency_elements
            .as_deref()
            .filter(|items| items.iter().any(|i| !i.trim().is_empty()))
    }
}

/// Content produced by the upstream copywriting step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentContext {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub preheader: String,
    #[serde(default)]
    pub body: Option<ContentBody>,
    /// First entry is the primary CTA.
    #[serde(default)]
    pub calls_to_action: Vec<CallToAction>,
    #[serde(default)]
    pub campaign_type: CampaignType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe_url: Option<String>,
}

impl ContentContext {
    pub fn primary_cta(&self) -> Option<&CallToAction> {
        self.calls_to_action
            .first()
            .filter(|cta| !cta.text.trim().is_empty() && !cta.url.trim().is_empty())
    }
}

/// Dark-mode counterparts of a color scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct DarkPalette {
    #[validate(custom(function = "validate_hex_color"))]
    pub primary: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub accent: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub background: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub text: String,
}

/// Brand colors shared by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct ColorScheme {
    #[validate(custom(function = "validate_hex_color"))]
    pub primary: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub accent: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub background: String,
    #[validate(custom(function = "validate_hex_color"))]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark: Option<DarkPalette>,
}

/// Font choices for headings and body copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Typography {
    #[serde(default = "default_heading_font")]
    pub heading_font: String,
    #[serde(default = "default_body_font")]
    pub body_font: String,
    #[serde(default = "default_base_size")]
    pub base_size_px: u8,
}

fn default_heading_font() -> String {
    "Georgia, 'Times New Roman', serif".to_string()
}

fn default_body_font() -> String {
    "Helvetica, Arial, sans-serif".to_string()
}

fn default_base_size() -> u8 {
    16
}

impl Default for Typography {
    fn default() -> Self {
        Self {
            heading_font: default_heading_font(),
            body_font: default_body_font(),
            base_size_px: default_base_size(),
        }
    }
}

fn default_responsive() -> bool {
    true
}

/// Visual requirements from the design step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignRequirements {
    #[serde(default)]
    pub color_scheme: Option<ColorScheme>,
    #[serde(default)]
    pub typography: Typography,
    #[serde(default = "default_responsive")]
    pub responsive: bool,
    #[serde(default)]
    pub dark_mode: bool,
    /// Explicit light -> dark color tokens. Takes precedence over every fallback.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dark_mode_colors: BTreeMap<String, String>,
}

impl Default for DesignRequirements {
    fn default() -> Self {
        Self {
            color_scheme: None,
            typography: Typography::default(),
            responsive: true,
            dark_mode: false,
            dark_mode_colors: BTreeMap::new(),
        }
    }
}

/// A single image asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// Ordered list of images chosen for the campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub images: Vec<Asset>,
}

impl AssetManifest {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Pre-built template design with an explicit section list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDesign {
    #[serde(default)]
    pub sections: Vec<TemplateSection>,
}

/// Request validation failure, reported before any pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestValidationError {
    /// Machine-readable code, e.g. `MISSING_SUBJECT`.
    pub code: &'static str,
    pub message: String,
}

impl RequestValidationError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Input of a template generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub content_context: Option<ContentContext>,
    #[serde(default)]
    pub design_requirements: Option<DesignRequirements>,
    #[serde(default)]
    pub asset_manifest: AssetManifest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_design: Option<TemplateDesign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

impl GenerationRequest {
    /// Validates the request and returns the first blocking error.
    pub fn check(&self) -> Result<(), RequestValidationError> {
        let content = self.content_context.as_ref().ok_or_else(|| {
            RequestValidationError::new("MISSING_CONTENT_CONTEXT", "Content context is required")
        })?;
        let design = self.design_requirements.as_ref().ok_or_else(|| {
            RequestValidationError::new(
                "MISSING_DESIGN_REQUIREMENTS",
                "Design requirements are required",
            )
        })?;

        if content.subject.trim().is_empty() {
            return Err(RequestValidationError::new(
                "MISSING_SUBJECT",
                "Email subject is required",
            ));
        }

        match &content.body {
            Some(body) if !body.is_empty() => {}
            _ => {
                return Err(RequestValidationError::new(
                    "MISSING_BODY",
                    "Email body content is required",
                ))
            }
        }

        let primary = content.primary_cta().ok_or_else(|| {
            RequestValidationError::new("MISSING_PRIMARY_CTA", "A primary call-to-action is required")
        })?;
        primary
            .validate()
            .map_err(|e| RequestValidationError::new("INVALID_CTA", first_message(&e)))?;

        let scheme = design.color_scheme.as_ref().ok_or_else(|| {
            RequestValidationError::new("MISSING_COLOR_SCHEME", "A color scheme is required")
        })?;
        scheme
            .validate()
            .map_err(|e| RequestValidationError::new("INVALID_COLOR", first_message(&e)))?;
        if let Some(dark) = &scheme.dark {
            dark.validate()
                .map_err(|e| RequestValidationError::new("INVALID_COLOR", first_message(&e)))?;
        }

        if self.asset_manifest.images.is_empty() {
            return Err(RequestValidationError::new(
                "MISSING_ASSETS",
                "Asset manifest must contain at least one image",
            ));
        }

        Ok(())
    }

    /// Content context, for requests that already passed [`check`](Self::check).
    pub fn content(&self) -> Option<&ContentContext> {
        self.content_context.as_ref()
    }

    pub fn design(&self) -> Option<&DesignRequirements> {
        self.design_requirements.as_ref()
    }

    pub fn color_scheme(&self) -> Option<&ColorScheme> {
        self.design().and_then(|d| d.color_scheme.as_ref())
    }
}

/// Flattens `validator` errors into the first human-readable message.
fn first_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| format!("{}: {}", field, m))
                    .unwrap_or_else(|| format!("{}: invalid", field))
            })
        })
        .min()
        .unwrap_or_else(|| "invalid value".to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::request;
    use super::*;

    #[test]
    fn test_valid_request_passes() {
        assert!(request(3, 200).check().is_ok());
    }

    #[test]
    fn test_missing_content_context() {
        let mut req = request(1, 100);
        req.content_context = None;
        assert_eq!(req.check().unwrap_err().code, "MISSING_CONTENT_CONTEXT");
    }

    #[test]
    fn test_missing_design_requirements() {
        let mut req = request(1, 100);
        req.design_requirements = None;
        assert_eq!(req.check().unwrap_err().code, "MISSING_DESIGN_REQUIREMENTS");
    }

    #[test]
    fn test_missing_subject() {
        let mut req = request(1, 100);
        req.content_context.as_mut().unwrap().subject = "  ".to_string();
        let err = req.check().unwrap_err();
        assert_eq!(err.code, "MISSING_SUBJECT");
        assert_eq!(err.to_string(), "Email subject is required");
    }

    #[test]
    fn test_missing_body() {
        let mut req = request(1, 100);
        req.content_context.as_mut().unwrap().body = None;
        assert_eq!(req.check().unwrap_err().code, "MISSING_BODY");
    }

    #[test]
    fn test_missing_primary_cta() {
        let mut req = request(1, 100);
        req.content_context.as_mut().unwrap().calls_to_action.clear();
        assert_eq!(req.check().unwrap_err().code, "MISSING_PRIMARY_CTA");
    }

    #[test]
    fn test_invalid_cta_url() {
        let mut req = request(1, 100);
        req.content_context.as_mut().unwrap().calls_to_action[0].url = "javascript:void(0)".into();
        assert_eq!(req.check().unwrap_err().code, "INVALID_CTA");
    }

    #[test]
    fn test_missing_color_scheme() {
        let mut req = request(1, 100);
        req.design_requirements.as_mut().unwrap().color_scheme = None;
        assert_eq!(req.check().unwrap_err().code, "MISSING_COLOR_SCHEME");
    }

    #[test]
    fn test_invalid_color() {
        let mut req = request(1, 100);
        req.design_requirements
            .as_mut()
            .unwrap()
            .color_scheme
            .as_mut()
            .unwrap()
            .primary = "blue".to_string();
        let err = req.check().unwrap_err();
        assert_eq!(err.code, "INVALID_COLOR");
        assert!(err.message.contains("primary"));
    }

    #[test]
    fn test_missing_assets() {
        let req = request(0, 100);
        assert_eq!(req.check().unwrap_err().code, "MISSING_ASSETS");
    }

    #[test]
    fn test_campaign_type_unknown_deserializes_to_other() {
        let parsed: CampaignType = serde_json::from_str("\"flash_sale\"").unwrap();
        assert_eq!(parsed, CampaignType::Other);
        let parsed: CampaignType = serde_json::from_str("\"newsletter\"").unwrap();
        assert_eq!(parsed, CampaignType::Newsletter);
    }

    #[test]
    fn test_body_urgency_ignores_blank_lines() {
        let mut body = ContentBody::default();
        assert!(body.urgency().is_none());
        body.urgency_elements = Some(vec!["  ".to_string()]);
        assert!(body.urgency().is_none());
        body.urgency_elements = Some(vec!["Ends tonight".to_string()]);
        assert_eq!(body.urgency().unwrap().len(), 1);
    }
}
