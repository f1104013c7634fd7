//! Test data shared by the service tests.

use domain::models::{
    Asset, AssetManifest, CallToAction, CampaignType, ColorScheme, CompiledTemplate, ContentBody,
    ContentContext, DesignRequirements, GenerationRequest, LayoutType, PerformanceMetrics,
    RenderedEmail,
};
use persistence::entities::CachedGeneration;

/// A valid request with `images` product photos.
pub fn request(images: usize) -> GenerationRequest {
    GenerationRequest {
        content_context: Some(ContentContext {
            subject: "Spring collection is here".to_string(),
            preheader: "Fresh picks for the new season".to_string(),
            body: Some(ContentBody {
                opening: "Hello there".to_string(),
                main_content: "Our spring line has landed with new colors and fabrics."
                    .to_string(),
                benefits: vec![],
                social_proof: None,
                urgency_elements: None,
                closing: None,
            }),
            calls_to_action: vec![CallToAction {
                text: "Shop now".to_string(),
                url: "https://shop.example.com/spring".to_string(),
            }],
            campaign_type: CampaignType::Other,
            target_audience: None,
            brand_name: Some("Acme".to_string()),
            footer_text: None,
            unsubscribe_url: Some("https://shop.example.com/unsubscribe".to_string()),
        }),
        design_requirements: Some(DesignRequirements {
            color_scheme: Some(ColorScheme {
                primary: "#0055ff".to_string(),
                accent: "#ff6600".to_string(),
                background: "#ffffff".to_string(),
                text: "#333333".to_string(),
                dark: None,
            }),
            ..DesignRequirements::default()
        }),
        asset_manifest: AssetManifest {
            images: (0..images)
                .map(|n| Asset {
                    url: format!("https://cdn.example.com/img/{}.jpg", n),
                    alt_text: format!("Product photo {}", n),
                    width: Some(600),
                })
                .collect(),
        },
        template_design: None,
        campaign_id: Some("spring-2026".to_string()),
    }
}

/// A stored pipeline result wrapping `markup`.
pub fn generation(markup: &str) -> CachedGeneration {
    let template = CompiledTemplate::new(markup.to_string(), LayoutType::Minimal, 1, 0);
    let html = format!("<html>{}</html>", markup);
    let email = RenderedEmail {
        template_id: template.id,
        byte_size: html.len(),
        html,
        css: String::new(),
        render_duration_ms: 1,
        warnings: Vec::new(),
        dark_mode: false,
    };
    CachedGeneration {
        metrics: PerformanceMetrics::measure(&email.html),
        template,
        email: Some(email),
        validation: None,
    }
}
