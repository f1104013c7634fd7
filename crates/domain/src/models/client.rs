//! Email client rule table.
//!
//! Every client-specific behavior in the pipeline is looked up here, so a new
//! client is one more [`ClientRules`] record rather than a new branch in each
//! transform.

use serde::{Deserialize, Serialize};

/// Email clients the pipeline knows how to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailClient {
    Outlook,
    Gmail,
    AppleMail,
    Yahoo,
}

impl EmailClient {
    pub const ALL: [EmailClient; 4] = [
        EmailClient::Outlook,
        EmailClient::Gmail,
        EmailClient::AppleMail,
        EmailClient::Yahoo,
    ];

    pub fn rules(&self) -> &'static ClientRules {
        match self {
            EmailClient::Outlook => &OUTLOOK,
            EmailClient::Gmail => &GMAIL,
            EmailClient::AppleMail => &APPLE_MAIL,
            EmailClient::Yahoo => &YAHOO,
        }
    }
}

impl std::fmt::Display for EmailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailClient::Outlook => write!(f, "outlook"),
            EmailClient::Gmail => write!(f, "gmail"),
            EmailClient::AppleMail => write!(f, "apple_mail"),
            EmailClient::Yahoo => write!(f, "yahoo"),
        }
    }
}

/// How a client applies dark mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DarkModeMethod {
    /// Honors `prefers-color-scheme` media queries.
    MediaQuery,
    /// Inverts light backgrounds only.
    PartialInversion,
    /// Inverts every color regardless of author intent.
    FullInversion,
    None,
}

/// Transforms applied to the intermediate markup before compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupTransform {
    /// Tag every section with a table-layout css class.
    SectionTableClass,
    /// Replace hero banners with a plain image + text section.
    HeroToSection,
    /// Add a mobile media query when the head has none.
    MobileMediaQuery,
}

/// Transforms applied to compiled HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HtmlTransform {
    /// Wrap body content in `<!--[if mso]>` table shims.
    MsoTableWrapper,
}

/// A CSS declaration a client does not render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnsupportedCss {
    pub property: &'static str,
    /// Only this value (or its `inline-` variant) is unsupported.
    pub value: Option<&'static str>,
    pub code: &'static str,
    pub message: &'static str,
}

impl UnsupportedCss {
    const fn property(property: &'static str, code: &'static str, message: &'static str) -> Self {
        Self {
            property,
            value: None,
            code,
            message,
        }
    }

    const fn declaration(
        property: &'static str,
        value: &'static str,
        code: &'static str,
        message: &'static str,
    ) -> Self {
        Self {
            property,
            value: Some(value),
            code,
            message,
        }
    }
}

/// Rendering capabilities and workarounds of one client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientRules {
    pub client: EmailClient,
    pub display_name: &'static str,
    /// CSS features the client renders reliably, listed in compatibility reports.
    pub supported_css: &'static [&'static str],
    pub unsupported_css: &'static [UnsupportedCss],
    /// Elements outside [`RICH_ELEMENTS`] are always allowed.
    pub supported_elements: &'static [&'static str],
    /// HTML size after which the client clips or truncates the message.
    pub max_html_bytes: Option<usize>,
    pub max_image_width_px: u32,
    /// Client drops `<style>` blocks in some contexts; styles must be inlined.
    pub strips_style_blocks: bool,
    /// Client keeps `<style>` blocks only when they carry media queries.
    pub requires_guarded_styles: bool,
    pub dark_mode: DarkModeMethod,
    pub workarounds: &'static [&'static str],
    pub markup_transforms: &'static [MarkupTransform],
    pub html_transforms: &'static [HtmlTransform],
}

impl ClientRules {
    pub fn supports_element(&self, tag: &str) -> bool {
        !RICH_ELEMENTS.contains(&tag) || self.supported_elements.contains(&tag)
    }

    pub fn honors_dark_media_query(&self) -> bool {
        self.dark_mode == DarkModeMethod::MediaQuery
    }
}

/// Elements whose support differs between clients.
pub const RICH_ELEMENTS: &[&str] = &[
    "video", "audio", "picture", "source", "form", "input", "button", "iframe", "svg",
];

const COMMON_ELEMENTS: &[&str] = &[
    "table", "tr", "td", "th", "tbody", "thead", "div", "span", "p", "a", "img", "h1", "h2",
    "h3", "br", "strong", "em", "center",
];

pub static OUTLOOK: ClientRules = ClientRules {
    client: EmailClient::Outlook,
    display_name: "Outlook (Windows desktop)",
    supported_css: &["color", "background-color", "font-family", "font-size", "padding", "border"],
    unsupported_css: &[
        UnsupportedCss::declaration(
            "display",
            "flex",
            "OUTLOOK_FLEXBOX",
            "Outlook ignores flexbox layouts",
        ),
        UnsupportedCss::declaration(
            "display",
            "grid",
            "OUTLOOK_CSS_GRID",
            "Outlook ignores CSS grid layouts",
        ),
        UnsupportedCss::property(
            "background-size",
            "OUTLOOK_BACKGROUND_SIZE",
            "Outlook ignores background-size",
        ),
    ],
    supported_elements: COMMON_ELEMENTS,
    max_html_bytes: None,
    max_image_width_px: 600,
    strips_style_blocks: true,
    requires_guarded_styles: false,
    dark_mode: DarkModeMethod::FullInversion,
    workarounds: &[
        "Use tables for every layout block",
        "Use VML for background images and rounded buttons",
        "Set explicit width attributes on images",
    ],
    markup_transforms: &[MarkupTransform::SectionTableClass, MarkupTransform::HeroToSection],
    html_transforms: &[HtmlTransform::MsoTableWrapper],
};

pub static GMAIL: ClientRules = ClientRules {
    client: EmailClient::Gmail,
    display_name: "Gmail",
    supported_css: &[
        "color",
        "background-color",
        "font-family",
        "font-size",
        "padding",
        "border",
        "border-radius",
        "max-width",
        "@media",
    ],
    unsupported_css: &[],
    supported_elements: COMMON_ELEMENTS,
    max_html_bytes: Some(102 * 1024),
    max_image_width_px: 600,
    strips_style_blocks: true,
    requires_guarded_styles: true,
    dark_mode: DarkModeMethod::PartialInversion,
    workarounds: &[
        "Keep the HTML under 102KB to avoid clipping",
        "Inline styles for non-Gmail-account (GANGA) rendering",
    ],
    markup_transforms: &[MarkupTransform::MobileMediaQuery],
    html_transforms: &[],
};

pub static APPLE_MAIL: ClientRules = ClientRules {
    client: EmailClient::AppleMail,
    display_name: "Apple Mail",
    supported_css: &[
        "color",
        "background-color",
        "background-size",
        "font-family",
        "font-size",
        "padding",
        "border",
        "border-radius",
        "display:flex",
        "display:grid",
        "@media",
        "@font-face",
    ],
    unsupported_css: &[UnsupportedCss::declaration(
        "position",
        "fixed",
        "APPLE_MAIL_FIXED_POSITION",
        "Fixed positioning misbehaves in Apple Mail",
    )],
    supported_elements: &[
        "table", "tr", "td", "th", "tbody", "thead", "div", "span", "p", "a", "img", "h1", "h2",
        "h3", "br", "strong", "em", "center", "video", "audio", "picture", "source",
    ],
    max_html_bytes: None,
    max_image_width_px: 1200,
    strips_style_blocks: false,
    requires_guarded_styles: false,
    dark_mode: DarkModeMethod::MediaQuery,
    workarounds: &["Declare color-scheme meta tags to opt into dark mode"],
    markup_transforms: &[],
    html_transforms: &[],
};

pub static YAHOO: ClientRules = ClientRules {
    client: EmailClient::Yahoo,
    display_name: "Yahoo Mail",
    supported_css: &["color", "background-color", "font-family", "font-size", "padding", "@media"],
    unsupported_css: &[UnsupportedCss::declaration(
        "display",
        "grid",
        "YAHOO_CSS_GRID",
        "Yahoo Mail does not support CSS grid",
    )],
    supported_elements: COMMON_ELEMENTS,
    max_html_bytes: None,
    max_image_width_px: 600,
    strips_style_blocks: true,
    requires_guarded_styles: false,
    dark_mode: DarkModeMethod::PartialInversion,
    workarounds: &["Avoid CSS grid", "Prefix media-query classes to survive renaming"],
    markup_transforms: &[],
    html_transforms: &[],
};
