//! Common validation utilities.

use validator::ValidationError;

lazy_static::lazy_static! {
    /// `#rgb` or `#rrggbb`, case-insensitive.
    pub static ref HEX_COLOR_REGEX: regex::Regex =
        regex::Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap();
}

/// Validates that a color is a CSS hex color (`#fff` or `#ffffff`).
pub fn validate_hex_color(color: &str) -> Result<(), ValidationError> {
    if HEX_COLOR_REGEX.is_match(color.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("hex_color");
        err.message = Some(format!("Color '{}' must be a hex value like #1a1a1a", color).into());
        Err(err)
    }
}

/// Validates that a string is not empty once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that a link target is an absolute http(s) URL or a mail link.
pub fn validate_link_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") || url.starts_with("mailto:") {
        Ok(())
    } else {
        let mut err = ValidationError::new("link_url");
        err.message = Some("URL must start with http://, https:// or mailto:".into());
        Err(err)
    }
}

/// Lower-cases a hex color and expands the three digit shorthand.
///
/// Returns the input unchanged (trimmed, lower-cased) when it is not a hex color.
pub fn normalize_hex_color(color: &str) -> String {
    let color = color.trim().to_ascii_lowercase();
    if HEX_COLOR_REGEX.is_match(&color) && color.len() == 4 {
        let expanded: String = color[1..].chars().flat_map(|c| [c, c]).collect();
        format!("#{}", expanded)
    } else {
        color
    }
}
