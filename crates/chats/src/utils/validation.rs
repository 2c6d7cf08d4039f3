//! Input validation helpers.

/// Trimmed text, or `None` when nothing but whitespace was given.
pub fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// The given glyph, or `default` when it is missing or blank.
pub fn emoji_or_default<'a>(emoji: Option<&'a str>, default: &'a str) -> &'a str {
    emoji.and_then(non_blank).unwrap_or(default)
}
