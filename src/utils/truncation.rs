/// Response bodies shown to a backend are capped at this many characters.
pub const MAX_BODY_EXCERPT: usize = 4_000;
pub const MAX_ERROR_LENGTH: usize = 2_000;

/// Cut `text` to at most `max` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}...", &text[..idx]),
    }
}

pub fn truncate_error(error: &str) -> String {
    truncate_chars(error, MAX_ERROR_LENGTH)
}
