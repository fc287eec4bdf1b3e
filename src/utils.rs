//! Text normalization helpers shared by loaders and the normalization stage.

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Canonical form of a raw categorical code: trimmed, ASCII lower-cased,
/// `None` when empty.
pub fn normalize_code(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Canonical form of a taxonomy code: trimmed, ASCII upper-cased, `None` when empty.
pub fn normalize_taxonomy_code(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

/// Cleaned free-text value (labels from reference files), `None` when blank.
pub fn normalize_label(raw: Option<&str>) -> Option<String> {
    let normalized = normalize_inline_whitespace(raw?);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
