//! Text normalization for matching
//!
//! Canonicalizes titles, author strings, and filenames before comparison so
//! that punctuation, document extensions, and trailing hash tags do not
//! defeat otherwise-identical strings.

/// Extensions stripped from the end before comparison. Tested in order
/// against the progressively-stripped text, so a stacked suffix like
/// `name.pdf.epub` loses both.
const STRIP_EXTENSIONS: &[&str] = &[".epub", ".pdf", ".mobi", ".azw3", ".cbz", ".cbr", ".azw"];

/// Canonicalize free text for comparison: lowercase, strip known document
/// extensions, strip one trailing `[hexdigits]` tag, replace every
/// non-word/non-space character with a space, collapse whitespace, trim.
///
/// Total function: any input, including empty, yields a valid result.
pub fn normalize_text(text: &str) -> String {
    let mut text = text.trim().to_lowercase();

    for ext in STRIP_EXTENSIONS {
        if text.ends_with(ext) {
            text.truncate(text.len() - ext.len());
        }
    }

    let text = strip_trailing_hex_tag(&text);

    let replaced: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove one trailing `[abc123]` tag (lowercase hex digits only) together
/// with the whitespace around it. Filenames from download tools often carry
/// these.
fn strip_trailing_hex_tag(text: &str) -> &str {
    let trimmed = text.trim_end();
    let body = match trimmed.strip_suffix(']') {
        Some(body) => body,
        None => return text,
    };
    let open = match body.rfind('[') {
        Some(idx) => idx,
        None => return text,
    };
    let tag = &body[open + 1..];
    if tag.is_empty() || !tag.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return text;
    }
    body[..open].trim_end()
}

// ============================================================================
// Tests
// ============================================================================
