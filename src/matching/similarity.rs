//! String similarity scoring
//!
//! Normalized Levenshtein distance over normalized strings: 1.0 means
//! identical after normalization, 0.0 means nothing shared.

use super::normalize::normalize_text;

/// Similarity between two free-text strings in [0, 1].
///
/// Symmetric and reflexive. Inputs are normalized before comparison, so
/// `"Dune.epub"` and `"dune"` score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_text(a), &normalize_text(b))
}
