//! Tiered book matching
//!
//! Resolves a tracker document to a library book id. Exact content-hash
//! equality wins outright, then a 16-character hash-prefix test, then a
//! weighted fuzzy score over title, author, filename, and short-id signals.
//! Resolution is pure: same document and same catalog always give the same
//! answer.

use tracing::debug;

use super::normalize::normalize_text;
use super::similarity::similarity;
use crate::catalog::{CatalogEntry, CatalogIndex};

/// Prefix length for the hash-prefix tier
const HASH_PREFIX_LEN: usize = 16;
/// Prefix length for the short-id fuzzy signals
const SHORT_HASH_PREFIX_LEN: usize = 8;
/// Minimum weighted score for a fuzzy match to be accepted
const MIN_FUZZY_SCORE: f64 = 40.0;

/// Identity signals for one tracker document
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub author: String,
    pub filepath: String,
    pub content_hash: String,
}

impl SourceDocument {
    /// Final path component, or the whole value when there is no separator
    fn filename(&self) -> &str {
        self.filepath.rsplit('/').next().unwrap_or("")
    }

    /// Best human-readable handle for log lines
    fn label(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Resolve a document against the catalog, returning the matched book id.
///
/// Ties on fuzzy score go to the lowest book id because the index is ordered
/// by ascending id and only a strictly greater score replaces the candidate.
pub fn resolve(doc: &SourceDocument, index: &CatalogIndex) -> Option<i64> {
    // Tier 1: exact content hash
    if !doc.content_hash.is_empty() {
        for entry in index.entries() {
            if entry.hashes.iter().any(|hash| hash == &doc.content_hash) {
                debug!(
                    book_id = entry.id,
                    title = %entry.title,
                    "Content hash match for '{}'",
                    doc.label()
                );
                return Some(entry.id);
            }
        }
    }

    let doc_id = doc.id.to_lowercase();

    // Tier 2: 16-char hash prefix, either direction. Shorter values skip the
    // tier entirely so a truncated id cannot claim a prefix match.
    if !doc_id.is_empty() {
        for entry in index.entries() {
            for hash in &entry.hashes {
                let hash = hash.to_lowercase();
                if doc_id.len() >= HASH_PREFIX_LEN
                    && hash.len() >= HASH_PREFIX_LEN
                    && shares_prefix(&doc_id, &hash, HASH_PREFIX_LEN)
                {
                    debug!(
                        book_id = entry.id,
                        title = %entry.title,
                        "Hash prefix match for '{}'",
                        doc.label()
                    );
                    return Some(entry.id);
                }
            }
        }
    }

    // Tier 3: weighted fuzzy score
    let filename = doc.filename();
    let id_hint = prefix(&doc_id, SHORT_HASH_PREFIX_LEN);

    let mut best_id = None;
    let mut best_score = 0.0_f64;

    for entry in index.entries() {
        let score = fuzzy_score(doc, filename, &doc_id, id_hint, entry);
        if score > best_score {
            best_score = score;
            best_id = Some(entry.id);
        }
    }

    match best_id {
        Some(book_id) if best_score >= MIN_FUZZY_SCORE => {
            debug!(
                book_id,
                score = format!("{best_score:.1}"),
                "Fuzzy match for '{}'",
                doc.label()
            );
            Some(book_id)
        }
        _ => None,
    }
}

/// Weighted fuzzy score of one document against one catalog entry
fn fuzzy_score(
    doc: &SourceDocument,
    filename: &str,
    doc_id_lower: &str,
    id_hint: &str,
    entry: &CatalogEntry,
) -> f64 {
    let mut score = 0.0;

    if !doc.title.is_empty() && !entry.title.is_empty() {
        let title_sim = similarity(&doc.title, &entry.title);
        if title_sim > 0.8 {
            score += title_sim * 50.0;
        }
    }

    if !doc.author.is_empty() && !entry.authors.is_empty() {
        let author_sim = similarity(&doc.author, &entry.authors);
        if author_sim > 0.5 {
            score += author_sim * 30.0;
        }
    }

    if !filename.is_empty() {
        // Best similarity across all of the entry's files, so a multi-format
        // book is judged by its closest file rather than its first.
        let best_filename_sim = entry
            .filenames
            .iter()
            .map(|name| similarity(filename, name))
            .fold(0.0, f64::max);
        if best_filename_sim > 0.6 {
            score += best_filename_sim * 40.0;
        }
    }

    if !doc_id_lower.is_empty() {
        if entry
            .filenames
            .iter()
            .any(|name| normalize_text(name).contains(id_hint))
        {
            score += 20.0;
        }

        if entry
            .hashes
            .iter()
            .any(|hash| shares_prefix(doc_id_lower, &hash.to_lowercase(), SHORT_HASH_PREFIX_LEN))
        {
            score += 30.0;
        }
    }

    score
}

/// First `n` characters of `s`, or all of it when shorter
fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Whether either string starts with the first `n` characters of the other
fn shares_prefix(a: &str, b: &str, n: usize) -> bool {
    a.starts_with(prefix(b, n)) || b.starts_with(prefix(a, n))
}

// ============================================================================
// Tests
// ============================================================================
