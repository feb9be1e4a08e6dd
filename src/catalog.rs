//! Catalog index
//!
//! Per-cycle snapshot of the library manager's catalog: one entry per
//! non-deleted book with its aggregated identity signals. Built fresh at the
//! start of every sync cycle and never mutated afterwards, so resolver
//! results are stable for the whole cycle.

/// One row of the catalog query, with GROUP_CONCAT'd signal columns
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogRow {
    pub book_id: i64,
    pub title: Option<String>,
    /// Comma-joined author names
    pub authors: Option<String>,
    /// `|`-separated filenames
    pub filenames: Option<String>,
    /// `|`-separated content hashes
    pub hashes: Option<String>,
}

/// One book with its aggregated identity signals
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    /// Joined display string, compared against the source author as a whole
    pub authors: String,
    pub filenames: Vec<String>,
    pub hashes: Vec<String>,
}

/// Immutable per-cycle catalog snapshot, ordered by ascending book id
#[derive(Debug, Default)]
pub struct CatalogIndex {
    entries: Vec<CatalogEntry>,
}

impl CatalogIndex {
    /// Build the index from catalog query rows. Row order is preserved (the
    /// query orders by book id); empty filename and hash fragments are
    /// dropped so matching never has to guard against them.
    pub fn from_rows(rows: Vec<CatalogRow>) -> Self {
        let entries = rows
            .into_iter()
            .map(|row| CatalogEntry {
                id: row.book_id,
                title: row.title.unwrap_or_default(),
                authors: row.authors.unwrap_or_default(),
                filenames: split_concat(row.filenames),
                hashes: split_concat(row.hashes),
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by book id, for log labels
    pub fn get(&self, id: i64) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }
}

/// Split a `|`-separated GROUP_CONCAT value, dropping empty fragments
fn split_concat(value: Option<String>) -> Vec<String> {
    match value {
        Some(joined) => joined
            .split('|')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}
