//! Store interfaces
//!
//! The sync passes talk to the target database through the [`SessionStore`]
//! and [`ProgressStore`] traits so the replay and merge logic can be tested
//! against in-memory fakes. The production implementations live in
//! [`library`] and run inside one transaction per pass.

pub mod library;
pub mod tracker;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;

/// Window within which two sessions for the same user and book are
/// considered the same reading event
pub const DEDUP_WINDOW_SECS: i64 = 60;

/// Coarse format classification recorded on each session row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookType {
    Pdf,
    Cbx,
    Epub,
}

impl BookType {
    /// Classify from substring markers in the combined title and filepath.
    /// Anything without a recognized marker counts as an EPUB.
    pub fn classify(title: &str, filepath: &str) -> Self {
        let haystack = format!("{title}{filepath}").to_lowercase();
        if haystack.contains(".pdf") {
            Self::Pdf
        } else if haystack.contains(".cbz")
            || haystack.contains(".cbr")
            || haystack.contains(".cb7")
        {
            Self::Cbx
        } else {
            Self::Epub
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Cbx => "CBX",
            Self::Epub => "EPUB",
        }
    }
}

/// One reading session ready to insert into the target
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub book_id: i64,
    pub book_type: BookType,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_seconds: i64,
    /// 0-100 scale
    pub start_progress: f64,
    /// 0-100 scale
    pub end_progress: f64,
    pub progress_delta: f64,
    /// Provenance marker, `tracker:<document_id>`
    pub source_ref: String,
}

/// One progress row ready to write into the target
#[derive(Debug, Clone)]
pub struct ProgressUpsert {
    pub user_id: i64,
    pub book_id: i64,
    /// Opaque reader position token, passed through verbatim
    pub progress_token: Option<String>,
    /// 0-1 scale
    pub percent: f64,
    pub device: &'static str,
    pub device_id: Option<String>,
    /// `None` keeps the stored status on update and falls back to UNREAD
    /// on insert
    pub read_status: Option<&'static str>,
}

#[async_trait]
pub trait SessionStore: Send {
    /// Whether a session for this user and book already starts within
    /// [`DEDUP_WINDOW_SECS`] of `start_time`
    async fn recent_session_exists(
        &mut self,
        user_id: i64,
        book_id: i64,
        start_time: NaiveDateTime,
    ) -> Result<bool>;

    async fn insert_session(&mut self, session: &NewSession) -> Result<()>;
}

#[async_trait]
pub trait ProgressStore: Send {
    /// Stored progress for this user and book on the 0-1 scale, or `None`
    /// when no row exists yet
    async fn progress_percent(&mut self, user_id: i64, book_id: i64) -> Result<Option<f64>>;

    async fn update_progress(&mut self, row: &ProgressUpsert) -> Result<()>;

    async fn insert_progress(&mut self, row: &ProgressUpsert) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pdf_from_title() {
        assert_eq!(BookType::classify("manual.pdf", ""), BookType::Pdf);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(BookType::classify("Manual.PDF", ""), BookType::Pdf);
    }

    #[test]
    fn test_classify_comics_from_path() {
        assert_eq!(
            BookType::classify("", "/comics/issue-01.cbz"),
            BookType::Cbx
        );
        assert_eq!(
            BookType::classify("", "/comics/issue-02.cbr"),
            BookType::Cbx
        );
        assert_eq!(
            BookType::classify("", "/comics/issue-03.cb7"),
            BookType::Cbx
        );
    }

    #[test]
    fn test_classify_defaults_to_epub() {
        assert_eq!(BookType::classify("Dune", "/books/dune.epub"), BookType::Epub);
        assert_eq!(BookType::classify("", ""), BookType::Epub);
    }

    #[test]
    fn test_classify_pdf_marker_wins_over_epub_path() {
        // The marker scan runs over title and path together, pdf first
        assert_eq!(
            BookType::classify("scan.pdf backup", "/books/scan.epub"),
            BookType::Pdf
        );
    }

    #[test]
    fn test_book_type_as_str() {
        assert_eq!(BookType::Pdf.as_str(), "PDF");
        assert_eq!(BookType::Cbx.as_str(), "CBX");
        assert_eq!(BookType::Epub.as_str(), "EPUB");
    }
}
