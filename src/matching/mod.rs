//! Book identity matching
//!
//! Nothing ties the tracker's documents and the library manager's books
//! together by key, so identity is inferred from content hashes, hash
//! prefixes, and fuzzy title/author/filename comparisons over normalized
//! text.

pub mod normalize;
pub mod resolver;
pub mod similarity;

pub use resolver::{resolve, SourceDocument};
