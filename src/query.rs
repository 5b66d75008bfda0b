//! Search queries and the client commands built from them.
//!
//! A search is either by ISBN or by title and author together. Queries are
//! validated before any session is opened, then turned into the client's
//! prefix-query `find` command using Bib-1 use attributes:
//!
//! | Variant      | Command |
//! |--------------|---------|
//! | ISBN         | `find @attr 1=7 @attr 4=1 "<isbn>"` |
//! | Title+Author | `find @and @attr 1=4 @attr 4=1 "<title>" @attr 1=1003 @attr 4=1 "<author>"` |

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// One search invocation's query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchQuery {
    /// Search by ISBN (normalized, without hyphens or spaces)
    Isbn(String),
    /// Search by title and author combined
    TitleAuthor {
        /// Title words
        title: String,
        /// Author words
        author: String,
    },
}

impl SearchQuery {
    /// Build a validated ISBN query.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] if the checksum does not match.
    ///
    /// # Examples
    ///
    /// ```
    /// use marcsearch::SearchQuery;
    ///
    /// let query = SearchQuery::isbn("978-0-306-40615-7").unwrap();
    /// assert_eq!(query, SearchQuery::Isbn("9780306406157".to_string()));
    /// assert!(SearchQuery::isbn("0306406153").is_err());
    /// ```
    pub fn isbn(isbn: &str) -> Result<Self> {
        let normalized = IsbnValidator::normalize(isbn);
        if IsbnValidator::validate(&normalized) {
            Ok(SearchQuery::Isbn(normalized))
        } else {
            Err(EngineError::InvalidQuery(format!("invalid ISBN '{isbn}'")))
        }
    }

    /// Build a title and author query. Both must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidQuery`] if either part is blank.
    pub fn title_author(title: &str, author: &str) -> Result<Self> {
        let title = title.trim();
        let author = author.trim();
        if title.is_empty() || author.is_empty() {
            return Err(EngineError::InvalidQuery(
                "both title and author are required".to_string(),
            ));
        }
        Ok(SearchQuery::TitleAuthor {
            title: title.to_string(),
            author: author.to_string(),
        })
    }

    /// The client `find` command for this query.
    #[must_use]
    pub fn find_command(&self) -> String {
        match self {
            SearchQuery::Isbn(isbn) => {
                format!("find @attr 1=7 @attr 4=1 \"{}\"", quote_safe(isbn))
            },
            SearchQuery::TitleAuthor { title, author } => format!(
                "find @and @attr 1=4 @attr 4=1 \"{}\" @attr 1=1003 @attr 4=1 \"{}\"",
                quote_safe(title),
                quote_safe(author)
            ),
        }
    }
}

/// The client `show` command for a 1-based record position.
#[must_use]
pub fn show_command(index: usize) -> String {
    format!("show {index}")
}

fn quote_safe(term: &str) -> String {
    term.chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect()
}

/// ISBN checksum validation.
#[derive(Debug)]
pub struct IsbnValidator;

impl IsbnValidator {
    /// Validate an ISBN-10 checksum
    ///
    /// Digits are weighted 10 down to 1 and the sum must be divisible by 11.
    /// The check digit may be 'X' (representing 10).
    #[must_use]
    pub fn validate_isbn10(isbn: &str) -> bool {
        let clean = Self::normalize(isbn);
        if clean.len() != 10 {
            return false;
        }

        let mut sum = 0;
        for (i, ch) in clean.chars().enumerate() {
            let digit = if i == 9 && ch == 'X' {
                10
            } else if let Some(d) = ch.to_digit(10) {
                d
            } else {
                return false;
            };
            sum += digit * (10 - u32::try_from(i).unwrap_or(0));
        }

        sum % 11 == 0
    }

    /// Validate an ISBN-13 checksum
    ///
    /// Must start with 978 or 979; digits are weighted 1, 3, 1, 3, ... and the
    /// sum must be divisible by 10.
    #[must_use]
    pub fn validate_isbn13(isbn: &str) -> bool {
        let clean = Self::normalize(isbn);
        if clean.len() != 13 || !(clean.starts_with("978") || clean.starts_with("979")) {
            return false;
        }

        let mut sum = 0;
        for (i, ch) in clean.chars().enumerate() {
            let Some(digit) = ch.to_digit(10) else {
                return false;
            };
            sum += digit * if i % 2 == 0 { 1 } else { 3 };
        }

        sum % 10 == 0
    }

    /// Validate an ISBN (auto-detect ISBN-10 or ISBN-13)
    #[must_use]
    pub fn validate(isbn: &str) -> bool {
        let clean = Self::normalize(isbn);
        match clean.len() {
            10 => Self::validate_isbn10(&clean),
            13 => Self::validate_isbn13(&clean),
            _ => false,
        }
    }

    /// Remove dashes and spaces and upper-case a trailing 'x'.
    #[must_use]
    pub fn normalize(isbn: &str) -> String {
        isbn.trim().replace(['-', ' '], "").to_ascii_uppercase()
    }
}
