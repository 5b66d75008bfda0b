//! Structured bibliographic records produced by the parser.
//!
//! This module provides the record types handed to the presentation layer:
//! - [`StructuredRecord`]: Ordered sequence of data fields plus the leader
//! - [`Field`]: Tagged data field with two indicators
//! - [`Subfield`]: Coded data element within a field
//!
//! Only tags in the included range (010–899) are ever stored; the parser drops
//! everything else before a record is built.
//!
//! # Examples
//!
//! ```
//! use marcsearch::record::{Field, StructuredRecord};
//!
//! let mut record = StructuredRecord::default();
//! let mut field = Field::new("245", '1', '0');
//! field.add_subfield('a', "The Great Gatsby");
//! record.push_field(field);
//!
//! assert_eq!(record.title(), Some("The Great Gatsby"));
//! ```

use crate::leader::Leader;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;
use std::ops::RangeInclusive;

/// Tags retained in a [`StructuredRecord`].
pub const INCLUDED_TAGS: RangeInclusive<u16> = 10..=899;

/// Whether a numeric tag lies in the included range.
#[must_use]
pub fn is_included_tag(tag: u16) -> bool {
    INCLUDED_TAGS.contains(&tag)
}

/// A parsed bibliographic record.
///
/// Fields keep the order in which they appeared in the raw dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Leader printed by the server, or the default leader
    pub leader: Leader,
    fields: Vec<Field>,
}

/// A data field (tags 010–899).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field tag (3 digits)
    pub tag: String,
    /// First indicator
    pub indicator1: char,
    /// Second indicator
    pub indicator2: char,
    /// Subfields in source order
    pub subfields: SmallVec<[Subfield; 4]>,
}

/// A subfield within a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    /// Subfield code (single character)
    pub code: char,
    /// Subfield value
    pub value: String,
}

impl StructuredRecord {
    /// Create an empty record with the given leader.
    #[must_use]
    pub fn new(leader: Leader) -> Self {
        StructuredRecord {
            leader,
            fields: Vec::new(),
        }
    }

    /// Append a field, preserving insertion order.
    ///
    /// Fields whose tag is outside the included range are ignored so the
    /// record can never hold them.
    pub fn push_field(&mut self, field: Field) {
        if field.tag_number().is_some_and(is_included_tag) {
            self.fields.push(field);
        }
    }

    /// All fields in source order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Iterate over fields with a specific tag.
    pub fn fields_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    /// First field with the given tag.
    #[must_use]
    pub fn get_field(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Tags in source order.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.tag.as_str()).collect()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no included field survived parsing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Title proper (245 $a).
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get_field("245").and_then(|f| f.get_subfield('a'))
    }

    /// Main entry (first of 100, 110, 111 with a $a).
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        ["100", "110", "111"]
            .iter()
            .find_map(|tag| self.get_field(tag).and_then(|f| f.get_subfield('a')))
    }

    /// First ISBN (020 $a).
    #[must_use]
    pub fn isbn(&self) -> Option<&str> {
        self.get_field("020").and_then(|f| f.get_subfield('a'))
    }

    /// One-line `author / title` summary for result lists.
    #[must_use]
    pub fn summary_line(&self) -> String {
        match (self.author(), self.title()) {
            (Some(author), Some(title)) => format!("{author} / {title}"),
            (None, Some(title)) => title.to_string(),
            (Some(author), None) => author.to_string(),
            (None, None) => "[untitled]".to_string(),
        }
    }

    /// Render the record as `TAG II $a value $b value` lines.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        for field in &self.fields {
            let _ = write!(out, "{} {}{}", field.tag, field.indicator1, field.indicator2);
            for sf in &field.subfields {
                let _ = write!(out, " ${} {}", sf.code, sf.value);
            }
            out.push('\n');
        }
        out
    }
}

impl Field {
    /// Create a new data field
    #[must_use]
    pub fn new(tag: &str, indicator1: char, indicator2: char) -> Self {
        Field {
            tag: tag.to_string(),
            indicator1,
            indicator2,
            subfields: SmallVec::new(),
        }
    }

    /// Add a subfield
    pub fn add_subfield(&mut self, code: char, value: impl Into<String>) {
        self.subfields.push(Subfield {
            code,
            value: value.into(),
        });
    }

    /// Numeric value of the tag, if it is three digits.
    #[must_use]
    pub fn tag_number(&self) -> Option<u16> {
        if self.tag.len() == 3 && self.tag.bytes().all(|b| b.is_ascii_digit()) {
            self.tag.parse().ok()
        } else {
            None
        }
    }

    /// Get first value for a subfield code
    #[must_use]
    pub fn get_subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    /// Iterate over subfields with a specific code
    pub fn subfields_by_code(&self, code: char) -> impl Iterator<Item = &str> {
        self.subfields
            .iter()
            .filter(move |sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }
}
