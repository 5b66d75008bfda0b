//! Parsing of textual record dumps into [`StructuredRecord`]s.
//!
//! The protocol client prints a retrieved record as one line per field:
//!
//! ```text
//! 01142cam  2200301 a 4500
//! 001 12345
//! 010    $a   2001012345
//! 245 14 $a The great Gatsby / $c F. Scott Fitzgerald.
//! 900    $a LOCAL
//! ```
//!
//! A field line is a 3-digit tag, a space, two indicator characters and then
//! `$`-prefixed subfields. An indicator cut short by the first `$` is blank.
//! Tags below 010 and at or above 900 are recognized but discarded, so they
//! never reach the record. A dump with no recognizable field line at all is a
//! [`EngineError::Parse`]; a dump whose only field lines are excluded tags
//! parses to an empty record.
//!
//! Subfield text from real servers is sometimes malformed. The parser repairs
//! what it can and logs what it changes:
//! - `$$` runs are removed up to the next `$`
//! - subfields with a non-alphanumeric code are skipped
//! - subfields with an empty value are skipped
//! - a field left with no subfields is not added

use crate::error::{EngineError, Result};
use crate::leader::Leader;
use crate::record::{is_included_tag, Field, StructuredRecord};
use log::{debug, trace};

/// Converts raw client record dumps into structured records.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcParser;

/// A line that looks like a field: tag and the text after it.
struct FieldLine<'a> {
    tag: &'a str,
    tag_number: u16,
    rest: &'a str,
}

impl MarcParser {
    /// Create a parser.
    #[must_use]
    pub fn new() -> Self {
        MarcParser
    }

    /// Parse one raw record dump.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] if the text contains no recognizable
    /// field line (for example, a response that is only server error text).
    pub fn parse(&self, raw: &str) -> Result<StructuredRecord> {
        let mut record = StructuredRecord::default();
        let mut recognized = 0usize;

        for line in raw.lines() {
            if let Some(field_line) = split_field_line(line) {
                recognized += 1;
                if !is_included_tag(field_line.tag_number) {
                    trace!("Dropping excluded tag {}", field_line.tag);
                    continue;
                }
                match build_field(&field_line, line) {
                    Some(field) => record.push_field(field),
                    None => debug!(
                        "No valid subfields found for tag {}. Field not added.",
                        field_line.tag
                    ),
                }
            } else if let Some(leader) = Leader::from_dump_line(line) {
                recognized += 1;
                record.leader = leader;
            } else if !line.trim().is_empty() {
                trace!("Skipping non-field line: '{line}'");
            }
        }

        if recognized == 0 {
            return Err(EngineError::Parse(
                "No recognizable field lines in record text".to_string(),
            ));
        }
        debug!(
            "Parsed record: {} of {recognized} field lines retained",
            record.len()
        );
        Ok(record)
    }
}

/// Parse one raw record dump with the default parser.
///
/// # Errors
///
/// See [`MarcParser::parse`].
pub fn parse(raw: &str) -> Result<StructuredRecord> {
    MarcParser::new().parse(raw)
}

fn split_field_line(line: &str) -> Option<FieldLine<'_>> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..3].iter().all(u8::is_ascii_digit) || bytes[3] != b' ' {
        return None;
    }
    let tag = &line[..3];
    let tag_number = tag.parse().ok()?;
    Some(FieldLine {
        tag,
        tag_number,
        rest: &line[4..],
    })
}

fn build_field(field_line: &FieldLine<'_>, original: &str) -> Option<Field> {
    let (indicator1, indicator2) = parse_indicators(field_line.rest);
    let content = match field_line.rest.find('$') {
        Some(pos) => &field_line.rest[pos..],
        None => "",
    };
    let content = remove_malformed_dollars(content.trim());

    let mut field = Field::new(field_line.tag, indicator1, indicator2);
    for part in content.split('$').skip(1) {
        let part = part.trim();
        let mut chars = part.chars();
        let Some(code) = chars.next() else {
            debug!("Empty subfield in line: '{original}'");
            continue;
        };
        if !code.is_ascii_alphanumeric() {
            debug!("Invalid subfield code '{code}' skipped in line: '{original}'");
            continue;
        }
        let value = chars.as_str().trim();
        if value.is_empty() {
            debug!("Incomplete subfield '{code}' skipped in line: '{original}'");
            continue;
        }
        field.add_subfield(code, value);
    }

    if field.subfields.is_empty() {
        None
    } else {
        Some(field)
    }
}

/// Indicators are the (at most two) characters ahead of the first `$`;
/// a missing one is blank.
fn parse_indicators(rest: &str) -> (char, char) {
    let before_subfields = rest.split('$').next().unwrap_or_default();
    let mut chars = before_subfields.chars();
    (chars.next().unwrap_or(' '), chars.next().unwrap_or(' '))
}

fn remove_malformed_dollars(content: &str) -> String {
    let mut content = content.to_string();
    while let Some(start) = content.find("$$") {
        match content[start + 2..].find('$') {
            Some(offset) => {
                let end = start + 2 + offset;
                debug!("Malformed '$$' removed: '{}'", &content[start..end]);
                content.replace_range(start..end, "");
            },
            None => {
                debug!("Malformed '$$' removed: '{}'", &content[start..]);
                content.truncate(start);
            },
        }
    }
    content
}
