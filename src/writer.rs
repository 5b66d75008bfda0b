//! Export of structured records to ISO 2709 (`.mrc`) files.
//!
//! This module provides [`MarcWriter`] for serializing [`StructuredRecord`]s
//! to the binary interchange format: a 24-byte leader, a directory of
//! 12-byte entries and the variable fields. Only the fields present on the
//! record are written, so exported files contain the included tag range
//! (010–899) only.
//!
//! # Examples
//!
//! ```
//! use marcsearch::record::{Field, StructuredRecord};
//! use marcsearch::writer::MarcWriter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut record = StructuredRecord::default();
//! let mut field = Field::new("245", '1', '0');
//! field.add_subfield('a', "Title");
//! record.push_field(field);
//!
//! let mut buffer = Vec::new();
//! MarcWriter::new(&mut buffer).write_record(&record)?;
//! assert_eq!(buffer.last(), Some(&0x1D));
//! # Ok(())
//! # }
//! ```

use crate::error::{EngineError, Result};
use crate::leader::LEADER_LEN;
use crate::record::StructuredRecord;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const FIELD_TERMINATOR: u8 = 0x1E;
const SUBFIELD_DELIMITER: u8 = 0x1F;
const RECORD_TERMINATOR: u8 = 0x1D;

/// Default filename stem when a record has no usable author or title.
const FALLBACK_NAME: &str = "MARC_Record";

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").unwrap();
    static ref UNSAFE_FILENAME: Regex = Regex::new(r"[^\w\s\-.]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Writer for ISO 2709 binary records.
#[derive(Debug)]
pub struct MarcWriter<W: Write> {
    writer: W,
    records_written: usize,
}

impl<W: Write> MarcWriter<W> {
    /// Create a new writer over any [`std::io::Write`] destination.
    pub fn new(writer: W) -> Self {
        MarcWriter {
            writer,
            records_written: 0,
        }
    }

    /// Serialize one record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Export`] if a field or the record is too large
    /// for the directory and leader lengths, or an I/O error if writing fails.
    pub fn write_record(&mut self, record: &StructuredRecord) -> Result<()> {
        let mut data_area = Vec::new();
        let mut directory = Vec::new();

        for field in record.fields() {
            let start = data_area.len();
            data_area.push(ascii_or_space(field.indicator1));
            data_area.push(ascii_or_space(field.indicator2));
            for subfield in &field.subfields {
                data_area.push(SUBFIELD_DELIMITER);
                let mut code = [0u8; 4];
                data_area.extend_from_slice(subfield.code.encode_utf8(&mut code).as_bytes());
                data_area.extend_from_slice(subfield.value.as_bytes());
            }
            data_area.push(FIELD_TERMINATOR);

            let length = data_area.len() - start;
            if length > 9999 || start > 99_999 {
                return Err(EngineError::Export(format!(
                    "Field {} does not fit in a directory entry",
                    field.tag
                )));
            }
            directory.extend_from_slice(field.tag.as_bytes());
            directory.extend_from_slice(format!("{length:04}").as_bytes());
            directory.extend_from_slice(format!("{start:05}").as_bytes());
        }
        directory.push(FIELD_TERMINATOR);

        let base_address = LEADER_LEN + directory.len();
        let record_length = base_address + data_area.len() + 1;

        let mut leader = record.leader.clone();
        leader.record_length = u32::try_from(record_length)
            .map_err(|_| EngineError::Export("Record length exceeds leader limit".to_string()))?;
        leader.data_base_address = u32::try_from(base_address)
            .map_err(|_| EngineError::Export("Base address exceeds leader limit".to_string()))?;

        self.writer.write_all(&leader.as_bytes()?)?;
        self.writer.write_all(&directory)?;
        self.writer.write_all(&data_area)?;
        self.writer.write_all(&[RECORD_TERMINATOR])?;

        self.records_written += 1;
        Ok(())
    }

    /// Flush the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }
}

fn ascii_or_space(c: char) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        b' '
    }
}

/// Write `record` to `path` as a single-record `.mrc` file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn export_record(record: &StructuredRecord, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = MarcWriter::new(BufWriter::new(file));
    writer.write_record(record)?;
    writer.finish()?;
    log::info!("MARC record saved to {}", path.display());
    Ok(path.to_path_buf())
}

/// Replace characters that are unsafe in filenames and collapse whitespace
/// to underscores; the result is at most `max_length` bytes.
#[must_use]
pub fn sanitize_filename(name: &str, max_length: usize) -> String {
    let forbidden: &[char] = if cfg!(windows) {
        &['<', '>', ':', '"', '/', '\\', '|', '?', '*']
    } else {
        &['/']
    };
    let replaced = name.replace(forbidden, "_");
    let cleaned = UNSAFE_FILENAME.replace_all(&replaced, "");
    let mut sanitized = WHITESPACE.replace_all(&cleaned, "_").into_owned();

    if sanitized.len() > max_length {
        let mut cut = max_length;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        while sanitized.ends_with('_') {
            sanitized.pop();
        }
    }
    sanitized
}

fn first_words(text: &str, count: usize) -> Option<String> {
    let cleaned = NON_WORD.replace_all(text, "");
    let words: Vec<&str> = cleaned.split_whitespace().take(count).collect();
    if words.is_empty() {
        None
    } else {
        Some(sanitize_filename(&words.join(" "), 255))
    }
}

/// Default export filename: `<author>_<title>.mrc` from the first three words
/// of the main entry and the first four words of the title.
#[must_use]
pub fn suggested_filename(record: &StructuredRecord) -> String {
    let author = record
        .author()
        .and_then(|a| first_words(a, 3))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let title = record
        .title()
        .and_then(|t| first_words(t, 4))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    format!("{}.mrc", sanitize_filename(&format!("{author}_{title}"), 251))
}
