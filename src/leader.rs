//! Record leader handling for retrieved records.
//!
//! The leader is the 24-byte fixed header of an ISO 2709 record. The protocol
//! client prints it as the first line of a record dump; when present it is kept
//! on the [`StructuredRecord`](crate::record::StructuredRecord) so that an
//! exported `.mrc` file reflects the server's record type and level. Records
//! without a leader line get [`Leader::default`].
//!
//! # Structure
//!
//! - Positions 0-4: Record length (5 digits)
//! - Position 5: Record status
//! - Position 6: Record type
//! - Position 7: Bibliographic level
//! - Position 8: Control record type
//! - Position 9: Character coding (space = MARC-8, a = UTF-8)
//! - Position 10: Indicator count (always 2 here)
//! - Position 11: Subfield code count (always 2 here)
//! - Positions 12-16: Base address of data (5 digits)
//! - Positions 17-19: Encoding level, cataloging form, multipart level
//! - Positions 20-23: Entry map (usually "4500")

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Length of a serialized leader.
pub const LEADER_LEN: usize = 24;

/// Record leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// Record length (5 digits) - positions 0-4
    pub record_length: u32,
    /// Record status (1 char) - position 5
    pub record_status: char,
    /// Type of record (1 char) - position 6
    pub record_type: char,
    /// Bibliographic level (1 char) - position 7
    pub bibliographic_level: char,
    /// Type of control record (1 char) - position 8
    pub control_record_type: char,
    /// Character coding scheme (1 char) - position 9
    pub character_coding: char,
    /// Base address of data (5 digits) - positions 12-16
    pub data_base_address: u32,
    /// Encoding level (1 char) - position 17
    pub encoding_level: char,
    /// Cataloging form (1 char) - position 18
    pub cataloging_form: char,
    /// Multipart resource record level (1 char) - position 19
    pub multipart_level: char,
    /// Entry map (4 chars) - positions 20-23
    pub entry_map: String,
}

impl Default for Leader {
    /// A new, full-level monograph record in UTF-8.
    fn default() -> Self {
        Leader {
            record_length: 0,
            record_status: 'n',
            record_type: 'a',
            bibliographic_level: 'm',
            control_record_type: ' ',
            character_coding: 'a',
            data_base_address: 0,
            encoding_level: ' ',
            cataloging_form: 'a',
            multipart_level: ' ',
            entry_map: "4500".to_string(),
        }
    }
}

impl Leader {
    /// Recognize a leader line in a client record dump.
    ///
    /// Returns `None` unless the line (trailing whitespace removed except for
    /// padding up to 24 characters) starts with a 5-digit length and carries
    /// `22` at positions 10-11, which is what every MARC 21 leader has.
    #[must_use]
    pub fn from_dump_line(line: &str) -> Option<Self> {
        let bytes = line.as_bytes();
        if bytes.len() < LEADER_LEN || !line.is_ascii() {
            return None;
        }
        if !bytes[..5].iter().all(u8::is_ascii_digit) || &bytes[10..12] != b"22" {
            return None;
        }
        Self::from_bytes(&bytes[..LEADER_LEN]).ok()
    }

    /// Parse leader from 24 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are too short or a numeric field is malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEADER_LEN {
            return Err(EngineError::Parse(format!(
                "Leader must be at least 24 bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Leader {
            record_length: parse_digits(&bytes[0..5])?,
            record_status: bytes[5] as char,
            record_type: bytes[6] as char,
            bibliographic_level: bytes[7] as char,
            control_record_type: bytes[8] as char,
            character_coding: bytes[9] as char,
            data_base_address: parse_digits(&bytes[12..17])?,
            encoding_level: bytes[17] as char,
            cataloging_form: bytes[18] as char,
            multipart_level: bytes[19] as char,
            entry_map: String::from_utf8_lossy(&bytes[20..24]).to_string(),
        })
    }

    /// Serialize leader to 24 bytes.
    ///
    /// Lengths above 99999 cannot be represented and are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Export`] if the leader values are invalid for
    /// serialization.
    pub fn as_bytes(&self) -> Result<Vec<u8>> {
        if self.record_length > 99_999 || self.data_base_address > 99_999 {
            return Err(EngineError::Export(format!(
                "Record length {} or base address {} exceeds the 5-digit leader limit",
                self.record_length, self.data_base_address
            )));
        }
        let entry_map = self.entry_map.as_bytes();
        if entry_map.len() != 4 {
            return Err(EngineError::Export(format!(
                "Entry map must be 4 characters, got {}",
                entry_map.len()
            )));
        }

        let mut bytes = Vec::with_capacity(LEADER_LEN);
        bytes.extend_from_slice(format!("{:05}", self.record_length).as_bytes());
        bytes.push(ascii_or_space(self.record_status));
        bytes.push(ascii_or_space(self.record_type));
        bytes.push(ascii_or_space(self.bibliographic_level));
        bytes.push(ascii_or_space(self.control_record_type));
        bytes.push(ascii_or_space(self.character_coding));
        bytes.extend_from_slice(b"22");
        bytes.extend_from_slice(format!("{:05}", self.data_base_address).as_bytes());
        bytes.push(ascii_or_space(self.encoding_level));
        bytes.push(ascii_or_space(self.cataloging_form));
        bytes.push(ascii_or_space(self.multipart_level));
        bytes.extend_from_slice(entry_map);

        Ok(bytes)
    }
}

fn ascii_or_space(c: char) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        b' '
    }
}

/// Parse 5-digit ASCII number from bytes
fn parse_digits(bytes: &[u8]) -> Result<u32> {
    let s = String::from_utf8_lossy(bytes);
    s.trim()
        .parse::<u32>()
        .map_err(|_| EngineError::Parse(format!("Invalid numeric leader field: '{s}'")))
}
