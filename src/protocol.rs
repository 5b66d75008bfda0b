//! Classification of client responses.
//!
//! The client is line oriented. After each command it prints a block of
//! status lines and then its prompt. These functions inspect one block and
//! decide whether the command succeeded.
//!
//! Typical search response:
//!
//! ```text
//! Sent searchRequest.
//! Received SearchResponse.
//! Search was a success.
//! Number of hits: 12, setno 1
//! records returned: 0
//! Elapsed: 0.214325
//! ```

use crate::error::{EngineError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HITS_LINE: Regex = Regex::new(r"Number of hits:\s*([^,]*)").unwrap();
}

const CONNECT_ACCEPTED: &str = "Connection accepted";

const CONNECT_FAILURES: &[&str] = &[
    "Connection rejected",
    "Connecting...error",
    "Could not resolve address",
    "Connect failed",
    "Unable to connect",
];

const SEARCH_FAILURES: &[&str] = &[
    "Search was a bloomin' failure",
    "Search was a failure",
    "Diagnostic message",
    "Target closed connection",
    "Connection closed",
    "Not connected",
];

const SEARCH_SUCCESS: &[&str] = &["Search was a success", "Received SearchResponse"];

const PRESENT_OUT_OF_RANGE: &str = "Present request out of range";

const PRESENT_FAILURES: &[&str] = &[
    "Target closed connection",
    "Connection closed",
    "Not connected",
    "No previous search",
];

fn find_line<'a>(lines: &'a [String], needles: &[&str]) -> Option<&'a str> {
    lines
        .iter()
        .find(|line| needles.iter().any(|n| line.contains(n)))
        .map(String::as_str)
}

/// Check the banner printed when the client connects.
///
/// # Errors
///
/// Returns [`EngineError::Connection`] if the target refused the connection
/// or no acceptance banner was printed.
pub fn check_connect(server: &str, lines: &[String]) -> Result<()> {
    if let Some(line) = find_line(lines, CONNECT_FAILURES) {
        return Err(EngineError::connection(server, line.trim()));
    }
    if find_line(lines, &[CONNECT_ACCEPTED]).is_some() {
        return Ok(());
    }
    Err(EngineError::connection(
        server,
        "no connection banner from target",
    ))
}

/// Extract the hit count from a search response.
///
/// A response with no hits line but an explicit success indicator means zero
/// hits.
///
/// # Errors
///
/// Returns [`EngineError::Protocol`] if the server rejected the search, the
/// hits line is malformed, or the response is unrecognized.
pub fn parse_search_response(server: &str, lines: &[String]) -> Result<usize> {
    for line in lines {
        if let Some(caps) = HITS_LINE.captures(line) {
            let count = caps[1].trim();
            return count.parse().map_err(|_| {
                EngineError::protocol(
                    server,
                    format!("unable to parse number of hits from line: '{}'", line.trim()),
                )
            });
        }
    }
    if let Some(line) = find_line(lines, SEARCH_FAILURES) {
        return Err(EngineError::protocol(server, line.trim()));
    }
    if find_line(lines, SEARCH_SUCCESS).is_some() {
        return Ok(0);
    }
    Err(EngineError::protocol(server, "unrecognized search response"))
}

/// Validate a `show` response and return the raw record text.
///
/// # Errors
///
/// Returns [`EngineError::Bounds`] if the server reports the position is out
/// of range and [`EngineError::Protocol`] if the connection is gone.
pub fn check_present_response(
    server: &str,
    index: usize,
    hits: usize,
    lines: &[String],
) -> Result<String> {
    if find_line(lines, &[PRESENT_OUT_OF_RANGE]).is_some() {
        return Err(EngineError::Bounds { index, hits });
    }
    if let Some(line) = find_line(lines, PRESENT_FAILURES) {
        return Err(EngineError::protocol(server, line.trim()));
    }
    Ok(lines.join("\n"))
}
