// SPDX-License-Identifier: MIT

//! Append-only run-event journal entry.

use serde::{Deserialize, Serialize};

/// One row of the run-event journal. `seq` is globally unique, strictly
/// monotonic, and assigned by the store — never by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: i64,
    pub run_id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub ts: i64,
}

/// Parse an SSE `Last-Event-ID` (or `event_id` cursor) string into a
/// sequence number. Empty string means "no cursor" (0).
pub fn parse_event_id(s: &str) -> Result<i64, std::num::ParseIntError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse::<i64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cursor_is_zero() {
        assert_eq!(parse_event_id(""), Ok(0));
        assert_eq!(parse_event_id("  "), Ok(0));
    }

    #[test]
    fn parses_trimmed_integer() {
        assert_eq!(parse_event_id(" 42 "), Ok(42));
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_event_id("abc").is_err());
    }
}
