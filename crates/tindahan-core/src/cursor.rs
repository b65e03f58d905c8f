//! # Sync Cursor
//!
//! Opaque token bounding a pull to "changes since".
//!
//! ## Encoding
//! ```text
//! "v1:1718000000123456"
//!   │  └── max updated_at (unix µs) actually returned by a previous pull
//!   └───── format version
//! ```
//!
//! The value is always taken from returned records, never from the clock,
//! so a row committed while a pull is running is picked up by the next one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock;
use crate::error::ValidationError;

const PREFIX: &str = "v1:";

/// Position in the change stream, in unix microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncCursor(i64);

impl SyncCursor {
    /// The beginning of time: a pull from here returns everything.
    pub const START: SyncCursor = SyncCursor(0);

    pub const fn from_micros(micros: i64) -> Self {
        SyncCursor(micros)
    }

    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        SyncCursor(clock::to_micros(ts))
    }

    pub const fn micros(&self) -> i64 {
        self.0
    }

    /// Parses an optional client-supplied token; absent or empty means START.
    pub fn parse_optional(token: Option<&str>) -> Result<Self, ValidationError> {
        match token.map(str::trim) {
            None | Some("") => Ok(SyncCursor::START),
            Some(token) => token.parse(),
        }
    }

    /// Moves forward to `ts` if it is later; never moves backwards.
    pub fn advance_to(&mut self, ts: DateTime<Utc>) {
        let micros = clock::to_micros(ts);
        if micros > self.0 {
            self.0 = micros;
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}", PREFIX, self.0)
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SyncCursor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| ValidationError::invalid_format("cursor", "unknown cursor version"))?;
        let micros: i64 = raw
            .parse()
            .map_err(|_| ValidationError::invalid_format("cursor", "not a timestamp"))?;
        if micros < 0 {
            return Err(ValidationError::invalid_format("cursor", "negative timestamp"));
        }
        Ok(SyncCursor(micros))
    }
}

impl Serialize for SyncCursor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for SyncCursor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse() {
        let cursor = SyncCursor::from_micros(1_718_000_000_123_456);
        assert_eq!(cursor.encode(), "v1:1718000000123456");
        assert_eq!("v1:1718000000123456".parse::<SyncCursor>().unwrap(), cursor);
    }

    #[test]
    fn test_missing_cursor_is_start() {
        assert_eq!(SyncCursor::parse_optional(None).unwrap(), SyncCursor::START);
        assert_eq!(SyncCursor::parse_optional(Some(" ")).unwrap(), SyncCursor::START);
    }

    #[test]
    fn test_garbage_cursor_is_rejected() {
        assert!("1718000000".parse::<SyncCursor>().is_err());
        assert!("v1:abc".parse::<SyncCursor>().is_err());
        assert!("v1:-5".parse::<SyncCursor>().is_err());
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let mut cursor = SyncCursor::from_micros(5_000_000);
        cursor.advance_to(clock::from_micros(1_000_000));
        assert_eq!(cursor.micros(), 5_000_000);
        cursor.advance_to(clock::from_micros(9_000_000));
        assert_eq!(cursor.micros(), 9_000_000);
    }
}
