//! Turns raw input lines into buffer entries and variable updates.

use std::time::Instant;

use crate::nav::{Session, Transition};
use crate::store::{Timestamp, VariableUpdate};

pub const DEFAULT_PREFIX: &str = ".";
pub const DEFAULT_DELIMITER: &str = "=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    Plain,
    Variable { name: &'a str, value: &'a str },
}

impl ParsedLine<'_> {
    pub fn into_update(self) -> Option<VariableUpdate> {
        match self {
            ParsedLine::Plain => None,
            ParsedLine::Variable { name, value } => {
                Some(VariableUpdate { name: name.to_string(), value: value.to_string() })
            }
        }
    }
}

/// Recognizes `<prefix><name><delimiter><value>` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineParser {
    prefix: String,
    delimiter: String,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_DELIMITER)
    }
}

impl LineParser {
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), delimiter: delimiter.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Only the first delimiter splits, so values may contain it. Lines that
    /// do not match are plain text; nothing is ever rejected.
    pub fn parse<'a>(&self, line: &'a str) -> ParsedLine<'a> {
        if self.delimiter.is_empty() {
            return ParsedLine::Plain;
        }
        let Some(rest) = line.strip_prefix(self.prefix.as_str()) else {
            return ParsedLine::Plain;
        };
        match rest.split_once(self.delimiter.as_str()) {
            Some((name, value)) => ParsedLine::Variable { name, value },
            None => ParsedLine::Plain,
        }
    }
}

/// Applies parsed lines to a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    parser: LineParser,
}

impl Ingestor {
    pub fn new(parser: LineParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    /// Records `line` as having arrived at `received_at`.
    pub fn ingest(&self, session: &mut Session, line: String, received_at: Timestamp) -> Transition {
        let update = self.parser.parse(&line).into_update();
        session.record(line, update, received_at)
    }
}

/// Strips the line terminator (`\n` or `\r\n`) and decodes lossily.
pub fn decode_line(mut bytes: &[u8]) -> String {
    if bytes.ends_with(b"\n") {
        bytes = &bytes[..bytes.len() - 1];
    }
    if bytes.ends_with(b"\r") {
        bytes = &bytes[..bytes.len() - 1];
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Monotonic nanosecond clock shared by the input readers and the session.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { anchor: Instant::now() }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(Timestamp::MAX)
    }
}
