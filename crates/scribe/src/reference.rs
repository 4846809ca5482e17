//! Parsing and normalization of private channel message links.
//!
//! Accepted form: `https://t.me/c/<channel_id>/<message_id>`, optionally with
//! trailing query data such as `?single`. The normalized key
//! (`t.me/c/<channel_id>/<message_id>`) is the idempotency key of a job.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ReferenceError;

static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://t\.me/c/(\d+)/(\d+)").unwrap());

/// Coordinates of one message in a private channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub channel_id: u64,
    pub message_id: u64,
}

impl SourceRef {
    /// The normalized idempotency key.
    pub fn key(&self) -> String {
        format!("t.me/c/{}/{}", self.channel_id, self.message_id)
    }

    /// Canonical link for display.
    pub fn url(&self) -> String {
        format!("https://{}", self.key())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for SourceRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_reference(s)
    }
}

/// Parses a raw reference into its channel/message coordinates.
///
/// A link found inside another URL's query string (the text before it ends
/// with `=`, `?` or `&`) is rejected rather than silently extracted.
pub fn parse_reference(raw: &str) -> Result<SourceRef, ReferenceError> {
    let raw = raw.trim();
    let caps = RE_LINK
        .captures(raw)
        .ok_or_else(|| ReferenceError::Unrecognized(raw.to_string()))?;

    let whole = caps.get(0).ok_or_else(|| ReferenceError::Unrecognized(raw.to_string()))?;
    let prefix = raw[..whole.start()].trim_end();
    if prefix.ends_with(['=', '?', '&']) {
        return Err(ReferenceError::Embedded(raw.to_string()));
    }

    let channel_id = parse_id(raw, &caps[1])?;
    let message_id = parse_id(raw, &caps[2])?;

    if channel_id == 0 {
        return Err(ReferenceError::ZeroId {
            reference: raw.to_string(),
            field: "channel id",
        });
    }
    if message_id == 0 {
        return Err(ReferenceError::ZeroId {
            reference: raw.to_string(),
            field: "message id",
        });
    }

    Ok(SourceRef {
        channel_id,
        message_id,
    })
}

// Ids are persisted as SQLite INTEGER, so they must fit an i64.
fn parse_id(raw: &str, digits: &str) -> Result<u64, ReferenceError> {
    digits
        .parse::<i64>()
        .ok()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| ReferenceError::OutOfRange(raw.to_string()))
}

/// A link-like token that failed validation during batch extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidToken {
    /// 1-based line number.
    pub line: usize,
    pub token: String,
    pub error: ReferenceError,
}

/// Result of extracting references from free-form text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    /// Valid references, de-duplicated by key, in first-occurrence order.
    pub references: Vec<(SourceRef, String)>,
    pub invalid: Vec<InvalidToken>,
}

impl ParsedBatch {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Extracts every link from `text`. Each whitespace-separated token that
/// mentions `t.me/` is validated; the raw token is kept alongside the parsed
/// reference.
pub fn references_from_text(text: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let mut seen = std::collections::HashSet::new();

    for (idx, line) in text.lines().enumerate() {
        for token in line.split_whitespace().filter(|t| t.contains("t.me/")) {
            match parse_reference(token) {
                Ok(reference) => {
                    if seen.insert(reference) {
                        batch.references.push((reference, token.to_string()));
                    }
                }
                Err(error) => batch.invalid.push(InvalidToken {
                    line: idx + 1,
                    token: token.to_string(),
                    error,
                }),
            }
        }
    }

    batch
}
