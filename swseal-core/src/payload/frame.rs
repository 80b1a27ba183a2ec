//! Framing codec for signed payloads
//!
//! A payload is a JSON array of metadata fields, a semicolon, and the script
//! body verbatim:
//!
//! ```text
//! ["sw.js",1000,"release notes","<base64 signature>"];self.addEventListener(...)
//! ```
//!
//! The metadata scanner is deliberately narrow: string fields are delimited by
//! the first quote after the opening one, so a field can never contain a quote
//! character (escaped or not). A signer that puts one in produces a payload
//! that does not parse, and therefore never verifies.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use thiserror::Error;

/// Framing errors. None of these ever reach a caller of the verifier; they
/// collapse to "invalid".
#[derive(Error, Debug)]
pub enum FrameError {
    /// Payload does not start with a metadata array
    #[error("payload does not start with a metadata array")]
    MissingPrefix,

    /// The metadata array is not closed by `];`
    #[error("malformed metadata framing at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    /// The isolated metadata array is not valid JSON
    #[error("metadata array is not valid JSON")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    /// Name, modification time and signature are mandatory
    #[error("metadata has {found} fields, at least 3 are required")]
    TooFewFields { found: usize },

    /// The trailing field must be the base64 signature string
    #[error("signature field is not a string")]
    SignatureNotText,
}

/// A single metadata field.
///
/// Integers and strings are kept apart so that re-serialising a parsed array
/// reproduces the exact bytes the signer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Number(i64),
    Text(String),
}

impl Field {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::Number(_) => None,
        }
    }

    /// Integer view: numbers as-is, strings when they hold a decimal integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Field::Number(n) => Some(*n),
            Field::Text(s) => s.parse().ok(),
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Number(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Number(n) => write!(f, "{n}"),
            Field::Text(s) => write_json_string(f, s),
        }
    }
}

/// A parsed payload: metadata fields and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fields: Vec<Field>,
    pub body: String,
}

impl Frame {
    pub fn parse(payload: &str) -> Result<Self, FrameError> {
        parse(payload)
    }

    /// Serialise back into payload text
    pub fn to_payload(&self) -> String {
        serialize(&self.fields, &self.body)
    }
}

/// Split a payload into its metadata fields and body.
pub fn parse(payload: &str) -> Result<Frame, FrameError> {
    let prefix_len = scan_metadata_prefix(payload.as_bytes())?;

    // prefix_len points just past the `;`
    let array = &payload[..prefix_len - 1];
    let fields: Vec<Field> =
        serde_json::from_str(array).map_err(|source| FrameError::Json { source })?;

    Ok(Frame {
        fields,
        body: payload[prefix_len..].to_string(),
    })
}

/// Canonical inverse of [`parse`]: the JSON array, a `;`, the body verbatim.
///
/// This is the exact byte sequence a signer signs once the signature field
/// has been removed.
pub fn serialize(fields: &[Field], body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 16 * fields.len() + 3);
    out.push('[');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Writing into a String cannot fail
        let _ = write!(out, "{field}");
    }
    out.push_str("];");
    out.push_str(body);
    out
}

/// Returns the length of the `[...];` prefix, separator included.
fn scan_metadata_prefix(bytes: &[u8]) -> Result<usize, FrameError> {
    if bytes.first() != Some(&b'[') {
        return Err(FrameError::MissingPrefix);
    }

    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            Some(b'"') => {
                // String field: everything up to the next quote
                let close = bytes[pos + 1..]
                    .iter()
                    .position(|&b| b == b'"')
                    .ok_or(FrameError::Malformed {
                        offset: pos,
                        reason: "unterminated string field",
                    })?;
                pos += close + 2;
            }
            Some(b'-' | b'0'..=b'9') => {
                let start = pos;
                if bytes[pos] == b'-' {
                    pos += 1;
                }
                let digits = bytes[pos..].iter().take_while(|b| b.is_ascii_digit()).count();
                if digits == 0 {
                    return Err(FrameError::Malformed {
                        offset: start,
                        reason: "expected digits",
                    });
                }
                pos += digits;
            }
            _ => {
                return Err(FrameError::Malformed {
                    offset: pos,
                    reason: "expected a string or integer field",
                })
            }
        }

        match bytes.get(pos) {
            Some(b',') => pos += 1,
            Some(b']') => break,
            _ => {
                return Err(FrameError::Malformed {
                    offset: pos,
                    reason: "expected ',' or ']'",
                })
            }
        }
    }

    if bytes.get(pos + 1) != Some(&b';') {
        return Err(FrameError::Malformed {
            offset: pos + 1,
            reason: "metadata array must be followed by ';'",
        });
    }

    Ok(pos + 2)
}

/// JSON string encoding with the same escapes a browser's `JSON.stringify`
/// produces, so both sides of the signature agree on the bytes.
fn write_json_string<W: fmt::Write>(out: &mut W, s: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\u{08}' => out.write_str("\\b")?,
            '\u{0c}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
