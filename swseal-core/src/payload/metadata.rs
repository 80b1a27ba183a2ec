//! Typed view over the metadata fields of a signed payload
//!
//! `[name, modifiedTime, ...extras, signature]`

use super::frame::{serialize, Field, FrameError};

/// Metadata split into the signed part and the detached signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMetadata {
    /// Every field except the signature, in their original representation
    unsigned: Vec<Field>,
    signature: String,
}

impl SignedMetadata {
    /// Remove the trailing signature from a parsed field list
    pub fn split(mut fields: Vec<Field>) -> Result<Self, FrameError> {
        if fields.len() < 3 {
            return Err(FrameError::TooFewFields {
                found: fields.len(),
            });
        }

        let signature = match fields.pop() {
            Some(Field::Text(signature)) => signature,
            _ => return Err(FrameError::SignatureNotText),
        };

        Ok(SignedMetadata {
            unsigned: fields,
            signature,
        })
    }

    /// Script identifier, `None` when the first field is not a string
    pub fn name(&self) -> Option<&str> {
        self.unsigned.first().and_then(Field::as_text)
    }

    /// Signer-assigned modification time
    pub fn modified_time(&self) -> Option<i64> {
        self.unsigned.get(1).and_then(Field::as_integer)
    }

    /// Optional fields between the modification time and the signature
    pub fn extras(&self) -> &[Field] {
        &self.unsigned[2..]
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn unsigned_fields(&self) -> &[Field] {
        &self.unsigned
    }

    /// The bytes the signature was computed over
    pub fn signed_content(&self, body: &str) -> String {
        serialize(&self.unsigned, body)
    }
}
