//! Trust system error types

use crate::payload::FrameError;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a payload fails verification.
///
/// These never leave the verifier as errors: [`crate::trust::SignatureVerifier::verify`]
/// logs them and reports "invalid".
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("payload framing is invalid: {0}")]
    Frame(#[from] FrameError),

    #[error("payload is named '{found}', expected '{expected}'")]
    WrongName { expected: String, found: String },

    #[error("modification time is missing or not an integer")]
    InvalidModifiedTime,

    /// Anti-downgrade check
    #[error("payload modified at {modified} is not newer than installed {min}")]
    Stale { modified: i64, min: i64 },

    #[error("signature is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("signature has the wrong length or encoding")]
    MalformedSignature,

    #[error("signature does not match the payload")]
    BadSignature,
}

impl VerifyError {
    /// Log failures that point at tampering rather than a broken download
    pub fn log_if_security_critical(&self) {
        match self {
            VerifyError::BadSignature
            | VerifyError::WrongName { .. }
            | VerifyError::Stale { .. } => {
                tracing::error!(target: "security", "PAYLOAD REJECTED: {}", self);
            }
            _ => {}
        }
    }
}

/// Public/private key loading errors
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("failed to read key file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key is not a valid P-384 JWK")]
    InvalidJwk,

    #[error("failed to sign payload")]
    Signing,
}
