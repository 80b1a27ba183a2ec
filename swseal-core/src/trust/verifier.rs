//! Signature verification - the gate every payload passes before it runs
//!
//! Verification is fail-closed: framing errors, bad base64, wrong field
//! counts and signature mismatches all come back as "invalid". Only the
//! reason is logged.

use crate::payload::{Field, Frame, SignedMetadata};
use crate::trust::error::VerifyError;
use crate::trust::hasher::signature_digest;
use crate::trust::key::TrustKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use p384::ecdsa::signature::hazmat::PrehashVerifier;
use p384::ecdsa::{Signature, VerifyingKey};
use tracing::{debug, warn};

/// A payload that passed verification: metadata without the signature, and
/// the body to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub name: String,
    pub modified_time: i64,
    pub extras: Vec<Field>,
    pub body: String,
}

/// Verifies payloads against the fixed public key
#[derive(Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
    script_name: String,

    /// Debug origin only: every payload is accepted
    bypass: bool,
}

impl SignatureVerifier {
    pub fn new(key: &TrustKey, script_name: impl Into<String>) -> Self {
        Self {
            key: key.verifying_key(),
            script_name: script_name.into(),
            bypass: false,
        }
    }

    /// Skip signature checking entirely. Only the loader's debug origin
    /// turns this on.
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        if bypass {
            warn!(target: "security", "Signature verification is DISABLED (debug origin)");
        }
        self.bypass = bypass;
        self
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Verify a payload, optionally requiring it to be newer than
    /// `min_mod_time`. Returns the verified metadata and body, or `None`.
    pub fn verify(&self, payload: &str, min_mod_time: Option<i64>) -> Option<VerifiedPayload> {
        if self.bypass {
            return Some(self.unchecked(payload));
        }

        match self.check(payload, min_mod_time) {
            Ok(verified) => {
                debug!(
                    "Payload '{}' verified (modified {})",
                    verified.name, verified.modified_time
                );
                Some(verified)
            }
            Err(e) => {
                e.log_if_security_critical();
                warn!("Payload rejected: {}", e);
                None
            }
        }
    }

    pub fn is_valid(&self, payload: &str, min_mod_time: Option<i64>) -> bool {
        self.verify(payload, min_mod_time).is_some()
    }

    /// Full check with the failure reason
    pub fn check(
        &self,
        payload: &str,
        min_mod_time: Option<i64>,
    ) -> Result<VerifiedPayload, VerifyError> {
        let frame = Frame::parse(payload)?;
        let metadata = SignedMetadata::split(frame.fields)?;

        let name = metadata.name().unwrap_or_default();
        if name != self.script_name {
            return Err(VerifyError::WrongName {
                expected: self.script_name.clone(),
                found: name.to_string(),
            });
        }

        let modified = metadata
            .modified_time()
            .ok_or(VerifyError::InvalidModifiedTime)?;
        if let Some(min) = min_mod_time {
            if modified <= min {
                return Err(VerifyError::Stale { modified, min });
            }
        }

        let signature_bytes = STANDARD.decode(metadata.signature())?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| VerifyError::MalformedSignature)?;

        let signed = metadata.signed_content(&frame.body);
        let digest = signature_digest(signed.as_bytes());
        self.key
            .verify_prehash(&digest, &signature)
            .map_err(|_| VerifyError::BadSignature)?;

        Ok(VerifiedPayload {
            name: name.to_string(),
            modified_time: modified,
            extras: metadata.extras().to_vec(),
            body: frame.body,
        })
    }

    /// Bypass mode: take whatever metadata parses, run the payload as-is
    /// when nothing does
    fn unchecked(&self, payload: &str) -> VerifiedPayload {
        debug!("Signature check skipped (debug origin)");
        let parsed = Frame::parse(payload).ok().and_then(|frame| {
            let body = frame.body;
            SignedMetadata::split(frame.fields).ok().map(|m| (m, body))
        });

        match parsed {
            Some((metadata, body)) => VerifiedPayload {
                name: self.script_name.clone(),
                modified_time: metadata.modified_time().unwrap_or_default(),
                extras: metadata.extras().to_vec(),
                body,
            },
            None => VerifiedPayload {
                name: self.script_name.clone(),
                modified_time: 0,
                extras: Vec::new(),
                body: payload.to_string(),
            },
        }
    }
}
