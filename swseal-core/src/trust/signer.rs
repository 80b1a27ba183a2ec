//! Payload signing, the counterpart of [`crate::trust::SignatureVerifier`]
//!
//! Produces `[name,modifiedTime,...extras,signature];body` where the signature
//! is ECDSA P-384 over SHA-512 of `[name,modifiedTime,...extras];body`,
//! encoded as raw `r || s` in standard base64.

use crate::payload::{serialize, Field};
use crate::trust::error::KeyError;
use crate::trust::hasher::signature_digest;
use crate::trust::key::TrustKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use p384::ecdsa::signature::hazmat::PrehashSigner;
use p384::ecdsa::{Signature, SigningKey};
use p384::SecretKey;
use std::path::Path;

/// Holds a private key and signs payloads with it
pub struct PayloadSigner {
    secret: SecretKey,
}

impl PayloadSigner {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn from_jwk_str(jwk: &str) -> Result<Self, KeyError> {
        let secret = SecretKey::from_jwk_str(jwk).map_err(|_| KeyError::InvalidJwk)?;
        Ok(Self { secret })
    }

    pub fn from_jwk_file(path: &Path) -> Result<Self, KeyError> {
        let jwk = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_jwk_str(jwk.trim())
    }

    /// The matching verification key
    pub fn trust_key(&self) -> TrustKey {
        TrustKey::from_public_key(self.secret.public_key())
    }

    /// Sign `body` under the given metadata and return the framed payload
    pub fn sign(
        &self,
        name: &str,
        modified_time: i64,
        extras: &[Field],
        body: &str,
    ) -> Result<String, KeyError> {
        let mut fields = Vec::with_capacity(extras.len() + 3);
        fields.push(Field::from(name));
        fields.push(Field::Number(modified_time));
        fields.extend_from_slice(extras);

        let signature = self.sign_content(&serialize(&fields, body))?;
        fields.push(Field::Text(signature));

        Ok(serialize(&fields, body))
    }

    /// Detached signature over arbitrary signed content, base64 encoded
    pub fn sign_content(&self, content: &str) -> Result<String, KeyError> {
        let signing_key = SigningKey::from(&self.secret);
        let digest = signature_digest(content.as_bytes());
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|_| KeyError::Signing)?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }
}
