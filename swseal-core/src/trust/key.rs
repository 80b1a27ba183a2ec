//! The fixed public key payloads are verified against
//!
//! Loaded once when the loader is built and shared read-only afterwards.
//! Keys are exchanged as JWK so the same material works for browser and
//! native signers.

use crate::trust::error::KeyError;
use p384::ecdsa::VerifyingKey;
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::PublicKey;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Key material shipped with the loader. Replace it (or configure
/// `public_key`) before deploying, otherwise nothing you sign will verify.
pub const EMBEDDED_PUBLIC_JWK: &str = r#"{"kty":"EC","crv":"P-384","x":"f_sk32qcccaM-_dQwBLBfG--_HmmcayK4zRV8mF_BoLNnIAKUImnlBOlPLteBUhn","y":"2CsW_CSFnZA5BvDghFmZvTOwicbFujQxv2ZrW1fNWV_U6-72Y1IAFFks2ty4y13a"}"#;

/// ECDSA P-384 verification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustKey {
    public: PublicKey,
}

impl TrustKey {
    /// The key compiled into the loader
    pub fn embedded() -> Result<Self, KeyError> {
        Self::from_jwk_str(EMBEDDED_PUBLIC_JWK)
    }

    pub fn from_jwk_str(jwk: &str) -> Result<Self, KeyError> {
        let public = PublicKey::from_jwk_str(jwk).map_err(|_| KeyError::InvalidJwk)?;
        Ok(Self { public })
    }

    pub fn from_jwk_file(path: &Path) -> Result<Self, KeyError> {
        let jwk = std::fs::read_to_string(path).map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let key = Self::from_jwk_str(jwk.trim())?;
        debug!("Loaded public key {} from {}", key.fingerprint(), path.display());
        Ok(key)
    }

    pub fn from_public_key(public: PublicKey) -> Self {
        Self { public }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.public)
    }

    pub fn to_jwk_string(&self) -> String {
        self.public.to_jwk_string()
    }

    /// Short identifier for logs: SHA-256 over the compressed SEC1 point
    pub fn fingerprint(&self) -> String {
        let point = self.public.to_encoded_point(true);
        let digest = Sha256::digest(point.as_bytes());
        hex::encode(&digest[..8])
    }
}
