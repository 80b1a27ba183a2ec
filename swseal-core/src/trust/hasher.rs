//! Hashing utilities for the trust system
//!
//! SHA-512 is the signature digest, SHA-256 feeds CSP hash sources and key
//! fingerprints.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256, Sha512};

/// SHA-512 digest of the signed content, fed to the ECDSA prehash APIs
pub fn signature_digest(content: &[u8]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    hasher.update(content);

    let mut digest = [0u8; 64];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Hash a string using SHA-256, hex encoded
pub fn hash_string(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{}", hex::encode(hash))
}

/// CSP hash source expression for an inline script: `'sha256-<base64>'`
///
/// The digest covers the exact text between `<script>` and `</script>`.
pub fn csp_hash_source(inline_script: &str) -> String {
    let digest = Sha256::digest(inline_script.as_bytes());
    format!("'sha256-{}'", STANDARD.encode(digest))
}
