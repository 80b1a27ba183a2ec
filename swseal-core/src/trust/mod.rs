//! Trust System - signature verification for control script payloads
//!
//! A payload only ever runs after its detached signature has been checked
//! against the one fixed public key.
//!
//! Design Principles:
//! - Fail closed - every parse or crypto ambiguity means "invalid"
//! - Canonical reconstruction - the verifier re-serialises the metadata
//!   exactly as the signer did before checking the signature
//! - Industry standard crypto - ECDSA P-384 over SHA-512

pub mod error;
pub mod hasher;
pub mod key;
pub mod signer;
pub mod verifier;

pub use error::{KeyError, VerifyError};
pub use key::TrustKey;
pub use signer::PayloadSigner;
pub use verifier::{SignatureVerifier, VerifiedPayload};
