//! Signed payload format
//!
//! `[<name>,<modifiedTime>,<...optional fields>,<signature>];<body>`

pub mod frame;
pub mod metadata;

pub use frame::{parse, serialize, Field, Frame, FrameError};
pub use metadata::SignedMetadata;
