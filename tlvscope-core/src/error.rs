//! Error types for tlvscope-core.
//!
//! This module provides structured error types for all decode operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`DecodeError`] - Local-fatal errors raised while decoding a frame
//! - [`DecodeWarning`] - Recoverable anomalies attached to tree nodes
//! - [`RegistryError`] - Startup-time registration mistakes
//!
//! All errors implement `std::error::Error` and can be converted to `anyhow::Error`.

use compact_str::CompactString;
use thiserror::Error;

use crate::crypto::{KeyDerivationError, PrimitiveError};

/// Main error type for tlvscope-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error while decoding a frame
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error while building the object registry
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error from a cryptographic primitive
    #[error("Crypto error: {0}")]
    Crypto(#[from] PrimitiveError),

    /// Error deriving key material
    #[error("Key derivation error: {0}")]
    KeyDerivation(#[from] KeyDerivationError),
}

/// Errors that stop the innermost walker or decoder that hit them.
///
/// The enclosing tree keeps everything decoded before the failure and records
/// the error on a marker node. Only a malformed top-level header makes a
/// dissector return nothing but the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A read would pass the cursor's limit.
    #[error("bounds exceeded at offset {offset}: need {needed} bytes, limit is {limit}")]
    BoundsExceeded {
        offset: usize,
        needed: usize,
        limit: usize,
    },

    /// A header declared more value bytes than its container holds.
    #[error("type {type_code}: declared length {declared} exceeds {available} available bytes")]
    LengthMismatch {
        type_code: u32,
        declared: usize,
        available: usize,
    },

    /// A header-inclusive length was shorter than the header itself.
    #[error("type {type_code}: declared length {declared} is shorter than the {minimum}-byte header")]
    LengthUnderflow {
        type_code: u32,
        declared: usize,
        minimum: usize,
    },

    /// Checksum mismatch when validation is mandatory
    #[error("{protocol}: checksum invalid (expected {expected:#06x}, got {actual:#06x})")]
    ChecksumInvalid {
        protocol: &'static str,
        expected: u16,
        actual: u16,
    },

    /// Version or format selector this dissector cannot decode
    #[error("{protocol}: unsupported version {version}")]
    UnsupportedVersion { protocol: &'static str, version: u32 },

    #[error("nesting depth {depth} exceeds limit {limit}")]
    MaxDepthExceeded { depth: usize, limit: usize },

    #[error("walker stopped after {limit} iterations")]
    IterationLimitExceeded { limit: usize },

    #[error("decryption failed: {reason}")]
    DecryptFailed { reason: String },

    #[error("no key available")]
    NoKeyAvailable,

    /// MIC mismatch in strict mode
    #[error("authentication tag check failed")]
    TagCheckFailed,

    #[error("packet too small (need {needed} bytes, have {have})")]
    PacketTooSmall { needed: usize, have: usize },

    /// Invalid field value
    #[error("{protocol}: malformed {field}: {reason}")]
    Malformed {
        protocol: &'static str,
        field: &'static str,
        reason: String,
    },
}

impl DecodeError {
    /// Convenience constructor for [`DecodeError::Malformed`].
    pub fn malformed(protocol: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            protocol,
            field,
            reason: reason.into(),
        }
    }
}

/// Recoverable anomalies. Decoding continues and a best-effort value is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    #[error("{protocol}: unknown type {type_code}")]
    UnknownType { protocol: &'static str, type_code: u32 },

    /// Value length disagrees with the field's layout; raw bytes are shown instead.
    #[error("{field}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field}: reserved bits set ({value:#x})")]
    ReservedFieldNonzero { field: &'static str, value: u64 },

    /// Optional trailing data (usually a MIC) was not fully captured.
    #[error("packet too small (need {needed} bytes, have {have})")]
    PacketTooSmall { needed: usize, have: usize },

    /// MIC mismatch outside strict mode; the unverified plaintext is shown.
    #[error("authentication tag check failed")]
    TagCheckFailed,

    /// Checksum mismatch when validation is advisory
    #[error("{protocol}: checksum invalid (expected {expected:#06x}, got {actual:#06x})")]
    ChecksumInvalid {
        protocol: &'static str,
        expected: u16,
        actual: u16,
    },

    #[error("no dissector registered for {name}")]
    MissingDissector { name: CompactString },
}

/// Errors raised while building an [`ObjectRegistry`](crate::ObjectRegistry).
///
/// These are configuration mistakes, never dissection-time failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("object table already registered for protocol {0}")]
    DuplicateProtocol(&'static str),

    #[error("{protocol}: type {type_code} registered twice")]
    DuplicateType { protocol: &'static str, type_code: u32 },

    #[error("key provider already registered for hash id {0}")]
    DuplicateKeyProvider(&'static str),

    #[error("dissector already registered: {0}")]
    DuplicateDissector(&'static str),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::BoundsExceeded {
            offset: 4,
            needed: 2,
            limit: 5,
        };
        assert_eq!(
            err.to_string(),
            "bounds exceeded at offset 4: need 2 bytes, limit is 5"
        );

        let err = DecodeError::ChecksumInvalid {
            protocol: "ospf",
            expected: 0x1234,
            actual: 0x00ff,
        };
        assert_eq!(
            err.to_string(),
            "ospf: checksum invalid (expected 0x1234, got 0x00ff)"
        );
    }

    #[test]
    fn test_error_from_decode_error() {
        let err: Error = DecodeError::NoKeyAvailable.into();
        assert!(matches!(err, Error::Decode(DecodeError::NoKeyAvailable)));
        assert_eq!(err.to_string(), "Decode error: no key available");
    }

    #[test]
    fn test_warning_display() {
        let w = DecodeWarning::LengthMismatch {
            field: "channel_mask",
            expected: 6,
            actual: 4,
        };
        assert_eq!(w.to_string(), "channel_mask: expected 6 bytes, got 4");
    }
}
