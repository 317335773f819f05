//! Payload decryption support.
//!
//! Implements:
//! - [`decrypt_payload`], the AEAD adapter dissectors call for protected payloads
//! - [`AesCcmStar`], the AES-128 CCM* primitive used by MLE and OSCORE
//! - Thread key derivation (HMAC-SHA-256) and OSCORE context derivation (HKDF-SHA-256)
//! - [`KeyContext`] and [`KeyProvider`], the per-packet and registered key sources
//!
//! Block ciphers and MACs come from `aes`/`ccm` and `ring`; this module only
//! decides which key, nonce and bytes they are fed.

mod aead;
mod ccm_star;
mod kdf;
mod keys;

use thiserror::Error;

pub use aead::{decrypt_payload, default_nonce, AeadOutcome, AeadRequest, NonceBuilder, NonceInput};
pub use ccm_star::AesCcmStar;
pub use kdf::{
    hkdf_sha256, oscore_info, thread_key_index, thread_keys, KeyDerivationError, OscoreContext,
    OscoreKeys, ThreadKeys, AES_CCM_16_64_128,
};
pub use keys::{
    CandidateKey, KeyContext, KeyProvider, KeyRequest, MasterKey, OscoreRequest, PacketInfo,
    ThreadKeyProvider, THREAD_MLE_KEY_HASH,
};

/// Failures reported by an [`AeadPrimitive`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("authentication tag mismatch")]
    TagMismatch,

    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),

    #[error("invalid nonce length: {0}")]
    InvalidNonceLength(usize),

    #[error("unsupported tag length: {0}")]
    UnsupportedTagLength(usize),

    #[error("message of {0} bytes is too long")]
    MessageTooLong(usize),
}

/// An authenticated cipher the adapter can drive.
///
/// Implementations never modify their inputs; outputs are new buffers.
pub trait AeadPrimitive: Send + Sync {
    /// Decrypt and verify `tag` over `aad` and `ciphertext`.
    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, PrimitiveError>;

    /// Decrypt without any tag check.
    fn open_unverified(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, PrimitiveError>;

    /// Encrypt and return `ciphertext || tag`.
    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, PrimitiveError>;
}
