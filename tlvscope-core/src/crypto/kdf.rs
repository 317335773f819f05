//! Key derivation for Thread MLE and OSCORE.
//!
//! Thread uses `HMAC-SHA256(master_key, key_sequence || "Thread")`, split 16/16
//! into the MLE key and the MAC key. OSCORE runs HKDF-SHA-256 with a CBOR
//! `info` structure (RFC 8613 section 3.2.1).

use std::fmt;

use ring::hkdf::{KeyType, Salt, HKDF_SHA256};
use ring::hmac;
use thiserror::Error;

use crate::cbor::CborWriter;

/// COSE algorithm id of AES-CCM-16-64-128, the OSCORE default.
pub const AES_CCM_16_64_128: u8 = 10;

const OSCORE_KEY_LEN: usize = 16;
const OSCORE_IV_LEN: usize = 13;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    #[error("HKDF expand to {0} bytes failed")]
    Expand(usize),
}

/// Keys derived from one Thread master key and key sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct ThreadKeys {
    pub mle: [u8; 16],
    pub mac: [u8; 16],
}

impl fmt::Debug for ThreadKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadKeys").finish_non_exhaustive()
    }
}

pub fn thread_keys(master_key: &[u8], sequence: u32) -> ThreadKeys {
    let key = hmac::Key::new(hmac::HMAC_SHA256, master_key);
    let mut ctx = hmac::Context::with_key(&key);
    ctx.update(&sequence.to_be_bytes());
    ctx.update(b"Thread");
    let tag = ctx.sign();
    let digest = tag.as_ref();

    let mut mle = [0u8; 16];
    let mut mac = [0u8; 16];
    mle.copy_from_slice(&digest[..16]);
    mac.copy_from_slice(&digest[16..32]);
    ThreadKeys { mle, mac }
}

/// Key index carried in the auxiliary header for a key sequence.
pub const fn thread_key_index(sequence: u32) -> u8 {
    ((sequence & 0x7F) + 1) as u8
}

/// Helper type for specifying output length in HKDF expand operations.
struct ExpandLen(usize);

impl KeyType for ExpandLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// HKDF-SHA-256 extract-then-expand.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, KeyDerivationError> {
    let prk = Salt::new(HKDF_SHA256, salt).extract(ikm);
    let info = [info];
    let okm = prk
        .expand(&info, ExpandLen(len))
        .map_err(|_| KeyDerivationError::Expand(len))?;
    let mut out = vec![0u8; len];
    okm.fill(&mut out).map_err(|_| KeyDerivationError::Expand(len))?;
    Ok(out)
}

/// `info = [id, id_context / null, alg_aead, type, L]`
pub fn oscore_info(id: &[u8], id_context: Option<&[u8]>, kind: &str, len: usize) -> Vec<u8> {
    let mut w = CborWriter::new();
    w.array(5).bytes(id);
    match id_context {
        Some(ctx) => w.bytes(ctx),
        None => w.null(),
    };
    w.uint(u64::from(AES_CCM_16_64_128)).text(kind).uint(len as u64);
    w.into_bytes()
}

/// An OSCORE security context as configured by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct OscoreContext {
    pub master_secret: Vec<u8>,
    pub master_salt: Vec<u8>,
    pub sender_id: Vec<u8>,
    pub recipient_id: Vec<u8>,
    pub id_context: Option<Vec<u8>>,
}

impl fmt::Debug for OscoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscoreContext")
            .field("sender_id", &self.sender_id)
            .field("recipient_id", &self.recipient_id)
            .field("id_context", &self.id_context)
            .finish_non_exhaustive()
    }
}

/// Keys derived from an [`OscoreContext`].
#[derive(Clone, PartialEq, Eq)]
pub struct OscoreKeys {
    pub sender_key: [u8; 16],
    pub recipient_key: [u8; 16],
    pub common_iv: [u8; 13],
}

impl fmt::Debug for OscoreKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscoreKeys")
            .field("common_iv", &self.common_iv)
            .finish_non_exhaustive()
    }
}

impl OscoreContext {
    pub fn new(master_secret: impl Into<Vec<u8>>, master_salt: impl Into<Vec<u8>>) -> Self {
        Self {
            master_secret: master_secret.into(),
            master_salt: master_salt.into(),
            sender_id: Vec::new(),
            recipient_id: Vec::new(),
            id_context: None,
        }
    }

    pub fn with_ids(mut self, sender_id: impl Into<Vec<u8>>, recipient_id: impl Into<Vec<u8>>) -> Self {
        self.sender_id = sender_id.into();
        self.recipient_id = recipient_id.into();
        self
    }

    pub fn with_id_context(mut self, id_context: impl Into<Vec<u8>>) -> Self {
        self.id_context = Some(id_context.into());
        self
    }

    fn expand<const N: usize>(&self, id: &[u8], kind: &str) -> Result<[u8; N], KeyDerivationError> {
        let info = oscore_info(id, self.id_context.as_deref(), kind, N);
        let okm = hkdf_sha256(&self.master_salt, &self.master_secret, &info, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&okm);
        Ok(out)
    }

    pub fn derive(&self) -> Result<OscoreKeys, KeyDerivationError> {
        Ok(OscoreKeys {
            sender_key: self.expand::<OSCORE_KEY_LEN>(&self.sender_id, "Key")?,
            recipient_key: self.expand::<OSCORE_KEY_LEN>(&self.recipient_id, "Key")?,
            common_iv: self.expand::<OSCORE_IV_LEN>(&[], "IV")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    const MASTER: &str = "00112233445566778899aabbccddeeff";

    // Test 1: Thread key derivation, sequence 0
    #[test]
    fn test_thread_keys_seq0() {
        let keys = thread_keys(&hex(MASTER), 0);
        assert_eq!(keys.mle.to_vec(), hex("5445f4158fd75912175809f8b57a66a4"));
        assert_eq!(keys.mac.to_vec(), hex("de89c53af382b421e0fde5a9bae3bef0"));
    }

    // Test 2: a different sequence gives different keys
    #[test]
    fn test_thread_keys_seq1() {
        let keys = thread_keys(&hex(MASTER), 1);
        assert_eq!(keys.mle.to_vec(), hex("8f4cd1a27d95c07d12db8974bd615c13"));
    }

    // Test 3: key index wraps every 128 sequences
    #[test]
    fn test_key_index() {
        assert_eq!(thread_key_index(0), 1);
        assert_eq!(thread_key_index(127), 128);
        assert_eq!(thread_key_index(128), 1);
    }

    // Test 4: RFC 8613 C.1.1 client context
    #[test]
    fn test_oscore_derivation() {
        let ctx = OscoreContext::new(hex("0102030405060708090a0b0c0d0e0f10"), hex("9e7ca92223786340"))
            .with_ids(Vec::new(), vec![0x01]);
        let keys = ctx.derive().unwrap();
        assert_eq!(keys.sender_key.to_vec(), hex("f0910ed7295e6ad4b54fc793154302ff"));
        assert_eq!(keys.recipient_key.to_vec(), hex("ffb14e093c94c9cac9471648b4f98710"));
        assert_eq!(keys.common_iv.to_vec(), hex("4622d4dd6d944168eefb54987c"));
    }

    // Test 5: info structure for the sender key
    #[test]
    fn test_oscore_info() {
        assert_eq!(oscore_info(&[], None, "Key", 16), hex("8540f60a634b657910"));
    }

    // Test 6: debug output does not leak secrets
    #[test]
    fn test_debug_redacted() {
        let ctx = OscoreContext::new(vec![0xAB; 16], vec![]);
        assert!(!format!("{:?}", ctx).contains("171"));
        assert!(!format!("{:?}", thread_keys(&[0; 16], 0)).contains('['));
    }
}
