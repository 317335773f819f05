//! AEAD payload adapter.
//!
//! Dissectors describe where the protected region sits inside the captured
//! frame; [`decrypt_payload`] handles truncation, candidate-key iteration and
//! the strict/lenient tag-failure policy, so none of them re-implement it.

use std::borrow::Cow;

use tracing::debug;

use super::{AeadPrimitive, CandidateKey, PrimitiveError};
use crate::error::{DecodeError, DecodeWarning};

/// Nonce construction hook installed by callers with non-standard layouts.
pub type NonceBuilder = fn(&NonceInput<'_>) -> Vec<u8>;

/// Everything a nonce may be built from.
#[derive(Debug, Clone, Copy)]
pub enum NonceInput<'a> {
    /// IEEE 802.15.4 CCM* nonce: source address, frame counter, security level.
    Ccm802154 {
        source: [u8; 8],
        frame_counter: u32,
        security_level: u8,
    },
    /// OSCORE AEAD nonce (RFC 8613 section 5.2).
    Oscore {
        common_iv: &'a [u8],
        id_piv: &'a [u8],
        partial_iv: &'a [u8],
    },
}

/// Standard nonce for each [`NonceInput`] variant.
pub fn default_nonce(input: &NonceInput<'_>) -> Vec<u8> {
    match *input {
        NonceInput::Ccm802154 {
            source,
            frame_counter,
            security_level,
        } => {
            let mut nonce = Vec::with_capacity(13);
            nonce.extend_from_slice(&source);
            nonce.extend_from_slice(&frame_counter.to_be_bytes());
            nonce.push(security_level);
            nonce
        }
        NonceInput::Oscore {
            common_iv,
            id_piv,
            partial_iv,
        } => oscore_nonce(common_iv, id_piv, partial_iv),
    }
}

/// `S || pad(ID_PIV, n - 6) || pad(PIV, 5)`, XORed with the common IV.
///
/// Over-long inputs keep their rightmost bytes; callers reject them first.
fn oscore_nonce(common_iv: &[u8], id_piv: &[u8], partial_iv: &[u8]) -> Vec<u8> {
    let n = common_iv.len();
    if n < 6 {
        return common_iv.to_vec();
    }
    let mut nonce = vec![0u8; n];
    nonce[0] = id_piv.len() as u8;

    let id_field = &mut nonce[1..n - 5];
    let id = &id_piv[id_piv.len().saturating_sub(id_field.len())..];
    let offset = id_field.len() - id.len();
    id_field[offset..].copy_from_slice(id);

    let piv_field = &mut nonce[n - 5..];
    let piv = &partial_iv[partial_iv.len().saturating_sub(5)..];
    piv_field[5 - piv.len()..].copy_from_slice(piv);

    for (b, iv) in nonce.iter_mut().zip(common_iv) {
        *b ^= iv;
    }
    nonce
}

/// Where the protected region lives and how it is authenticated.
#[derive(Debug, Clone, Copy)]
pub struct AeadRequest<'a> {
    /// Captured bytes of the enclosing frame.
    pub frame: &'a [u8],
    /// Absolute offset of the first ciphertext byte.
    pub ciphertext_offset: usize,
    /// Original frame length when the capture was cut short.
    pub reported_len: Option<usize>,
    /// Trailing tag length; 0 selects encryption-only mode.
    pub tag_len: usize,
    pub aad: &'a [u8],
    /// The region is authenticated plaintext (security levels 1-3).
    pub authenticate_only: bool,
    /// A tag mismatch is an error rather than a warning.
    pub strict: bool,
}

impl<'a> AeadRequest<'a> {
    pub fn new(frame: &'a [u8], ciphertext_offset: usize, tag_len: usize, aad: &'a [u8]) -> Self {
        Self {
            frame,
            ciphertext_offset,
            reported_len: None,
            tag_len,
            aad,
            authenticate_only: false,
            strict: false,
        }
    }

    pub fn with_reported_len(mut self, reported_len: Option<usize>) -> Self {
        self.reported_len = reported_len;
        self
    }

    pub fn authenticate_only(mut self, yes: bool) -> Self {
        self.authenticate_only = yes;
        self
    }

    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }
}

/// Result of [`decrypt_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadOutcome {
    pub plaintext: Vec<u8>,
    /// Captured tag bytes (possibly short).
    pub tag: Vec<u8>,
    /// Id of the key that produced `plaintext`.
    pub key_id: Option<u32>,
    pub tag_check_failed: bool,
    /// The tag was not fully captured, so nothing was verified.
    pub tag_truncated: bool,
    pub warnings: Vec<DecodeWarning>,
}

impl AeadOutcome {
    fn new(plaintext: Vec<u8>, tag: &[u8], key: &CandidateKey) -> Self {
        Self {
            plaintext,
            tag: tag.to_vec(),
            key_id: Some(key.key_id),
            tag_check_failed: false,
            tag_truncated: false,
            warnings: Vec::new(),
        }
    }

    /// Plaintext was authenticated by the tag.
    pub fn verified(&self) -> bool {
        !self.tag_check_failed && !self.tag_truncated && !self.tag.is_empty()
    }
}

fn decrypt_failed(error: PrimitiveError) -> DecodeError {
    DecodeError::DecryptFailed {
        reason: error.to_string(),
    }
}

/// Decrypt the protected region of `request.frame` with the first key that verifies.
///
/// - a region too short for its tag is [`DecodeError::PacketTooSmall`]
/// - an empty key list is [`DecodeError::NoKeyAvailable`]
/// - a tag cut off by the capture yields unverified plaintext and a
///   [`DecodeWarning::PacketTooSmall`] counting tag bytes; with no tag the
///   warning counts the payload bytes instead
/// - when every key fails the tag check, strict requests return
///   [`DecodeError::TagCheckFailed`]; lenient ones return the unverified
///   plaintext of the first key with [`DecodeWarning::TagCheckFailed`]
pub fn decrypt_payload<N>(
    primitive: &dyn AeadPrimitive,
    request: &AeadRequest<'_>,
    keys: &[CandidateKey],
    nonce_for: N,
) -> Result<AeadOutcome, DecodeError>
where
    N: Fn(&CandidateKey) -> Vec<u8>,
{
    let frame = request.frame;
    let reported = request.reported_len.unwrap_or(frame.len()).max(frame.len());
    let needed = request.ciphertext_offset + request.tag_len;
    if reported < needed {
        return Err(DecodeError::PacketTooSmall {
            needed,
            have: reported,
        });
    }

    let ct_end = reported - request.tag_len;
    let captured_ct_end = ct_end.min(frame.len());
    let region = &frame[request.ciphertext_offset.min(captured_ct_end)..captured_ct_end];
    let tag = &frame[captured_ct_end..];
    let truncated = captured_ct_end < ct_end || tag.len() < request.tag_len;

    let first = keys.first().ok_or(DecodeError::NoKeyAvailable)?;

    let unverified = |key: &CandidateKey| -> Result<Vec<u8>, DecodeError> {
        if request.authenticate_only {
            return Ok(region.to_vec());
        }
        primitive
            .open_unverified(&key.key, &nonce_for(key), region)
            .map_err(decrypt_failed)
    };

    if request.tag_len == 0 || truncated {
        let mut outcome = AeadOutcome::new(unverified(first)?, tag, first);
        if truncated && request.tag_len > 0 {
            outcome.tag_truncated = true;
            outcome.warnings.push(DecodeWarning::PacketTooSmall {
                needed: request.tag_len,
                have: tag.len(),
            });
        } else if truncated {
            // Without a tag only the protected payload can be short.
            outcome.warnings.push(DecodeWarning::PacketTooSmall {
                needed: ct_end - request.ciphertext_offset,
                have: region.len(),
            });
        }
        return Ok(outcome);
    }

    let aad: Cow<'_, [u8]> = if request.authenticate_only {
        Cow::Owned([request.aad, region].concat())
    } else {
        Cow::Borrowed(request.aad)
    };
    let ciphertext: &[u8] = if request.authenticate_only { &[] } else { region };

    let mut tag_failed: Option<&CandidateKey> = None;
    let mut last_error = None;
    for key in keys {
        match primitive.open(&key.key, &nonce_for(key), &aad, ciphertext, tag) {
            Ok(plaintext) => {
                let plaintext = if request.authenticate_only {
                    region.to_vec()
                } else {
                    plaintext
                };
                return Ok(AeadOutcome::new(plaintext, tag, key));
            }
            Err(PrimitiveError::TagMismatch) => {
                debug!(key_id = key.key_id, "tag mismatch");
                tag_failed.get_or_insert(key);
            }
            Err(error) => {
                debug!(key_id = key.key_id, %error, "candidate key rejected");
                last_error = Some(error);
            }
        }
    }

    match tag_failed {
        Some(_) if request.strict => Err(DecodeError::TagCheckFailed),
        Some(key) => {
            let mut outcome = AeadOutcome::new(unverified(key)?, tag, key);
            outcome.tag_check_failed = true;
            outcome.warnings.push(DecodeWarning::TagCheckFailed);
            Ok(outcome)
        }
        None => Err(last_error.map_or(DecodeError::NoKeyAvailable, decrypt_failed)),
    }
}
