//! OSCORE (RFC 8613) payload protection.
//!
//! The CoAP dissector calls [`unprotect`] when an OSCORE option is present.
//! Keys come from the caller's [`OscoreContext`]s; the decrypted inner
//! message is handed to the `coap.inner` dissector.
//!
//! [`OscoreContext`]: crate::crypto::OscoreContext

use tracing::debug;

use crate::cbor::CborWriter;
use crate::crypto::{decrypt_payload, AeadRequest, CandidateKey, KeyContext, NonceInput, AES_CCM_16_64_128};
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::tlv::DecodedObject;

use super::DecodeCtx;

/// Tag length of AES-CCM-16-64-128.
const TAG_LEN: usize = 8;

const OSCORE_VERSION: u64 = 1;

/// Values of a decoded OSCORE option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct OscoreOption {
    pub partial_iv: Option<Vec<u8>>,
    pub kid_context: Option<Vec<u8>>,
    pub kid: Option<Vec<u8>>,
}

impl OscoreOption {
    pub fn from_node(node: &DecodedObject) -> Self {
        let bytes = |name| node.child(name).and_then(|n| n.as_bytes()).map(<[u8]>::to_vec);
        Self {
            partial_iv: bytes("partial_iv"),
            kid_context: bytes("kid_context"),
            kid: bytes("kid"),
        }
    }
}

/// AAD: `Enc_structure = ["Encrypt0", h'', external_aad]` (RFC 8613 section 5.4).
///
/// `external_aad = bstr .cbor [oscore_version, [alg_aead], request_kid, request_piv, options]`
/// with no Class I options.
pub fn enc_structure(request_kid: &[u8], request_piv: &[u8]) -> Vec<u8> {
    let mut external = CborWriter::new();
    external
        .array(5)
        .uint(OSCORE_VERSION)
        .array(1)
        .uint(u64::from(AES_CCM_16_64_128))
        .bytes(request_kid)
        .bytes(request_piv)
        .bytes(&[]);
    let external = external.into_bytes();

    let mut aad = CborWriter::new();
    aad.array(3).text("Encrypt0").bytes(&[]).bytes(&external);
    aad.into_bytes()
}

/// One way to open the message: a key, its nonce and the request binding.
struct Attempt {
    key: [u8; 16],
    nonce: Vec<u8>,
    request_kid: Vec<u8>,
    request_piv: Vec<u8>,
}

/// Work out every key that may have protected this message.
///
/// A message carrying a kid was sent by the party with that sender id. A
/// message without one is a response: it is bound to the caller-supplied
/// request and was sent by the request's recipient.
fn attempts(keys: &KeyContext, option: &OscoreOption, is_request: bool) -> Result<Vec<Attempt>, DecodeError> {
    let binding = keys.oscore_request.as_ref();
    let (request_kid, request_piv) = match (&option.kid, &option.partial_iv) {
        (Some(kid), Some(piv)) if is_request => (kid.clone(), piv.clone()),
        _ => match binding {
            Some(req) => (req.kid.clone(), req.partial_iv.clone()),
            None if is_request => {
                return Err(DecodeError::malformed("oscore", "option", "request without kid or partial IV"))
            }
            None => return Err(DecodeError::NoKeyAvailable),
        },
    };
    if request_piv.len() > 5 {
        return Err(DecodeError::malformed("oscore", "partial_iv", "longer than 5 bytes"));
    }

    let mut out = Vec::new();
    for context in &keys.oscore_contexts {
        if let (Some(wanted), Some(have)) = (&option.kid_context, &context.id_context) {
            if wanted != have {
                continue;
            }
        }
        let derived = match context.derive() {
            Ok(derived) => derived,
            Err(error) => {
                debug!(%error, "OSCORE context skipped");
                continue;
            }
        };

        // Who sent the message, by sender id
        let sender = match &option.kid {
            Some(kid) => kid.clone(),
            None if request_kid == context.sender_id => context.recipient_id.clone(),
            None if request_kid == context.recipient_id => context.sender_id.clone(),
            None => continue,
        };
        let key = if sender == context.sender_id {
            derived.sender_key
        } else if sender == context.recipient_id {
            derived.recipient_key
        } else {
            continue;
        };

        let (id_piv, piv) = match &option.partial_iv {
            Some(piv) => (sender, piv.clone()),
            None => (request_kid.clone(), request_piv.clone()),
        };
        let nonce = keys.nonce(&NonceInput::Oscore {
            common_iv: &derived.common_iv,
            id_piv: &id_piv,
            partial_iv: &piv,
        });
        out.push(Attempt {
            key,
            nonce,
            request_kid: request_kid.clone(),
            request_piv: request_piv.clone(),
        });
    }
    Ok(out)
}

/// Decrypt an OSCORE payload and decode the inner message.
///
/// Always returns a node: `oscore_payload` on success, a marker of the same
/// name when no key fits or decryption fails.
pub(super) fn unprotect(
    ctx: &mut DecodeCtx<'_>,
    option: &OscoreOption,
    is_request: bool,
    ciphertext: &[u8],
) -> DecodedObject {
    match open(ctx, option, is_request, ciphertext) {
        Ok(node) => node,
        Err(error) => {
            debug!(%error, "OSCORE payload not decrypted");
            DecodedObject::aborted("oscore_payload", error, ciphertext)
        }
    }
}

fn open(
    ctx: &mut DecodeCtx<'_>,
    option: &OscoreOption,
    is_request: bool,
    ciphertext: &[u8],
) -> Result<DecodedObject, DecodeError> {
    let keys = ctx.keys().ok_or(DecodeError::NoKeyAvailable)?;
    let attempts = attempts(keys, option, is_request)?;
    // All attempts share one request binding, so one AAD covers them.
    let first = attempts.first().ok_or(DecodeError::NoKeyAvailable)?;
    let aad = enc_structure(&first.request_kid, &first.request_piv);

    let candidates: Vec<CandidateKey> = attempts
        .iter()
        .enumerate()
        .map(|(index, attempt)| CandidateKey::new(attempt.key.to_vec(), index as u32))
        .collect();
    let request = AeadRequest::new(ciphertext, 0, TAG_LEN, &aad).strict(ctx.config().strict_tag);
    let outcome = decrypt_payload(ctx.crypto(), &request, &candidates, |key| {
        attempts
            .get(key.key_id as usize)
            .map(|attempt| attempt.nonce.clone())
            .unwrap_or_default()
    })?;

    let status = if outcome.tag_truncated {
        "truncated"
    } else if outcome.tag_check_failed {
        "failed"
    } else {
        "verified"
    };
    let mut node = DecodedObject::composite(
        "oscore_payload",
        vec![
            ctx.call_subdissector("coap.inner", ByteCursor::new(&outcome.plaintext)),
            DecodedObject::bytes("tag", &outcome.tag),
            DecodedObject::text("tag_status", status),
        ],
    );
    for warning in outcome.warnings {
        node.push_warning(warning);
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{default_nonce, AeadPrimitive, AesCcmStar, OscoreContext};
    use crate::error::DecodeWarning;
    use crate::protocol::{default_registry, dissect, dissect_with, DissectConfig, DissectOptions};

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// RFC 8613 appendix C.1.1, client side.
    fn client_context() -> OscoreContext {
        OscoreContext::new(hex("0102030405060708090a0b0c0d0e0f10"), hex("9e7ca92223786340")).with_ids(vec![], vec![0x01])
    }

    /// RFC 8613 appendix C.4: GET coap://localhost/tv1 protected.
    const PROTECTED_REQUEST: &str = "44025d1f00003974396c6f63616c686f7374620914ff612f1092f1776f1c1668b3825e";

    // Test 1: external AAD layout
    #[test]
    fn test_enc_structure() {
        assert_eq!(enc_structure(&[], &[0x14]), hex("8368456e63727970743040488501810a40411440"));
    }

    // Test 2: RFC 8613 request vector
    #[test]
    fn test_request_vector() {
        let registry = default_registry().unwrap();
        let keys = KeyContext::new().with_oscore_context(client_context());
        let d = dissect(&registry, &hex(PROTECTED_REQUEST), "coap", Some(&keys));
        assert!(d.error().is_none(), "{:?}", d.error());

        let inner = d.root.find("oscore_payload.coap_inner").unwrap();
        assert_eq!(inner.find("code_name").and_then(|n| n.as_text()), Some("GET"));
        assert_eq!(inner.find("options.uri_path").and_then(|n| n.as_text()), Some("tv1"));
        assert_eq!(
            d.root.find("oscore_payload.tag_status").and_then(|n| n.as_text()),
            Some("verified")
        );
    }

    // Test 3: response bound to the request's kid and partial IV
    #[test]
    fn test_response_binding() {
        let derived = client_context().derive().unwrap();
        let nonce = default_nonce(&NonceInput::Oscore {
            common_iv: &derived.common_iv,
            id_piv: &[],
            partial_iv: &[0x14],
        });
        let aad = enc_structure(&[], &[0x14]);
        let plaintext = [0x45, 0xff, b'h', b'i'];
        let sealed = AesCcmStar.seal(&derived.recipient_key, &nonce, &aad, &plaintext, TAG_LEN).unwrap();

        let mut frame = vec![0x64, 0x44, 0x5d, 0x1f, 0x00, 0x00, 0x39, 0x74, 0x90, 0xff];
        frame.extend_from_slice(&sealed);

        let registry = default_registry().unwrap();
        let keys = KeyContext::new()
            .with_oscore_context(client_context())
            .with_oscore_request(vec![], vec![0x14]);
        let d = dissect(&registry, &frame, "coap", Some(&keys));
        let inner = d.root.find("oscore_payload.coap_inner").unwrap();
        assert_eq!(inner.find("code_name").and_then(|n| n.as_text()), Some("Content"));
        assert_eq!(inner.find("payload").and_then(|n| n.as_bytes()), Some(&b"hi"[..]));

        // Without the binding there is nothing to build the nonce from
        let keys = KeyContext::new().with_oscore_context(client_context());
        let d = dissect(&registry, &frame, "coap", Some(&keys));
        assert_eq!(d.root.find("oscore_payload").and_then(|n| n.error()), Some(&DecodeError::NoKeyAvailable));
    }

    // Test 4: corrupted ciphertext, lenient and strict
    #[test]
    fn test_tag_failure() {
        let mut frame = hex(PROTECTED_REQUEST);
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        let registry = default_registry().unwrap();
        let keys = KeyContext::new().with_oscore_context(client_context());

        let d = dissect(&registry, &frame, "coap", Some(&keys));
        let payload = d.root.find("oscore_payload").unwrap();
        assert_eq!(payload.find("tag_status").and_then(|n| n.as_text()), Some("failed"));
        assert_eq!(payload.warnings, vec![DecodeWarning::TagCheckFailed]);

        let options = DissectOptions::new("coap")
            .with_keys(Some(&keys))
            .with_config(DissectConfig::default().strict(true));
        let d = dissect_with(&registry, &frame, &options);
        assert_eq!(d.root.find("oscore_payload").and_then(|n| n.error()), Some(&DecodeError::TagCheckFailed));
    }

    // Test 5: no keys and an unknown kid
    #[test]
    fn test_no_matching_context() {
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &hex(PROTECTED_REQUEST), "coap", None);
        assert_eq!(d.root.find("oscore_payload").and_then(|n| n.error()), Some(&DecodeError::NoKeyAvailable));

        let other = OscoreContext::new(hex("0102030405060708090a0b0c0d0e0f10"), hex("9e7ca92223786340"))
            .with_ids(vec![0x05], vec![0x06]);
        let keys = KeyContext::new().with_oscore_context(other);
        let d = dissect(&registry, &hex(PROTECTED_REQUEST), "coap", Some(&keys));
        assert_eq!(d.root.find("oscore_payload").and_then(|n| n.error()), Some(&DecodeError::NoKeyAvailable));
        assert!(d.root.find("payload").is_some());
    }
}
