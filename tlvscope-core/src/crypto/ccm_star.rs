//! AES-128 CCM* with a 13-byte nonce (IEEE 802.15.4 Annex B, RFC 3610).

use aes::cipher::BlockEncrypt;
use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U13, U16, U4, U8};
use ccm::Ccm;

use super::{AeadPrimitive, PrimitiveError};

const NONCE_LEN: usize = 13;
const KEY_LEN: usize = 16;

/// CCM* over AES-128 with 0, 4, 8 or 16-byte tags.
///
/// A zero-length tag is CCM*'s encryption-only mode (plain CTR).
#[derive(Debug, Clone, Copy, Default)]
pub struct AesCcmStar;

fn check_inputs(key: &[u8], nonce: &[u8]) -> Result<(), PrimitiveError> {
    if key.len() != KEY_LEN {
        return Err(PrimitiveError::InvalidKeyLength(key.len()));
    }
    if nonce.len() != NONCE_LEN {
        return Err(PrimitiveError::InvalidNonceLength(nonce.len()));
    }
    Ok(())
}

macro_rules! ccm_open {
    ($tag_size:ty, $key:expr, $nonce:expr, $aad:expr, $ct:expr, $tag:expr) => {{
        let cipher = Ccm::<Aes128, $tag_size, U13>::new_from_slice($key)
            .map_err(|_| PrimitiveError::InvalidKeyLength($key.len()))?;
        let mut buf = $ct.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice($nonce),
                $aad,
                &mut buf,
                GenericArray::from_slice($tag),
            )
            .map_err(|_| PrimitiveError::TagMismatch)?;
        Ok(buf)
    }};
}

macro_rules! ccm_seal {
    ($tag_size:ty, $key:expr, $nonce:expr, $aad:expr, $pt:expr) => {{
        let cipher = Ccm::<Aes128, $tag_size, U13>::new_from_slice($key)
            .map_err(|_| PrimitiveError::InvalidKeyLength($key.len()))?;
        let mut buf = $pt.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice($nonce), $aad, &mut buf)
            .map_err(|_| PrimitiveError::MessageTooLong($pt.len()))?;
        buf.extend_from_slice(&tag);
        Ok(buf)
    }};
}

/// CTR keystream over counter blocks `A_1, A_2, ...` (flags = L - 1 = 1).
fn ctr_xor(key: &[u8], nonce: &[u8], data: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
    check_inputs(key, nonce)?;
    if data.len() > usize::from(u16::MAX) * 16 {
        return Err(PrimitiveError::MessageTooLong(data.len()));
    }
    let cipher = Aes128::new_from_slice(key).map_err(|_| PrimitiveError::InvalidKeyLength(key.len()))?;
    let mut out = data.to_vec();
    for (i, chunk) in out.chunks_mut(16).enumerate() {
        let mut block = aes::Block::default();
        block[0] = 0x01;
        block[1..14].copy_from_slice(nonce);
        block[14..16].copy_from_slice(&((i + 1) as u16).to_be_bytes());
        cipher.encrypt_block(&mut block);
        for (b, k) in chunk.iter_mut().zip(block.iter()) {
            *b ^= k;
        }
    }
    Ok(out)
}

impl AeadPrimitive for AesCcmStar {
    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, PrimitiveError> {
        check_inputs(key, nonce)?;
        match tag.len() {
            0 => ctr_xor(key, nonce, ciphertext),
            4 => ccm_open!(U4, key, nonce, aad, ciphertext, tag),
            8 => ccm_open!(U8, key, nonce, aad, ciphertext, tag),
            16 => ccm_open!(U16, key, nonce, aad, ciphertext, tag),
            n => Err(PrimitiveError::UnsupportedTagLength(n)),
        }
    }

    fn open_unverified(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
        ctr_xor(key, nonce, ciphertext)
    }

    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, PrimitiveError> {
        check_inputs(key, nonce)?;
        match tag_len {
            0 => ctr_xor(key, nonce, plaintext),
            4 => ccm_seal!(U4, key, nonce, aad, plaintext),
            8 => ccm_seal!(U8, key, nonce, aad, plaintext),
            16 => ccm_seal!(U16, key, nonce, aad, plaintext),
            n => Err(PrimitiveError::UnsupportedTagLength(n)),
        }
    }
}
