//! Minimal deterministic CBOR encoder (RFC 8949).
//!
//! Only what OSCORE needs to build its HKDF `info` and AEAD `external_aad`
//! structures: unsigned and negative integers, byte and text strings,
//! definite-length arrays and `null`.

const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const SIMPLE_NULL: u8 = 0xf6;

#[derive(Debug, Clone, Default)]
pub struct CborWriter {
    buf: Vec<u8>,
}

impl CborWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn head(&mut self, major: u8, value: u64) -> &mut Self {
        let major = major << 5;
        match value {
            0..=23 => self.buf.push(major | value as u8),
            24..=0xff => self.buf.extend_from_slice(&[major | 24, value as u8]),
            0x100..=0xffff => {
                self.buf.push(major | 25);
                self.buf.extend_from_slice(&(value as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buf.push(major | 26);
                self.buf.extend_from_slice(&(value as u32).to_be_bytes());
            }
            _ => {
                self.buf.push(major | 27);
                self.buf.extend_from_slice(&value.to_be_bytes());
            }
        }
        self
    }

    pub fn uint(&mut self, value: u64) -> &mut Self {
        self.head(MAJOR_UINT, value)
    }

    /// Negative integer `-1 - n`.
    pub fn nint(&mut self, n: u64) -> &mut Self {
        self.head(MAJOR_NINT, n)
    }

    pub fn int(&mut self, value: i64) -> &mut Self {
        if value < 0 {
            self.nint((-1 - value) as u64)
        } else {
            self.uint(value as u64)
        }
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.head(MAJOR_BYTES, value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.head(MAJOR_TEXT, value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Array header; the next `len` items are its elements.
    pub fn array(&mut self, len: usize) -> &mut Self {
        self.head(MAJOR_ARRAY, len as u64)
    }

    pub fn null(&mut self) -> &mut Self {
        self.buf.push(SIMPLE_NULL);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
