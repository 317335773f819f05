//! Bounds-checked reads over a borrowed frame.
//!
//! [`ByteCursor`] is the only way decoders touch frame bytes. Positions are
//! absolute offsets into the underlying buffer, so a cursor handed to a nested
//! decoder still reports frame offsets in its errors.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::DecodeError;

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Network byte order.
    #[default]
    Big,
    Little,
}

/// Shorthand for [`Endian::Big`].
pub const BE: Endian = Endian::Big;
/// Shorthand for [`Endian::Little`].
pub const LE: Endian = Endian::Little;

/// Read-only view over `buf[start..limit]` with a read position.
///
/// Invariant: `start <= pos <= limit <= buf.len()`. A failed read returns
/// [`DecodeError::BoundsExceeded`] and leaves `pos` where it was.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    start: usize,
    pos: usize,
    limit: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor over the whole buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            start: 0,
            pos: 0,
            limit: buf.len(),
        }
    }

    /// Current absolute read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// First absolute offset this cursor may read.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last absolute offset this cursor may read.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.limit
    }

    /// Unread bytes, `buf[pos..limit]`.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..self.limit]
    }

    /// Every byte of this cursor's window, `buf[start..limit]`.
    #[inline]
    pub fn window(&self) -> &'a [u8] {
        &self.buf[self.start..self.limit]
    }

    /// Bytes consumed so far, `buf[start..pos]`.
    #[inline]
    pub fn consumed(&self) -> &'a [u8] {
        &self.buf[self.start..self.pos]
    }

    fn bounds_error(&self, needed: usize) -> DecodeError {
        DecodeError::BoundsExceeded {
            offset: self.pos,
            needed,
            limit: self.limit,
        }
    }

    #[inline]
    fn check(&self, n: usize) -> Result<(), DecodeError> {
        if n > self.remaining() {
            return Err(self.bounds_error(n));
        }
        Ok(())
    }

    /// Borrow the next `n` bytes without advancing.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.check(n)?;
        Ok(&self.buf[self.pos..self.pos + n])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let out = self.peek_bytes(n)?;
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.check(1)?;
        Ok(self.buf[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16, DecodeError> {
        let b = self.read_array::<2>()?;
        Ok(match endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    /// Read a 3-byte integer into the low bits of a `u32`.
    pub fn read_u24(&mut self, endian: Endian) -> Result<u32, DecodeError> {
        let b = self.read_array::<3>()?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
            Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
        })
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32, DecodeError> {
        let b = self.read_array::<4>()?;
        Ok(match endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(&mut self, endian: Endian) -> Result<u64, DecodeError> {
        let b = self.read_array::<8>()?;
        Ok(match endian {
            Endian::Big => u64::from_be_bytes(b),
            Endian::Little => u64::from_le_bytes(b),
        })
    }

    /// Read an unsigned big-endian integer of 0..=8 bytes.
    pub fn read_uint(&mut self, width: usize) -> Result<u64, DecodeError> {
        if width > 8 {
            return Err(DecodeError::malformed(
                "cursor",
                "uint",
                format!("{width}-byte integer does not fit in 64 bits"),
            ));
        }
        let bytes = self.read_bytes(width)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub fn read_f32(&mut self, endian: Endian) -> Result<f32, DecodeError> {
        self.read_u32(endian).map(f32::from_bits)
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr, DecodeError> {
        self.read_array::<4>().map(Ipv4Addr::from)
    }

    pub fn read_ipv6(&mut self) -> Result<Ipv6Addr, DecodeError> {
        self.read_array::<16>().map(Ipv6Addr::from)
    }

    /// Skip `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Move to an absolute position inside `[start, limit]`.
    pub fn seek(&mut self, pos: usize) -> Result<(), DecodeError> {
        if pos < self.start || pos > self.limit {
            return Err(DecodeError::BoundsExceeded {
                offset: pos,
                needed: 0,
                limit: self.limit,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Sub-cursor over `[start, start + len)`, clamped to this cursor's limit.
    ///
    /// `start` is absolute and must lie inside this cursor's window. The
    /// result can never see bytes past `self.limit()`, whatever `len` says.
    pub fn slice(&self, start: usize, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        if start < self.start || start > self.limit {
            return Err(DecodeError::BoundsExceeded {
                offset: start,
                needed: len,
                limit: self.limit,
            });
        }
        let limit = start.saturating_add(len).min(self.limit);
        Ok(ByteCursor {
            buf: self.buf,
            start,
            pos: start,
            limit,
        })
    }

    /// Clamped sub-cursor starting at the current position. Does not advance.
    pub fn sub(&self, len: usize) -> ByteCursor<'a> {
        ByteCursor {
            buf: self.buf,
            start: self.pos,
            pos: self.pos,
            limit: self.pos.saturating_add(len).min(self.limit),
        }
    }

    /// Split off the next `len` bytes as a sub-cursor and advance past them.
    ///
    /// Unlike [`slice`](Self::slice) this fails when fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        self.check(len)?;
        let sub = ByteCursor {
            buf: self.buf,
            start: self.pos,
            pos: self.pos,
            limit: self.pos + len,
        };
        self.pos += len;
        Ok(sub)
    }

    /// Split off everything that is left.
    pub fn take_rest(&mut self) -> ByteCursor<'a> {
        let sub = ByteCursor {
            buf: self.buf,
            start: self.pos,
            pos: self.pos,
            limit: self.limit,
        };
        self.pos = self.limit;
        sub
    }
}
