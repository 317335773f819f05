//! TLV header layouts and the header decoder.
//!
//! A [`HeaderLayout`] describes how one protocol encodes `{type, length}` in
//! front of each object. [`decode_header`] turns the bytes at a cursor into a
//! [`TlvDescriptor`] whose value range is guaranteed to sit inside the cursor.

use std::ops::Range;

use crate::cursor::{ByteCursor, Endian};
use crate::error::DecodeError;

/// Width of a type or length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    One,
    Two,
    Four,
}

impl FieldWidth {
    pub const fn bytes(self) -> usize {
        match self {
            FieldWidth::One => 1,
            FieldWidth::Two => 2,
            FieldWidth::Four => 4,
        }
    }

    fn read(self, cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<u32, DecodeError> {
        match self {
            FieldWidth::One => cursor.read_u8().map(u32::from),
            FieldWidth::Two => cursor.read_u16(endian).map(u32::from),
            FieldWidth::Four => cursor.read_u32(endian),
        }
    }
}

/// A sentinel length meaning "the real length follows in a wider field".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthEscape {
    pub value: u32,
    pub extended_width: FieldWidth,
}

/// Fixed-position `{type, length}` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLayout {
    /// A protocol-specific flags byte precedes the type field (LMP's N|C-Type).
    pub flags_byte: bool,
    pub type_width: FieldWidth,
    /// Low bits of the raw type field that carry flags instead of type (Thread's stable bit).
    pub type_shift: u8,
    pub len_width: FieldWidth,
    pub escape: Option<LengthEscape>,
    /// The length field counts the header bytes too.
    pub length_includes_header: bool,
    /// Values are padded to a multiple of this many bytes.
    pub alignment: usize,
    pub endian: Endian,
}

impl FixedLayout {
    pub const fn new(type_width: FieldWidth, len_width: FieldWidth) -> Self {
        Self {
            flags_byte: false,
            type_width,
            type_shift: 0,
            len_width,
            escape: None,
            length_includes_header: false,
            alignment: 1,
            endian: Endian::Big,
        }
    }

    pub const fn with_flags_byte(mut self) -> Self {
        self.flags_byte = true;
        self
    }

    pub const fn with_type_shift(mut self, shift: u8) -> Self {
        self.type_shift = shift;
        self
    }

    pub const fn with_escape(mut self, value: u32, extended_width: FieldWidth) -> Self {
        self.escape = Some(LengthEscape {
            value,
            extended_width,
        });
        self
    }

    pub const fn length_includes_header(mut self) -> Self {
        self.length_includes_header = true;
        self
    }

    pub const fn aligned(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub const fn little_endian(mut self) -> Self {
        self.endian = Endian::Little;
        self
    }

    /// Header width without any extended length.
    pub const fn header_width(&self) -> usize {
        let flags = if self.flags_byte { 1 } else { 0 };
        flags + self.type_width.bytes() + self.len_width.bytes()
    }
}

/// Per-protocol header shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    Fixed(FixedLayout),
    /// CoAP option encoding (RFC 7252 §3.1): a delta/length nibble pair with
    /// 13 and 14 extensions; type numbers are cumulative.
    DeltaNibble,
}

impl HeaderLayout {
    /// Smallest number of bytes any header in this layout occupies.
    pub const fn min_header_width(&self) -> usize {
        match self {
            HeaderLayout::Fixed(layout) => layout.header_width(),
            HeaderLayout::DeltaNibble => 1,
        }
    }
}

impl From<FixedLayout> for HeaderLayout {
    fn from(layout: FixedLayout) -> Self {
        HeaderLayout::Fixed(layout)
    }
}

/// Header state carried between consecutive headers of one walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderState {
    last_type: u32,
}

/// One decoded header.
///
/// `value_end - value_start == declared_length` and `value_end` never passes
/// the limit of the cursor the header was read from. `next` is where the
/// following header starts (value end plus alignment padding, clamped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvDescriptor {
    pub type_code: u32,
    pub flags: u8,
    pub declared_length: u32,
    pub header_start: usize,
    pub value_start: usize,
    pub value_end: usize,
    pub next: usize,
}

impl TlvDescriptor {
    pub fn value_range(&self) -> Range<usize> {
        self.value_start..self.value_end
    }

    pub fn header_len(&self) -> usize {
        self.value_start - self.header_start
    }

    pub fn value_len(&self) -> usize {
        self.value_end - self.value_start
    }
}

/// Decode one header at the cursor's position.
///
/// On success the cursor sits at `value_start`. On failure it has not moved.
pub fn decode_header(
    cursor: &mut ByteCursor<'_>,
    layout: &HeaderLayout,
    state: &mut HeaderState,
) -> Result<TlvDescriptor, DecodeError> {
    let mut c = *cursor;
    let header_start = c.position();

    let (type_code, flags, value_len, alignment) = match layout {
        HeaderLayout::Fixed(fixed) => {
            let (type_code, flags, len) = decode_fixed(&mut c, fixed, header_start)?;
            (type_code, flags, len, fixed.alignment.max(1))
        }
        HeaderLayout::DeltaNibble => {
            let (type_code, len) = decode_delta_nibble(&mut c, state)?;
            (type_code, 0, len, 1)
        }
    };

    let value_start = c.position();
    let available = c.remaining();
    if value_len > available {
        return Err(DecodeError::LengthMismatch {
            type_code,
            declared: value_len,
            available,
        });
    }
    let value_end = value_start + value_len;
    let next = value_start
        .saturating_add(value_len.next_multiple_of(alignment))
        .min(c.limit());

    state.last_type = type_code;
    *cursor = c;

    Ok(TlvDescriptor {
        type_code,
        flags,
        declared_length: value_len as u32,
        header_start,
        value_start,
        value_end,
        next,
    })
}

fn decode_fixed(
    c: &mut ByteCursor<'_>,
    layout: &FixedLayout,
    header_start: usize,
) -> Result<(u32, u8, usize), DecodeError> {
    let flags_byte = if layout.flags_byte {
        Some(c.read_u8()?)
    } else {
        None
    };

    let raw_type = layout.type_width.read(c, layout.endian)?;
    let (type_code, shifted_flags) = match layout.type_shift {
        0 => (raw_type, 0),
        shift => (raw_type >> shift, (raw_type & ((1 << shift) - 1)) as u8),
    };

    let mut length = layout.len_width.read(c, layout.endian)? as usize;
    if let Some(escape) = layout.escape {
        if length as u32 == escape.value {
            length = escape.extended_width.read(c, layout.endian)? as usize;
        }
    }

    let value_len = if layout.length_includes_header {
        let header_len = c.position() - header_start;
        if length < header_len {
            return Err(DecodeError::LengthUnderflow {
                type_code,
                declared: length,
                minimum: header_len,
            });
        }
        length - header_len
    } else {
        length
    };

    Ok((type_code, flags_byte.unwrap_or(shifted_flags), value_len))
}

fn delta_nibble_ext(c: &mut ByteCursor<'_>, nibble: u8, field: &'static str) -> Result<u32, DecodeError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => Ok(u32::from(c.read_u8()?) + 13),
        14 => Ok(u32::from(c.read_u16(Endian::Big)?) + 269),
        _ => Err(DecodeError::malformed("coap", field, "reserved nibble value 15")),
    }
}

fn decode_delta_nibble(c: &mut ByteCursor<'_>, state: &HeaderState) -> Result<(u32, usize), DecodeError> {
    let first = c.read_u8()?;
    if first == 0xFF {
        return Err(DecodeError::malformed("coap", "option", "unexpected payload marker"));
    }
    let delta = delta_nibble_ext(c, first >> 4, "option delta")?;
    let length = delta_nibble_ext(c, first & 0x0F, "option length")?;
    let type_code = state
        .last_type
        .checked_add(delta)
        .ok_or_else(|| DecodeError::malformed("coap", "option delta", "option number overflow"))?;
    Ok((type_code, length as usize))
}
