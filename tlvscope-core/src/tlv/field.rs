//! Leaf field decoders.
//!
//! Every helper takes a cursor already clamped to one value. When the clamped
//! length disagrees with the field's fixed layout the helper falls back to a
//! raw-bytes node with a [`DecodeWarning::LengthMismatch`] instead of failing.

use compact_str::CompactString;

use super::{DecodedObject, Flags};
use crate::cursor::{ByteCursor, Endian};
use crate::error::{DecodeError, DecodeWarning};

/// One named flag inside a bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitFlag {
    pub name: &'static str,
    pub mask: u64,
}

impl BitFlag {
    pub const fn new(name: &'static str, mask: u64) -> Self {
        Self { name, mask }
    }
}

/// Raw fallback for a value whose length is wrong for its layout.
pub fn length_fallback(name: &'static str, value: &ByteCursor<'_>, expected: usize) -> DecodedObject {
    DecodedObject::bytes(name, value.rest()).with_warning(DecodeWarning::LengthMismatch {
        field: name,
        expected,
        actual: value.remaining(),
    })
}

/// Run `f` only when exactly `width` bytes remain, otherwise fall back to raw bytes.
pub fn fixed<F>(name: &'static str, mut value: ByteCursor<'_>, width: usize, f: F) -> Result<DecodedObject, DecodeError>
where
    F: FnOnce(&mut ByteCursor<'_>) -> Result<DecodedObject, DecodeError>,
{
    if value.remaining() != width {
        return Ok(length_fallback(name, &value, width));
    }
    f(&mut value)
}

/// Run `f` when at least `min` bytes remain, otherwise fall back to raw bytes.
pub fn at_least<F>(name: &'static str, mut value: ByteCursor<'_>, min: usize, f: F) -> Result<DecodedObject, DecodeError>
where
    F: FnOnce(&mut ByteCursor<'_>) -> Result<DecodedObject, DecodeError>,
{
    if value.remaining() < min {
        return Ok(length_fallback(name, &value, min));
    }
    f(&mut value)
}

/// Unsigned integer filling the whole value.
pub fn uint(name: &'static str, value: ByteCursor<'_>, width: usize, endian: Endian) -> DecodedObject {
    let mut c = value;
    let read = match width {
        1 => c.read_u8().map(u64::from),
        2 => c.read_u16(endian).map(u64::from),
        3 => c.read_u24(endian).map(u64::from),
        4 => c.read_u32(endian).map(u64::from),
        8 => c.read_u64(endian),
        _ => return length_fallback(name, &value, width),
    };
    match read {
        Ok(v) if c.is_empty() => DecodedObject::scalar(name, v),
        _ => length_fallback(name, &value, width),
    }
}

/// Big-endian unsigned integer of 0 up to `max_width` bytes (CoAP uint options).
pub fn var_uint(name: &'static str, value: ByteCursor<'_>, max_width: usize) -> DecodedObject {
    if value.remaining() > max_width {
        return length_fallback(name, &value, max_width);
    }
    let mut c = value;
    match c.read_uint(value.remaining()) {
        Ok(v) => DecodedObject::scalar(name, v),
        Err(_) => length_fallback(name, &value, max_width),
    }
}

pub fn ipv4(name: &'static str, value: ByteCursor<'_>) -> DecodedObject {
    let mut c = value;
    match c.read_ipv4() {
        Ok(addr) if c.is_empty() => DecodedObject::address(name, addr),
        _ => length_fallback(name, &value, 4),
    }
}

pub fn ipv6(name: &'static str, value: ByteCursor<'_>) -> DecodedObject {
    let mut c = value;
    match c.read_ipv6() {
        Ok(addr) if c.is_empty() => DecodedObject::address(name, addr),
        _ => length_fallback(name, &value, 16),
    }
}

pub fn float32(name: &'static str, value: ByteCursor<'_>) -> DecodedObject {
    let mut c = value;
    match c.read_f32(Endian::Big) {
        Ok(v) if c.is_empty() => DecodedObject::float(name, v),
        _ => length_fallback(name, &value, 4),
    }
}

pub fn bytes(name: &'static str, value: ByteCursor<'_>) -> DecodedObject {
    DecodedObject::bytes(name, value.rest())
}

/// UTF-8 text; invalid sequences are replaced.
pub fn text(name: &'static str, value: ByteCursor<'_>) -> DecodedObject {
    DecodedObject::text(name, CompactString::from(String::from_utf8_lossy(value.rest())))
}

/// Decode every flag of `flags` from `raw` in one pass.
///
/// Set bits inside `reserved` add a [`DecodeWarning::ReservedFieldNonzero`].
pub fn bitfield(name: &'static str, raw: u64, flags: &[BitFlag], reserved: u64) -> DecodedObject {
    let decoded: Flags = flags.iter().map(|f| (f.name, raw & f.mask != 0)).collect();
    let node = DecodedObject::bitfield(name, decoded);
    if raw & reserved != 0 {
        node.with_warning(DecodeWarning::ReservedFieldNonzero {
            field: name,
            value: raw & reserved,
        })
    } else {
        node
    }
}

/// Extract the bits selected by `mask`, shifted down to bit 0.
pub const fn masked(raw: u64, mask: u64) -> u64 {
    if mask == 0 {
        return 0;
    }
    (raw & mask) >> mask.trailing_zeros()
}

/// Repeated fixed-size records.
///
/// The count comes from the clamped length. Leftover bytes become a
/// `trailing` node with a [`DecodeWarning::LengthMismatch`] on the list.
pub fn repeated<F>(
    name: &'static str,
    mut value: ByteCursor<'_>,
    entry_width: usize,
    mut f: F,
) -> Result<DecodedObject, DecodeError>
where
    F: FnMut(&mut ByteCursor<'_>) -> Result<DecodedObject, DecodeError>,
{
    if entry_width == 0 {
        return Ok(length_fallback(name, &value, 1));
    }
    let total = value.remaining();
    let count = total / entry_width;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let mut entry = value.take(entry_width)?;
        entries.push(f(&mut entry)?);
    }
    let mut node = DecodedObject::composite(name, entries);
    if !value.is_empty() {
        node.push_warning(DecodeWarning::LengthMismatch {
            field: name,
            expected: count * entry_width,
            actual: total,
        });
        node.push_child(DecodedObject::bytes("trailing", value.rest()));
    }
    Ok(node)
}

/// Compare a count derived two ways. Disagreement is a [`DecodeWarning::LengthMismatch`].
pub fn cross_check(field: &'static str, derived: usize, declared: usize) -> Option<DecodeWarning> {
    (derived != declared).then_some(DecodeWarning::LengthMismatch {
        field,
        expected: derived,
        actual: declared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{BE, LE};
    use crate::tlv::DecodedValue;

    const FLAGS: &[BitFlag] = &[BitFlag::new("a", 0x01), BitFlag::new("b", 0x04)];

    // Test 1: fixed-width integers
    #[test]
    fn test_uint_widths() {
        let data = [0x00, 0x00, 0x00, 0x07];
        assert_eq!(uint("x", ByteCursor::new(&data), 4, BE).as_scalar(), Some(7));
        assert_eq!(uint("x", ByteCursor::new(&data[2..]), 2, LE).as_scalar(), Some(0x0700));
    }

    // Test 2: width mismatch falls back to raw bytes
    #[test]
    fn test_uint_mismatch() {
        let data = [0x01, 0x02, 0x03];
        let node = uint("metric", ByteCursor::new(&data), 4, BE);
        assert_eq!(node.as_bytes(), Some(&data[..]));
        assert_eq!(
            node.warnings,
            vec![DecodeWarning::LengthMismatch { field: "metric", expected: 4, actual: 3 }]
        );

        let node = uint("metric", ByteCursor::new(&[0u8; 5]), 4, BE);
        assert!(node.as_scalar().is_none());
        assert_eq!(node.warnings.len(), 1);
    }

    // Test 3: addresses never read past the clamp
    #[test]
    fn test_address_mismatch() {
        let data = [10, 0, 0, 1, 9, 9];
        let clamped = ByteCursor::new(&data).slice(0, 3).unwrap();
        let node = ipv4("addr", clamped);
        assert_eq!(node.as_bytes(), Some(&data[..3]));
        assert!(ipv4("addr", ByteCursor::new(&data[..4])).as_address().is_some());
        assert!(ipv6("addr", ByteCursor::new(&data)).as_address().is_none());
    }

    // Test 4: bitfield in one pass with reserved bits
    #[test]
    fn test_bitfield() {
        let node = bitfield("flags", 0x05, FLAGS, 0xF0);
        assert_eq!(node.flag("a"), Some(true));
        assert_eq!(node.flag("b"), Some(true));
        assert!(node.warnings.is_empty());

        let node = bitfield("flags", 0x81, FLAGS, 0xF0);
        assert_eq!(node.flag("b"), Some(false));
        assert_eq!(
            node.warnings,
            vec![DecodeWarning::ReservedFieldNonzero { field: "flags", value: 0x80 }]
        );
    }

    // Test 5: masked extraction
    #[test]
    fn test_masked() {
        assert_eq!(masked(0xC0, 0xC0), 3);
        assert_eq!(masked(0x34, 0x30), 3);
        assert_eq!(masked(0xFF, 0), 0);
    }

    // Test 6: repeated records with leftover bytes
    #[test]
    fn test_repeated() {
        let data = [0, 1, 0, 2, 0xff];
        let node = repeated("list", ByteCursor::new(&data), 2, |c| {
            Ok(DecodedObject::scalar("entry", c.read_u16(BE)?))
        })
        .unwrap();
        let values: Vec<_> = node.children_named("entry").filter_map(|n| n.as_scalar()).collect();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(node.child("trailing").and_then(|n| n.as_bytes()), Some(&[0xff][..]));
        assert_eq!(
            node.warnings,
            vec![DecodeWarning::LengthMismatch { field: "list", expected: 4, actual: 5 }]
        );
    }

    // Test 7: fixed wrapper passes through only on exact width
    #[test]
    fn test_fixed_wrapper() {
        let data = [0x00, 0x05];
        let ok = fixed("x", ByteCursor::new(&data), 2, |c| Ok(DecodedObject::scalar("x", c.read_u16(BE)?))).unwrap();
        assert_eq!(ok.as_scalar(), Some(5));
        let bad = fixed("x", ByteCursor::new(&data[..1]), 2, |_| unreachable!()).unwrap();
        assert!(matches!(bad.value, DecodedValue::Bytes(_)));
    }

    // Test 8: variable-length uints
    #[test]
    fn test_var_uint() {
        assert_eq!(var_uint("x", ByteCursor::new(&[]), 4).as_scalar(), Some(0));
        assert_eq!(var_uint("x", ByteCursor::new(&[0x01, 0x00]), 4).as_scalar(), Some(256));
        assert!(var_uint("x", ByteCursor::new(&[1, 2, 3, 4, 5]), 4).as_scalar().is_none());
    }

    // Test 9: cross-check
    #[test]
    fn test_cross_check() {
        assert!(cross_check("route", 3, 3).is_none());
        assert_eq!(
            cross_check("route", 3, 2),
            Some(DecodeWarning::LengthMismatch { field: "route", expected: 3, actual: 2 })
        );
    }

    // Test 10: lossy text
    #[test]
    fn test_text() {
        assert_eq!(text("name", ByteCursor::new(b"thread")).as_text(), Some("thread"));
        assert_eq!(text("name", ByteCursor::new(&[0x61, 0xff])).as_text(), Some("a\u{fffd}"));
    }
}
