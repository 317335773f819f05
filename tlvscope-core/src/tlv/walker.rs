//! The recursive TLV walker.
//!
//! ```text
//! Start -> (HeaderDecode -> Dispatch -> Advance)* -> Done | Terminated | Aborted
//! ```
//!
//! The walker owns three guarantees:
//!
//! - every iteration moves forward by at least one header width, and the next
//!   header is always read at the previous object's *declared* end;
//! - nesting deeper than [`DissectConfig::max_depth`](crate::DissectConfig)
//!   aborts with [`DecodeError::MaxDepthExceeded`];
//! - a malformed header aborts this walk only, keeping every sibling decoded
//!   so far plus a `malformed` marker with the unconsumed bytes.
//!
//! A decoder that fails does not end the walk. Its object becomes a marker and
//! the walker continues at the declared end.

use tracing::{debug, trace};

use super::header::{decode_header, HeaderState};
use super::table::{decode_unknown, ObjectTable};
use super::DecodedObject;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, DecodeWarning};
use crate::protocol::DecodeCtx;

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// The container was consumed exactly (or within the trailing slack).
    Done,
    /// The table's terminator byte was found and consumed.
    Terminated,
    /// A fatal error stopped the walk.
    Aborted,
}

/// Result of walking one container.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOutcome {
    /// Decoded objects in buffer order, ending with a marker when aborted.
    pub children: Vec<DecodedObject>,
    /// Warnings about the container itself.
    pub warnings: Vec<DecodeWarning>,
    pub state: WalkState,
    pub error: Option<DecodeError>,
    /// Absolute offset where the walk stopped.
    pub end: usize,
    pub iterations: usize,
}

impl WalkOutcome {
    fn new(start: usize) -> Self {
        Self {
            children: Vec::new(),
            warnings: Vec::new(),
            state: WalkState::Done,
            error: None,
            end: start,
            iterations: 0,
        }
    }

    fn abort(mut self, error: DecodeError, unconsumed: &[u8]) -> Self {
        debug!(%error, at = self.end, decoded = self.children.len(), "walk aborted");
        self.children
            .push(DecodedObject::aborted("malformed", error.clone(), unconsumed));
        self.error = Some(error);
        self.state = WalkState::Aborted;
        self
    }

    /// Outcome of a walk that could not start; carries a single warning.
    pub fn skipped(start: usize, warning: DecodeWarning) -> Self {
        let mut out = Self::new(start);
        out.warnings.push(warning);
        out
    }

    pub fn is_aborted(&self) -> bool {
        self.state == WalkState::Aborted
    }

    /// Wrap the children into one composite node.
    pub fn into_composite(self, name: &'static str) -> DecodedObject {
        let mut node = DecodedObject::composite(name, self.children);
        node.warnings = self.warnings;
        node
    }
}

/// Walks one container with one object table.
#[derive(Debug, Clone, Copy)]
pub struct TlvWalker<'t> {
    table: &'t ObjectTable,
}

impl<'t> TlvWalker<'t> {
    pub fn new(table: &'t ObjectTable) -> Self {
        Self { table }
    }

    /// Walk every object in `cursor`.
    ///
    /// The caller is responsible for incrementing `ctx`'s depth around the
    /// call; [`DecodeCtx::walk`] does so.
    pub fn walk(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> WalkOutcome {
        let table = self.table;
        let mut out = WalkOutcome::new(cursor.position());

        let limit = ctx.config().max_depth;
        if ctx.depth() > limit {
            return out.abort(
                DecodeError::MaxDepthExceeded {
                    depth: ctx.depth(),
                    limit,
                },
                cursor.rest(),
            );
        }

        let layout = *table.layout();
        let min_header = layout.min_header_width().max(1);
        let max_iterations = cursor.remaining() / min_header + 1;
        let mut state = HeaderState::default();

        loop {
            out.end = cursor.position();
            if cursor.is_empty() {
                break;
            }

            if let Some(terminator) = table.terminator() {
                if cursor.peek_u8() == Ok(terminator) {
                    if let Err(error) = cursor.advance(1) {
                        return out.abort(error, cursor.rest());
                    }
                    out.end = cursor.position();
                    out.state = WalkState::Terminated;
                    break;
                }
            }

            if cursor.remaining() < min_header && cursor.remaining() <= table.trailing_slack() {
                out.children.push(DecodedObject::bytes("padding", cursor.rest()));
                out.end = cursor.limit();
                break;
            }

            if out.iterations >= max_iterations {
                return out.abort(
                    DecodeError::IterationLimitExceeded {
                        limit: max_iterations,
                    },
                    cursor.rest(),
                );
            }
            out.iterations += 1;

            let desc = match decode_header(&mut cursor, &layout, &mut state) {
                Ok(desc) => desc,
                Err(error) => return out.abort(error, cursor.rest()),
            };

            let value = match cursor.slice(desc.value_start, desc.value_len()) {
                Ok(value) => value,
                Err(error) => return out.abort(error, cursor.rest()),
            };

            let mut node = match table.lookup(desc.type_code) {
                Some(entry) => {
                    trace!(
                        protocol = table.protocol(),
                        object = entry.name,
                        type_code = desc.type_code,
                        len = desc.declared_length,
                        "dispatch"
                    );
                    match (entry.decoder)(ctx, &desc, value) {
                        Ok(node) => node,
                        Err(error) => {
                            debug!(protocol = table.protocol(), object = entry.name, %error, "decoder failed");
                            DecodedObject::aborted(entry.name, error, value.window())
                        }
                    }
                }
                None => decode_unknown(table.protocol(), &desc, value),
            };
            if let Some((name, mask)) = table.header_attribute() {
                node.set_attribute(name, u64::from(desc.flags & mask));
            }
            out.children.push(node);

            // The declared end is authoritative, whatever the decoder consumed.
            if let Err(error) = cursor.seek(desc.next) {
                return out.abort(error, &[]);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesCcmStar;
    use crate::cursor::BE;
    use crate::protocol::{DissectConfig, ObjectRegistry, Selector};
    use crate::tlv::field;
    use crate::tlv::{FieldWidth, FixedLayout, RegistryEntry};

    const LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::One);

    const ENTRIES: &[RegistryEntry] = &[
        RegistryEntry::exact(1, "value", |_, _, v| Ok(field::uint("value", v, 1, BE))),
        RegistryEntry::exact(2, "nested", |ctx, _, v| Ok(ctx.walk_composite("test", "nested", v))),
        RegistryEntry::exact(3, "failing", |_, _, _| Err(DecodeError::malformed("test", "failing", "always"))),
        RegistryEntry::exact(4, "first_byte", |_, _, mut v| Ok(DecodedObject::scalar("first_byte", v.read_u8()?))),
    ];

    fn registry() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.register_protocol("test", LAYOUT, ENTRIES).unwrap();
        registry
            .register_table(ObjectTable::new("test.slack", LAYOUT.into(), ENTRIES).unwrap().with_trailing_slack(1))
            .unwrap();
        registry
            .register_table(ObjectTable::new("test.term", LAYOUT.into(), ENTRIES).unwrap().with_terminator(0xFF))
            .unwrap();
        registry
    }

    fn walk_with(protocol: &'static str, data: &[u8], config: &DissectConfig) -> WalkOutcome {
        let registry = registry();
        let selector = Selector::new();
        let mut ctx = DecodeCtx::new(&registry, config, None, &AesCcmStar, &selector);
        ctx.walk(protocol, ByteCursor::new(data))
    }

    fn walk(protocol: &'static str, data: &[u8]) -> WalkOutcome {
        walk_with(protocol, data, &DissectConfig::default())
    }

    fn nest(levels: usize) -> Vec<u8> {
        if levels == 0 {
            return vec![1, 1, 0];
        }
        let inner = nest(levels - 1);
        let mut out = vec![2, inner.len() as u8];
        out.extend(inner);
        out
    }

    // Test 1: objects in buffer order, unknown types kept verbatim
    #[test]
    fn test_walk_in_order() {
        let out = walk("test", &[1, 1, 5, 9, 2, 0xaa, 0xbb, 1, 1, 6]);
        assert_eq!(out.state, WalkState::Done);
        assert_eq!(out.end, 10);
        assert_eq!(out.iterations, 3);
        assert_eq!(out.children[0].as_scalar(), Some(5));
        assert_eq!(out.children[1].value, crate::tlv::DecodedValue::Unknown { type_code: 9, raw: vec![0xaa, 0xbb] });
        assert_eq!(
            out.children[1].warnings,
            vec![DecodeWarning::UnknownType { protocol: "test", type_code: 9 }]
        );
        assert_eq!(out.children[2].as_scalar(), Some(6));
    }

    // Test 2: a bad header aborts after the decoded siblings
    #[test]
    fn test_header_error_aborts() {
        let out = walk("test", &[1, 1, 5, 1, 5, 0]);
        assert!(out.is_aborted());
        assert_eq!(out.children.len(), 2);
        assert_eq!(out.children[0].as_scalar(), Some(5));
        let marker = &out.children[1];
        assert_eq!(marker.name, "malformed");
        assert_eq!(marker.as_bytes(), Some(&[1, 5, 0][..]));
        assert_eq!(
            out.error,
            Some(DecodeError::LengthMismatch { type_code: 1, declared: 5, available: 1 })
        );
        assert_eq!(out.end, 3);
    }

    // Test 3: a failing decoder only marks its own object
    #[test]
    fn test_decoder_error_continues() {
        let out = walk("test", &[3, 1, 0xee, 1, 1, 7]);
        assert_eq!(out.state, WalkState::Done);
        assert!(out.children[0].is_aborted());
        assert_eq!(out.children[0].name, "failing");
        assert_eq!(out.children[0].as_bytes(), Some(&[0xee][..]));
        assert_eq!(out.children[1].as_scalar(), Some(7));
    }

    // Test 4: the next header is read at the declared end
    #[test]
    fn test_declared_length_authority() {
        let out = walk("test", &[4, 3, 1, 2, 3, 1, 1, 9]);
        assert_eq!(out.children.len(), 2);
        assert_eq!(out.children[0].as_scalar(), Some(1));
        assert_eq!(out.children[1].as_scalar(), Some(9));
    }

    // Test 5: nesting past the limit becomes a marker
    #[test]
    fn test_depth_limit() {
        let config = DissectConfig::default().with_max_depth(3);
        let out = walk_with("test", &nest(6), &config);
        assert_eq!(out.state, WalkState::Done);
        let tree = out.into_composite("root");
        assert_eq!(
            tree.first_error(),
            Some(&DecodeError::MaxDepthExceeded { depth: 4, limit: 3 })
        );

        let out = walk_with("test", &nest(2), &config);
        assert!(out.into_composite("root").first_error().is_none());
    }

    // Test 6: trailing slack versus a truncated header
    #[test]
    fn test_trailing_bytes() {
        let out = walk("test.slack", &[1, 1, 5, 0x00]);
        assert_eq!(out.state, WalkState::Done);
        assert_eq!(out.children[1].name, "padding");

        let out = walk("test", &[1, 1, 5, 0x00]);
        assert!(out.is_aborted());
        assert!(matches!(out.error, Some(DecodeError::BoundsExceeded { .. })));
        assert_eq!(out.children[1].as_bytes(), Some(&[0x00][..]));
    }

    // Test 7: terminator byte ends the walk
    #[test]
    fn test_terminator() {
        let out = walk("test.term", &[1, 1, 5, 0xff, 0xaa]);
        assert_eq!(out.state, WalkState::Terminated);
        assert_eq!(out.end, 4);
        assert_eq!(out.children.len(), 1);

        let last = walk("test.term", &[1, 1, 5, 0xff]);
        assert_eq!(last.state, WalkState::Terminated);
        assert_eq!(last.end, 4);
        assert!(last.error.is_none());
    }

    // Test 8: zero-length objects still advance
    #[test]
    fn test_zero_length_progress() {
        let data = [9u8, 0].repeat(50);
        let out = walk("test", &data);
        assert_eq!(out.state, WalkState::Done);
        assert_eq!(out.iterations, 50);
        assert_eq!(out.end, 100);
    }

    // Test 9: unregistered table
    #[test]
    fn test_missing_table() {
        let out = walk("nope", &[1, 1, 5]);
        assert!(out.children.is_empty());
        assert_eq!(out.warnings, vec![DecodeWarning::MissingDissector { name: "nope".into() }]);
    }
}
