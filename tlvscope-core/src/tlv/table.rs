//! Per-protocol object tables.
//!
//! An [`ObjectTable`] maps the type codes of one TLV stream to decoders. It is
//! built once at registration time and only read afterwards.

use std::collections::BTreeMap;
use std::fmt;

use super::{DecodedObject, HeaderLayout, TlvDescriptor};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, DecodeWarning, RegistryError};
use crate::protocol::DecodeCtx;

/// Decoder for one object's value.
///
/// The cursor is clamped to the object's declared value range.
pub type DecodeFn =
    fn(&mut DecodeCtx<'_>, &TlvDescriptor, ByteCursor<'_>) -> Result<DecodedObject, DecodeError>;

/// Which type codes an entry handles.
#[derive(Clone, Copy)]
pub enum TypeMatch {
    Exact(u32),
    /// Inclusive range.
    Range { start: u32, end: u32 },
    Predicate(fn(u32) -> bool),
}

impl TypeMatch {
    pub fn matches(&self, type_code: u32) -> bool {
        match *self {
            TypeMatch::Exact(t) => t == type_code,
            TypeMatch::Range { start, end } => (start..=end).contains(&type_code),
            TypeMatch::Predicate(f) => f(type_code),
        }
    }
}

impl fmt::Debug for TypeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeMatch::Exact(t) => write!(f, "Exact({t})"),
            TypeMatch::Range { start, end } => write!(f, "Range({start}..={end})"),
            TypeMatch::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// One row of an object table.
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub types: TypeMatch,
    pub decoder: DecodeFn,
    /// Table this entry's value is walked with, when it nests objects.
    pub subtree: Option<&'static str>,
}

impl RegistryEntry {
    pub const fn exact(type_code: u32, name: &'static str, decoder: DecodeFn) -> Self {
        Self {
            name,
            types: TypeMatch::Exact(type_code),
            decoder,
            subtree: None,
        }
    }

    pub const fn range(start: u32, end: u32, name: &'static str, decoder: DecodeFn) -> Self {
        Self {
            name,
            types: TypeMatch::Range { start, end },
            decoder,
            subtree: None,
        }
    }

    pub const fn predicate(pred: fn(u32) -> bool, name: &'static str, decoder: DecodeFn) -> Self {
        Self {
            name,
            types: TypeMatch::Predicate(pred),
            decoder,
            subtree: None,
        }
    }

    pub const fn with_subtree(mut self, protocol: &'static str) -> Self {
        self.subtree = Some(protocol);
        self
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("subtree", &self.subtree)
            .finish()
    }
}

/// Decoder used for every type a table does not accept.
///
/// Copies the value verbatim so unknown objects survive untouched.
pub fn decode_unknown(protocol: &'static str, desc: &TlvDescriptor, value: ByteCursor<'_>) -> DecodedObject {
    DecodedObject::unknown(desc.type_code, value.window()).with_warning(DecodeWarning::UnknownType {
        protocol,
        type_code: desc.type_code,
    })
}

/// Object table for one TLV stream.
#[derive(Debug, Clone)]
pub struct ObjectTable {
    protocol: &'static str,
    layout: HeaderLayout,
    valid_type: Option<fn(u32) -> bool>,
    terminator: Option<u8>,
    trailing_slack: usize,
    header_attribute: Option<(&'static str, u8)>,
    exact: BTreeMap<u32, usize>,
    ranged: Vec<usize>,
    entries: Vec<RegistryEntry>,
}

impl ObjectTable {
    /// Build a table. Two exact entries for one type code are a mistake.
    pub fn new(
        protocol: &'static str,
        layout: HeaderLayout,
        entries: &[RegistryEntry],
    ) -> Result<Self, RegistryError> {
        let mut exact = BTreeMap::new();
        let mut ranged = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match entry.types {
                TypeMatch::Exact(type_code) => {
                    if exact.insert(type_code, index).is_some() {
                        return Err(RegistryError::DuplicateType { protocol, type_code });
                    }
                }
                _ => ranged.push(index),
            }
        }
        Ok(Self {
            protocol,
            layout,
            valid_type: None,
            terminator: None,
            trailing_slack: 0,
            header_attribute: None,
            exact,
            ranged,
            entries: entries.to_vec(),
        })
    }

    /// Types rejected by `pred` always decode as unknown.
    pub fn with_valid_types(mut self, pred: fn(u32) -> bool) -> Self {
        self.valid_type = Some(pred);
        self
    }

    /// A byte that ends the stream when it appears where a header would start.
    pub fn with_terminator(mut self, byte: u8) -> Self {
        self.terminator = Some(byte);
        self
    }

    /// Trailing bytes up to this count that cannot hold a header end the walk cleanly.
    pub fn with_trailing_slack(mut self, bytes: usize) -> Self {
        self.trailing_slack = bytes;
        self
    }

    /// Copy `flags & mask` from every header onto its node as attribute `name`.
    pub fn with_header_attribute(mut self, name: &'static str, mask: u8) -> Self {
        self.header_attribute = Some((name, mask));
        self
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn layout(&self) -> &HeaderLayout {
        &self.layout
    }

    pub fn terminator(&self) -> Option<u8> {
        self.terminator
    }

    pub fn trailing_slack(&self) -> usize {
        self.trailing_slack
    }

    pub fn header_attribute(&self) -> Option<(&'static str, u8)> {
        self.header_attribute
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn is_valid_type(&self, type_code: u32) -> bool {
        self.valid_type.map_or(true, |pred| pred(type_code))
    }

    /// Entry for `type_code`, or `None` when it must decode as unknown.
    pub fn lookup(&self, type_code: u32) -> Option<&RegistryEntry> {
        if !self.is_valid_type(type_code) {
            return None;
        }
        if let Some(&index) = self.exact.get(&type_code) {
            return self.entries.get(index);
        }
        self.ranged
            .iter()
            .filter_map(|&index| self.entries.get(index))
            .find(|entry| entry.types.matches(type_code))
    }
}
