//! Decoded object tree.

use std::net::IpAddr;

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::{DecodeError, DecodeWarning};

/// Flags decoded from one bitfield, in table order.
pub type Flags = SmallVec<[(&'static str, bool); 8]>;

/// Header-level values attached to a node independently of its value.
pub type Attributes = SmallVec<[(&'static str, u64); 1]>;

/// Value carried by a tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Scalar(u64),
    Float(f32),
    Text(CompactString),
    Address(IpAddr),
    Bitfield(Flags),
    Bytes(Vec<u8>),
    Composite(Vec<DecodedObject>),
    /// Type not known to the registry; `raw` is the value range verbatim.
    Unknown { type_code: u32, raw: Vec<u8> },
    /// Decoding stopped here; `raw` is what was left unconsumed.
    Aborted { error: DecodeError, raw: Vec<u8> },
}

/// One node of a decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    pub name: &'static str,
    pub value: DecodedValue,
    pub warnings: Vec<DecodeWarning>,
    /// Bits taken from the object header, such as Thread's stable flag.
    pub attributes: Attributes,
}

impl DecodedObject {
    pub fn new(name: &'static str, value: DecodedValue) -> Self {
        Self {
            name,
            value,
            warnings: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    pub fn scalar(name: &'static str, value: impl Into<u64>) -> Self {
        Self::new(name, DecodedValue::Scalar(value.into()))
    }

    pub fn float(name: &'static str, value: f32) -> Self {
        Self::new(name, DecodedValue::Float(value))
    }

    pub fn text(name: &'static str, value: impl Into<CompactString>) -> Self {
        Self::new(name, DecodedValue::Text(value.into()))
    }

    pub fn address(name: &'static str, addr: impl Into<IpAddr>) -> Self {
        Self::new(name, DecodedValue::Address(addr.into()))
    }

    pub fn bitfield(name: &'static str, flags: Flags) -> Self {
        Self::new(name, DecodedValue::Bitfield(flags))
    }

    pub fn bytes(name: &'static str, raw: &[u8]) -> Self {
        Self::new(name, DecodedValue::Bytes(raw.to_vec()))
    }

    pub fn composite(name: &'static str, children: Vec<DecodedObject>) -> Self {
        Self::new(name, DecodedValue::Composite(children))
    }

    /// Node for a type the registry does not know.
    pub fn unknown(type_code: u32, raw: &[u8]) -> Self {
        Self::new(
            "unknown",
            DecodedValue::Unknown {
                type_code,
                raw: raw.to_vec(),
            },
        )
    }

    /// Marker node for a local-fatal error.
    pub fn aborted(name: &'static str, error: DecodeError, raw: &[u8]) -> Self {
        Self::new(
            name,
            DecodedValue::Aborted {
                error,
                raw: raw.to_vec(),
            },
        )
    }

    pub fn with_warning(mut self, warning: DecodeWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn push_warning(&mut self, warning: DecodeWarning) {
        self.warnings.push(warning);
    }

    /// Append a child. Only composite nodes have children.
    pub fn push_child(&mut self, child: DecodedObject) {
        debug_assert!(
            matches!(self.value, DecodedValue::Composite(_)),
            "push_child on non-composite node `{}`",
            self.name
        );
        if let DecodedValue::Composite(children) = &mut self.value {
            children.push(child);
        }
    }

    pub fn with_attribute(mut self, name: &'static str, value: u64) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: &'static str, value: u64) {
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<u64> {
        self.attributes.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn children(&self) -> &[DecodedObject] {
        match &self.value {
            DecodedValue::Composite(children) => children,
            _ => &[],
        }
    }

    /// First direct child with this name.
    pub fn child(&self, name: &str) -> Option<&DecodedObject> {
        self.children().iter().find(|c| c.name == name)
    }

    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s DecodedObject> + 's {
        self.children().iter().filter(move |c| c.name == name)
    }

    /// Follow a dot-separated path of child names.
    pub fn find(&self, path: &str) -> Option<&DecodedObject> {
        path.split('.').try_fold(self, |node, name| node.child(name))
    }

    pub fn as_scalar(&self) -> Option<u64> {
        match self.value {
            DecodedValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.value {
            DecodedValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            DecodedValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<IpAddr> {
        match self.value {
            DecodedValue::Address(a) => Some(a),
            _ => None,
        }
    }

    /// Raw bytes of a `Bytes`, `Unknown` or `Aborted` node.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            DecodedValue::Bytes(b) => Some(b),
            DecodedValue::Unknown { raw, .. } | DecodedValue::Aborted { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// State of a named flag in a bitfield node.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match &self.value {
            DecodedValue::Bitfield(flags) => flags.iter().find(|(n, _)| *n == name).map(|(_, set)| *set),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.value, DecodedValue::Aborted { .. })
    }

    /// The error carried by this node, if it is a marker.
    pub fn error(&self) -> Option<&DecodeError> {
        match &self.value {
            DecodedValue::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Visit every node in pre-order with its depth below `self`.
    pub fn walk<F: FnMut(&DecodedObject, usize)>(&self, f: &mut F) {
        self.walk_at(0, f);
    }

    fn walk_at<F: FnMut(&DecodedObject, usize)>(&self, depth: usize, f: &mut F) {
        f(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, f);
        }
    }

    /// Every warning in the tree, in pre-order.
    pub fn collect_warnings(&self) -> Vec<DecodeWarning> {
        let mut out = Vec::new();
        self.walk(&mut |node, _| out.extend(node.warnings.iter().cloned()));
        out
    }

    /// The first marker error in pre-order.
    pub fn first_error(&self) -> Option<&DecodeError> {
        if let Some(err) = self.error() {
            return Some(err);
        }
        self.children().iter().find_map(|c| c.first_error())
    }
}
