//! Generic TLV engine.
//!
//! This module provides:
//! - [`HeaderLayout`] and [`decode_header`] for per-protocol `{type, length}` headers
//! - [`ObjectTable`] and [`RegistryEntry`] for type-to-decoder dispatch
//! - [`TlvWalker`] for bounded, depth-limited walking of object streams
//! - [`DecodedObject`], the tree every decoder produces
//! - [`field`] helpers for leaf values

pub mod field;
mod header;
mod object;
mod table;
mod walker;

pub use field::BitFlag;
pub use header::{
    decode_header, FieldWidth, FixedLayout, HeaderLayout, HeaderState, LengthEscape, TlvDescriptor,
};
pub use object::{Attributes, DecodedObject, DecodedValue, Flags};
pub use table::{decode_unknown, DecodeFn, ObjectTable, RegistryEntry, TypeMatch};
pub use walker::{TlvWalker, WalkOutcome, WalkState};
