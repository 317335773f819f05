//! Convenient re-exports for common usage.
//!
//! This module provides a curated set of the most commonly used types
//! from tlvscope-core, allowing you to import them with a single `use` statement.
//!
//! # Example
//!
//! ```rust
//! use tlvscope_core::prelude::*;
//!
//! let registry = default_registry().unwrap();
//! let dissection = dissect(&registry, &[0xff, 0x04], "mle", None);
//! assert!(dissection.error().is_none());
//! ```

// Engine types
pub use crate::cursor::ByteCursor;
pub use crate::tlv::{DecodedObject, DecodedValue, ObjectTable, RegistryEntry, TlvDescriptor};

// Dissection entry points
pub use crate::protocol::{
    builtin_registry, default_registry, dissect, dissect_with, ChecksumPolicy, DissectConfig,
    DissectOptions, Dissection, Dissector, ObjectRegistry, Selector,
};

// Key material
pub use crate::crypto::{KeyContext, OscoreContext, PacketInfo};

// Error types
pub use crate::error::{DecodeError, DecodeWarning, Error, Result};
