//! # tlvscope-core
//!
//! Bounded TLV walking and validated decoding for routing and IoT protocols.
//!
//! Every dissector in this crate is a thin layer over one generic engine: a
//! per-protocol [`ObjectTable`] maps type codes to decoders, and the
//! [`TlvWalker`] drives them over a byte range with depth, iteration and
//! bounds guards. Malformed input never panics and never reads past the
//! enclosing object's declared length; it produces `malformed` marker nodes
//! and warnings next to everything that did decode.
//!
//! ## Quick Start
//!
//! ```rust
//! use tlvscope_core::prelude::*;
//!
//! let registry = builtin_registry().unwrap();
//!
//! // MeshCoP Channel TLV: page 0, channel 15
//! let dissection = dissect(registry, &[0x00, 0x03, 0x00, 0x00, 0x0f], "meshcop", None);
//! let channel = dissection.root.find("channel.channel").unwrap();
//! assert_eq!(channel.as_scalar(), Some(15));
//! assert!(dissection.warnings().is_empty());
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          tlvscope-core                              |
//! +---------------------------------------------------------------------+
//! |  cursor/     - ByteCursor, bounds-checked reads over a window       |
//! |  tlv/        - header layouts, object tables, walker, DecodedObject |
//! |  protocol/   - Dissector trait, registry, LMP/MLE/OSPF/CoAP/Thread  |
//! |  crypto/     - AEAD adapter, AES-CCM*, Thread and OSCORE keys       |
//! |  checksum/   - Internet and Fletcher checksums                      |
//! |  cbor/       - CBOR subset encoder for OSCORE structures            |
//! |  error/      - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Supported Protocols
//!
//! | Protocol | Selected by | Notes |
//! |----------|-------------|-------|
//! | LMP | UDP 701 | RFC 4204 objects, LMP-WDM, checksum |
//! | MLE | UDP 19788 | AES-CCM* protected, Thread TLVs |
//! | Thread Network Data | MLE TLV | stable flag in type byte |
//! | MeshCoP | CoAP on UDP 61631, MLE | 0xFF length escape |
//! | OSPF v2/v3 | IP protocol 89 | LSAs, TE and Router Information |
//! | CoAP / OSCORE | UDP 5683, 61631 | delta-nibble options |

pub mod cbor;
pub mod checksum;
pub mod crypto;
pub mod cursor;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod tlv;

// Re-export commonly used types at crate root for convenience
pub use crypto::{
    decrypt_payload, AeadOutcome, AeadPrimitive, AeadRequest, AesCcmStar, CandidateKey, KeyContext,
    KeyProvider, KeyRequest, OscoreContext, PacketInfo, ThreadKeyProvider,
};
pub use cursor::{ByteCursor, Endian};
pub use error::{DecodeError, DecodeWarning, Error, RegistryError, Result};
pub use protocol::{
    builtin_registry, default_registry, dissect, dissect_with, BuiltinDissector, ChecksumPolicy,
    DecodeCtx, DissectConfig, DissectOptions, Dissection, Dissector, ObjectRegistry, Selector,
};
pub use tlv::{
    DecodedObject, DecodedValue, FieldWidth, FixedLayout, HeaderLayout, ObjectTable, RegistryEntry,
    TlvDescriptor, TlvWalker, WalkOutcome, WalkState,
};

/// Crate version, as recorded in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
