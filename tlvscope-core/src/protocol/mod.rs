//! Protocol dissectors built on the TLV engine.
//!
//! This module provides:
//! - [`Dissector`] trait for full-frame decoders
//! - [`ObjectRegistry`] holding object tables, dissectors and key providers
//! - [`dissect`] / [`dissect_with`] entry points
//! - Built-in dissectors
//!
//! ## Supported Protocols
//!
//! | Dissector | Transport | Object tables |
//! |-----------|-----------|---------------|
//! | `lmp` | UDP 701 | `lmp`, `lmp.data_link` |
//! | `mle` | UDP 19788 | `mle` |
//! | `thread.nwd` | MLE Network Data TLV | `thread.nwd` |
//! | `meshcop` | CoAP payload / MLE datasets | `meshcop` |
//! | `ospf` | IP protocol 89 | `ospf.te`, `ospf.te.link`, `ospf.ri` |
//! | `coap` | UDP 5683, 61631 | `coap.options` |
//! | `coap.inner` | OSCORE plaintext | `coap.options` |
//!
//! ## Example
//!
//! ```rust
//! use tlvscope_core::protocol::{builtin_registry, dissect};
//!
//! let registry = builtin_registry().unwrap();
//! // LMP Config carrying LOCAL_CCID 7
//! let frame: &[u8] = &[
//!     0x10, 0x00, 0x00, 0x01, 0x00, 0x10, 0x00, 0x00, // common header
//!     0x01, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07, // LOCAL_CCID = 7
//! ];
//!
//! let dissection = dissect(registry, frame, "lmp", None);
//! let ccid = dissection.root.find("objects.local_ccid").unwrap();
//! assert_eq!(ccid.as_scalar(), Some(7));
//! ```

mod context;
mod registry;

// Dissector implementations
mod coap;
mod lmp;
mod meshcop;
mod mle;
mod oscore;
mod ospf;
mod thread_nwd;

pub mod test_utils;

use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::crypto::{AeadPrimitive, AesCcmStar, KeyContext, ThreadKeyProvider, THREAD_MLE_KEY_HASH};
use crate::cursor::ByteCursor;
use crate::error::{DecodeWarning, RegistryError};
use crate::tlv::DecodedObject;

pub use context::{ChecksumPolicy, DecodeCtx, DissectConfig, Dissection, HintEntry, Selector};
pub use registry::{BuiltinDissector, Dissector, ObjectRegistry};

pub use coap::{CoapDissector, CoapInnerDissector};
pub use lmp::LmpDissector;
pub use meshcop::MeshcopDissector;
pub use mle::MleDissector;
pub use ospf::OspfDissector;
pub use thread_nwd::ThreadNwdDissector;

/// Create a registry with all built-in tables, dissectors and key providers.
pub fn default_registry() -> Result<ObjectRegistry, RegistryError> {
    let mut registry = ObjectRegistry::new();

    // Routing and link management
    lmp::register(&mut registry)?;
    ospf::register(&mut registry)?;

    // Thread
    mle::register(&mut registry)?;
    thread_nwd::register(&mut registry)?;
    meshcop::register(&mut registry)?;
    registry.register_key_provider(THREAD_MLE_KEY_HASH, ThreadKeyProvider)?;

    // Constrained application layer
    coap::register(&mut registry)?;

    Ok(registry)
}

/// Process-wide registry, built on first use.
pub fn builtin_registry() -> Result<&'static ObjectRegistry, RegistryError> {
    static REGISTRY: OnceLock<Result<ObjectRegistry, RegistryError>> = OnceLock::new();
    REGISTRY.get_or_init(default_registry).as_ref().map_err(Clone::clone)
}

/// Everything one [`dissect_with`] call may be given.
#[derive(Clone, Default)]
pub struct DissectOptions<'a> {
    /// Dissector to run; selected from `selector` when `None`.
    pub protocol: Option<&'a str>,
    pub config: DissectConfig,
    pub keys: Option<&'a KeyContext>,
    /// Defaults to [`AesCcmStar`].
    pub crypto: Option<&'a dyn AeadPrimitive>,
    pub selector: Selector,
    /// Original frame length when the capture was truncated.
    pub reported_len: Option<usize>,
}

impl<'a> DissectOptions<'a> {
    pub fn new(protocol: &'a str) -> Self {
        Self {
            protocol: Some(protocol),
            ..Self::default()
        }
    }

    /// Options that pick the dissector from lower-layer hints.
    pub fn selected(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: DissectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_keys(mut self, keys: Option<&'a KeyContext>) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_crypto(mut self, crypto: &'a dyn AeadPrimitive) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_reported_len(mut self, reported_len: usize) -> Self {
        self.reported_len = Some(reported_len);
        self
    }
}

/// Dissect `frame` as `protocol` with the default configuration.
pub fn dissect(registry: &ObjectRegistry, frame: &[u8], protocol: &str, keys: Option<&KeyContext>) -> Dissection {
    dissect_with(registry, frame, &DissectOptions::new(protocol).with_keys(keys))
}

/// Dissect `frame` with explicit options.
///
/// Never fails: an unknown protocol yields an opaque `data` root with a
/// [`DecodeWarning::MissingDissector`], an unusable top-level header yields
/// an empty root and [`Dissection::error`].
pub fn dissect_with(registry: &ObjectRegistry, frame: &[u8], options: &DissectOptions<'_>) -> Dissection {
    let dissector = match options.protocol {
        Some(name) => registry.get_dissector(name),
        None => registry.find_dissector(&options.selector),
    };
    let Some(dissector) = dissector else {
        let name = options.protocol.unwrap_or("unknown");
        debug!(protocol = name, "no dissector");
        return Dissection::new(
            DecodedObject::bytes("data", frame)
                .with_warning(DecodeWarning::MissingDissector { name: name.into() }),
        );
    };

    let crypto: &dyn AeadPrimitive = match options.crypto {
        Some(crypto) => crypto,
        None => &AesCcmStar,
    };
    let mut ctx = DecodeCtx::new(registry, &options.config, options.keys, crypto, &options.selector)
        .with_reported_len(options.reported_len);

    trace!(dissector = dissector.name(), len = frame.len(), "dissect");
    match dissector.dissect(&mut ctx, ByteCursor::new(frame)) {
        Ok(root) => Dissection::new(root),
        Err(error) => {
            debug!(dissector = dissector.name(), %error, "frame rejected");
            Dissection::failed(dissector.name(), error)
        }
    }
}
