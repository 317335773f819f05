//! Dissection context, configuration and results.

use smallvec::SmallVec;
use tracing::debug;

use crate::crypto::{AeadPrimitive, KeyContext, KeyProvider};
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, DecodeWarning};
use crate::tlv::{DecodedObject, TlvWalker, WalkOutcome};

use super::registry::{Dissector, ObjectRegistry};

/// Hint entry for dissector selection: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// How checksum mismatches are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Checksums are not computed.
    Ignore,
    /// A mismatch is a [`DecodeWarning::ChecksumInvalid`] on the header node.
    #[default]
    Advisory,
    /// A mismatch is a [`DecodeError::ChecksumInvalid`] for the whole call.
    Mandatory,
}

/// Per-call limits and policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DissectConfig {
    /// Maximum nesting of walks and sub-dissector calls.
    pub max_depth: usize,
    /// Treat a MIC mismatch as an error instead of a warning.
    pub strict_tag: bool,
    pub validate_checksums: ChecksumPolicy,
}

impl Default for DissectConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            strict_tag: false,
            validate_checksums: ChecksumPolicy::Advisory,
        }
    }
}

impl DissectConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn strict(mut self, strict_tag: bool) -> Self {
        self.strict_tag = strict_tag;
        self
    }

    pub fn with_checksums(mut self, policy: ChecksumPolicy) -> Self {
        self.validate_checksums = policy;
        self
    }
}

/// Lower-layer facts used to pick a dissector when none is named.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    /// Typically `src_port`, `dst_port` and `ip_protocol`.
    pub hints: SmallVec<[HintEntry; 4]>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector for a UDP datagram.
    pub fn udp(src_port: u16, dst_port: u16) -> Self {
        Self::new()
            .with_hint("src_port", u64::from(src_port))
            .with_hint("dst_port", u64::from(dst_port))
    }

    /// Selector for a raw IP payload.
    pub fn ip_protocol(protocol: u8) -> Self {
        Self::new().with_hint("ip_protocol", u64::from(protocol))
    }

    /// Get a hint value by key (linear search, but N is small).
    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Set a hint value (updates existing or appends).
    pub fn set_hint(&mut self, key: &'static str, value: u64) {
        if let Some(entry) = self.hints.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.hints.push((key, value));
        }
    }

    pub fn with_hint(mut self, key: &'static str, value: u64) -> Self {
        self.set_hint(key, value);
        self
    }

    /// True when either UDP port equals `port`.
    pub fn has_port(&self, port: u16) -> bool {
        let port = u64::from(port);
        self.hint("src_port") == Some(port) || self.hint("dst_port") == Some(port)
    }
}

/// State threaded through one dissection.
///
/// Everything borrowed is immutable; only `depth` changes, and every
/// increment is paired with a decrement on the way out.
pub struct DecodeCtx<'r> {
    registry: &'r ObjectRegistry,
    config: &'r DissectConfig,
    keys: Option<&'r KeyContext>,
    crypto: &'r dyn AeadPrimitive,
    selector: &'r Selector,
    reported_len: Option<usize>,
    depth: usize,
}

impl<'r> DecodeCtx<'r> {
    pub fn new(
        registry: &'r ObjectRegistry,
        config: &'r DissectConfig,
        keys: Option<&'r KeyContext>,
        crypto: &'r dyn AeadPrimitive,
        selector: &'r Selector,
    ) -> Self {
        Self {
            registry,
            config,
            keys,
            crypto,
            selector,
            reported_len: None,
            depth: 0,
        }
    }

    /// Original length of the frame when the capture was truncated.
    pub fn with_reported_len(mut self, reported_len: Option<usize>) -> Self {
        self.reported_len = reported_len;
        self
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn config(&self) -> &'r DissectConfig {
        self.config
    }

    pub fn registry(&self) -> &'r ObjectRegistry {
        self.registry
    }

    pub fn keys(&self) -> Option<&'r KeyContext> {
        self.keys
    }

    pub fn crypto(&self) -> &'r dyn AeadPrimitive {
        self.crypto
    }

    pub fn selector(&self) -> &'r Selector {
        self.selector
    }

    pub fn reported_len(&self) -> Option<usize> {
        self.reported_len
    }

    pub fn hint(&self, key: &str) -> Option<u64> {
        self.selector.hint(key)
    }

    pub fn key_provider(&self, hash_id: &str) -> Option<&'r dyn KeyProvider> {
        self.registry.key_provider(hash_id)
    }

    pub fn checksums_enabled(&self) -> bool {
        self.config.validate_checksums != ChecksumPolicy::Ignore
    }

    /// Apply the checksum policy to one comparison.
    ///
    /// Mandatory validation turns a mismatch into an error; advisory
    /// validation records a warning on `node`.
    pub fn check_checksum(
        &self,
        node: &mut DecodedObject,
        protocol: &'static str,
        expected: u16,
        actual: u16,
    ) -> Result<(), DecodeError> {
        if expected == actual {
            return Ok(());
        }
        match self.config.validate_checksums {
            ChecksumPolicy::Ignore => Ok(()),
            ChecksumPolicy::Advisory => {
                node.push_warning(DecodeWarning::ChecksumInvalid {
                    protocol,
                    expected,
                    actual,
                });
                Ok(())
            }
            ChecksumPolicy::Mandatory => Err(DecodeError::ChecksumInvalid {
                protocol,
                expected,
                actual,
            }),
        }
    }

    /// Walk `cursor` with `protocol`'s object table, one level deeper.
    pub fn walk(&mut self, protocol: &'static str, cursor: ByteCursor<'_>) -> WalkOutcome {
        let Some(table) = self.registry.table(protocol) else {
            debug!(protocol, "no object table registered");
            return WalkOutcome::skipped(
                cursor.position(),
                DecodeWarning::MissingDissector {
                    name: protocol.into(),
                },
            );
        };
        self.depth += 1;
        let outcome = TlvWalker::new(table).walk(self, cursor);
        self.depth -= 1;
        outcome
    }

    /// [`walk`](Self::walk) and wrap the children into one composite node.
    ///
    /// Bytes the walk could not decode stay visible as a `malformed` child.
    pub fn walk_composite(&mut self, protocol: &'static str, name: &'static str, cursor: ByteCursor<'_>) -> DecodedObject {
        self.walk(protocol, cursor).into_composite(name)
    }

    /// Hand `data` to the named dissector and return its tree.
    ///
    /// Failures never propagate: a missing dissector yields an opaque `data`
    /// node with a [`DecodeWarning::MissingDissector`], an error yields a
    /// marker node named after the dissector.
    pub fn call_subdissector(&mut self, name: &'static str, data: ByteCursor<'_>) -> DecodedObject {
        let Some(dissector) = self.registry.get_dissector(name) else {
            debug!(dissector = name, "sub-dissector not registered");
            return DecodedObject::bytes("data", data.rest())
                .with_warning(DecodeWarning::MissingDissector { name: name.into() });
        };

        self.depth += 1;
        let limit = self.config.max_depth;
        let result = if self.depth > limit {
            Err(DecodeError::MaxDepthExceeded {
                depth: self.depth,
                limit,
            })
        } else {
            let reported = self.reported_len.take();
            let result = dissector.dissect(self, data);
            self.reported_len = reported;
            result
        };
        self.depth -= 1;

        result.unwrap_or_else(|error| {
            debug!(dissector = name, %error, "sub-dissector failed");
            DecodedObject::aborted(name, error, data.rest())
        })
    }
}

/// Result of one [`dissect`](super::dissect) call.
#[derive(Debug, Clone, PartialEq)]
pub struct Dissection {
    pub root: DecodedObject,
    /// Set when the top-level header was unusable.
    pub error: Option<DecodeError>,
}

impl Dissection {
    pub fn new(root: DecodedObject) -> Self {
        Self { root, error: None }
    }

    /// A call that failed before producing any tree.
    pub fn failed(name: &'static str, error: DecodeError) -> Self {
        Self {
            root: DecodedObject::composite(name, Vec::new()),
            error: Some(error),
        }
    }

    /// Every warning in the tree, in pre-order.
    pub fn warnings(&self) -> Vec<DecodeWarning> {
        self.root.collect_warnings()
    }

    /// The fatal error, else the first local-fatal marker in the tree.
    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref().or_else(|| self.root.first_error())
    }

    pub fn into_parts(self) -> (DecodedObject, Vec<DecodeWarning>, Option<DecodeError>) {
        let warnings = self.warnings();
        let error = self.error().cloned();
        (self.root, warnings, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: hint lookup and update
    #[test]
    fn test_selector_hints() {
        let mut sel = Selector::udp(5683, 40000);
        assert_eq!(sel.hint("src_port"), Some(5683));
        assert!(sel.has_port(40000));
        sel.set_hint("src_port", 1);
        assert_eq!(sel.hint("src_port"), Some(1));
        assert_eq!(sel.hints.len(), 2);
        assert!(sel.hint("ip_protocol").is_none());
    }

    // Test 2: config defaults
    #[test]
    fn test_config_defaults() {
        let config = DissectConfig::default();
        assert_eq!(config.max_depth, 32);
        assert!(!config.strict_tag);
        assert_eq!(config.validate_checksums, ChecksumPolicy::Advisory);
    }

    // Test 3: into_parts reports the first marker error
    #[test]
    fn test_dissection_parts() {
        let root = DecodedObject::composite(
            "frame",
            vec![
                DecodedObject::scalar("a", 1u8).with_warning(DecodeWarning::TagCheckFailed),
                DecodedObject::aborted("malformed", DecodeError::NoKeyAvailable, &[]),
            ],
        );
        let (_, warnings, error) = Dissection::new(root).into_parts();
        assert_eq!(warnings, vec![DecodeWarning::TagCheckFailed]);
        assert_eq!(error, Some(DecodeError::NoKeyAvailable));

        let failed = Dissection::failed("ospf", DecodeError::TagCheckFailed);
        assert!(failed.root.children().is_empty());
        assert_eq!(failed.error(), Some(&DecodeError::TagCheckFailed));
    }
}
