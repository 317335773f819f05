//! Object registry: protocol tables, dissectors and key providers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::crypto::KeyProvider;
use crate::cursor::ByteCursor;
use crate::error::{DecodeError, RegistryError};
use crate::tlv::{DecodedObject, HeaderLayout, ObjectTable, RegistryEntry};

use super::{
    CoapDissector, CoapInnerDissector, DecodeCtx, LmpDissector, MeshcopDissector, MleDissector,
    OspfDissector, Selector, ThreadNwdDissector,
};

/// Core trait all full-frame dissectors implement.
pub trait Dissector: Send + Sync {
    /// Unique identifier (e.g., "lmp", "thread.nwd").
    fn name(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Priority score when this dissector recognizes the selector
    /// (higher = more specific). `None` for sub-dissectors only reached by name.
    fn can_parse(&self, _selector: &Selector) -> Option<u32> {
        None
    }

    /// Decode one frame or payload into a tree.
    ///
    /// `Err` means the top-level header was unusable; everything below it
    /// degrades to marker nodes instead.
    fn dissect(&self, ctx: &mut DecodeCtx<'_>, cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError>;
}

/// Enum of all built-in dissectors.
///
/// Static dispatch for the built-ins; `Custom` carries anything registered
/// at runtime.
#[derive(Clone)]
pub enum BuiltinDissector {
    Lmp(LmpDissector),
    Mle(MleDissector),
    ThreadNwd(ThreadNwdDissector),
    Meshcop(MeshcopDissector),
    Ospf(OspfDissector),
    Coap(CoapDissector),
    CoapInner(CoapInnerDissector),
    Custom(Arc<dyn Dissector>),
}

/// Macro to delegate Dissector trait methods to inner types.
macro_rules! delegate_dissector {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            BuiltinDissector::Lmp(d) => d.$method($($arg),*),
            BuiltinDissector::Mle(d) => d.$method($($arg),*),
            BuiltinDissector::ThreadNwd(d) => d.$method($($arg),*),
            BuiltinDissector::Meshcop(d) => d.$method($($arg),*),
            BuiltinDissector::Ospf(d) => d.$method($($arg),*),
            BuiltinDissector::Coap(d) => d.$method($($arg),*),
            BuiltinDissector::CoapInner(d) => d.$method($($arg),*),
            BuiltinDissector::Custom(d) => d.$method($($arg),*),
        }
    };
}

impl Dissector for BuiltinDissector {
    #[inline]
    fn name(&self) -> &'static str {
        delegate_dissector!(self, name)
    }

    #[inline]
    fn display_name(&self) -> &'static str {
        delegate_dissector!(self, display_name)
    }

    #[inline]
    fn can_parse(&self, selector: &Selector) -> Option<u32> {
        delegate_dissector!(self, can_parse, selector)
    }

    #[inline]
    fn dissect(&self, ctx: &mut DecodeCtx<'_>, cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        delegate_dissector!(self, dissect, ctx, cursor)
    }
}

impl fmt::Debug for BuiltinDissector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BuiltinDissector").field(&self.name()).finish()
    }
}

/// Conversion traits for ergonomic registration.
impl From<LmpDissector> for BuiltinDissector {
    fn from(d: LmpDissector) -> Self {
        BuiltinDissector::Lmp(d)
    }
}

impl From<MleDissector> for BuiltinDissector {
    fn from(d: MleDissector) -> Self {
        BuiltinDissector::Mle(d)
    }
}

impl From<ThreadNwdDissector> for BuiltinDissector {
    fn from(d: ThreadNwdDissector) -> Self {
        BuiltinDissector::ThreadNwd(d)
    }
}

impl From<MeshcopDissector> for BuiltinDissector {
    fn from(d: MeshcopDissector) -> Self {
        BuiltinDissector::Meshcop(d)
    }
}

impl From<OspfDissector> for BuiltinDissector {
    fn from(d: OspfDissector) -> Self {
        BuiltinDissector::Ospf(d)
    }
}

impl From<CoapDissector> for BuiltinDissector {
    fn from(d: CoapDissector) -> Self {
        BuiltinDissector::Coap(d)
    }
}

impl From<CoapInnerDissector> for BuiltinDissector {
    fn from(d: CoapInnerDissector) -> Self {
        BuiltinDissector::CoapInner(d)
    }
}

impl From<Arc<dyn Dissector>> for BuiltinDissector {
    fn from(d: Arc<dyn Dissector>) -> Self {
        BuiltinDissector::Custom(d)
    }
}

/// Everything a dissection looks up by name.
///
/// Built once at startup and immutable afterwards, so one instance can be
/// shared by reference across threads.
#[derive(Default)]
pub struct ObjectRegistry {
    tables: HashMap<&'static str, ObjectTable>,
    dissectors: Vec<BuiltinDissector>,
    key_providers: HashMap<&'static str, Arc<dyn KeyProvider>>,
}

impl ObjectRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully built object table.
    pub fn register_table(&mut self, table: ObjectTable) -> Result<(), RegistryError> {
        let protocol = table.protocol();
        if self.tables.contains_key(protocol) {
            return Err(RegistryError::DuplicateProtocol(protocol));
        }
        self.tables.insert(protocol, table);
        Ok(())
    }

    /// Build and register a table from a layout and its entries.
    pub fn register_protocol(
        &mut self,
        protocol: &'static str,
        layout: impl Into<HeaderLayout>,
        entries: &[RegistryEntry],
    ) -> Result<(), RegistryError> {
        self.register_table(ObjectTable::new(protocol, layout.into(), entries)?)
    }

    pub fn register_dissector<D: Into<BuiltinDissector>>(&mut self, dissector: D) -> Result<(), RegistryError> {
        let dissector = dissector.into();
        let name = dissector.name();
        if self.get_dissector(name).is_some() {
            return Err(RegistryError::DuplicateDissector(name));
        }
        self.dissectors.push(dissector);
        Ok(())
    }

    pub fn register_key_provider<P>(&mut self, hash_id: &'static str, provider: P) -> Result<(), RegistryError>
    where
        P: KeyProvider + 'static,
    {
        if self.key_providers.contains_key(hash_id) {
            return Err(RegistryError::DuplicateKeyProvider(hash_id));
        }
        self.key_providers.insert(hash_id, Arc::new(provider));
        Ok(())
    }

    pub fn table(&self, protocol: &str) -> Option<&ObjectTable> {
        self.tables.get(protocol)
    }

    /// Get a dissector by name.
    pub fn get_dissector(&self, name: &str) -> Option<&BuiltinDissector> {
        self.dissectors.iter().find(|d| d.name() == name)
    }

    /// Find the best dissector for the given selector.
    #[inline]
    pub fn find_dissector(&self, selector: &Selector) -> Option<&BuiltinDissector> {
        self.dissectors
            .iter()
            .filter_map(|d| d.can_parse(selector).map(|priority| (d, priority)))
            .max_by_key(|(_, priority)| *priority)
            .map(|(dissector, _)| dissector)
    }

    pub fn key_provider(&self, hash_id: &str) -> Option<&dyn KeyProvider> {
        self.key_providers.get(hash_id).map(|p| p.as_ref())
    }

    /// Get all registered dissectors.
    pub fn all_dissectors(&self) -> impl Iterator<Item = &BuiltinDissector> {
        self.dissectors.iter()
    }

    /// Names of all registered object tables, sorted.
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tables.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<_> = self.key_providers.keys().collect();
        providers.sort_unstable();
        f.debug_struct("ObjectRegistry")
            .field("tables", &self.table_names())
            .field("dissectors", &self.dissectors)
            .field("key_providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CandidateKey, KeyRequest};
    use crate::tlv::{FieldWidth, FixedLayout};

    struct Echo;

    impl Dissector for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn can_parse(&self, selector: &Selector) -> Option<u32> {
            selector.has_port(7).then_some(200)
        }

        fn dissect(&self, _ctx: &mut DecodeCtx<'_>, cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
            Ok(DecodedObject::bytes("echo", cursor.rest()))
        }
    }

    fn no_keys(_: &KeyRequest<'_>) -> Vec<CandidateKey> {
        Vec::new()
    }

    // Test 1: duplicate registrations are startup errors
    #[test]
    fn test_duplicates() {
        let mut registry = ObjectRegistry::new();
        let layout = FixedLayout::new(FieldWidth::One, FieldWidth::One);
        registry.register_protocol("x", layout, &[]).unwrap();
        assert_eq!(
            registry.register_protocol("x", layout, &[]),
            Err(RegistryError::DuplicateProtocol("x"))
        );

        registry.register_key_provider("k", no_keys).unwrap();
        assert_eq!(
            registry.register_key_provider("k", no_keys),
            Err(RegistryError::DuplicateKeyProvider("k"))
        );

        registry.register_dissector(LmpDissector).unwrap();
        assert_eq!(
            registry.register_dissector(LmpDissector),
            Err(RegistryError::DuplicateDissector("lmp"))
        );
    }

    // Test 2: highest priority wins
    #[test]
    fn test_find_dissector_priority() {
        let mut registry = ObjectRegistry::new();
        registry.register_dissector(LmpDissector).unwrap();
        registry
            .register_dissector(Arc::new(Echo) as Arc<dyn Dissector>)
            .unwrap();

        let found = registry.find_dissector(&Selector::udp(701, 7)).unwrap();
        assert_eq!(found.name(), "echo");
        let found = registry.find_dissector(&Selector::udp(701, 9)).unwrap();
        assert_eq!(found.name(), "lmp");
        assert!(registry.find_dissector(&Selector::udp(1, 2)).is_none());
    }

    // Test 3: the registry is shareable across threads
    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ObjectRegistry>();
    }
}
