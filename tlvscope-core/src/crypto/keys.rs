//! Key material supplied by the caller.
//!
//! A [`KeyContext`] travels with a single dissection. Registered
//! [`KeyProvider`]s turn it into ordered [`CandidateKey`] lists for one
//! protocol's key-identification fields.

use std::fmt;
use std::net::Ipv6Addr;

use smallvec::SmallVec;

use super::aead::{default_nonce, NonceBuilder, NonceInput};
use super::kdf::{thread_key_index, thread_keys, OscoreContext};

/// Hash id under which [`ThreadKeyProvider`] is registered.
pub const THREAD_MLE_KEY_HASH: &str = "thread.mle";

/// One key to try, tagged with an id reported back on success.
#[derive(Clone, PartialEq, Eq)]
pub struct CandidateKey {
    pub key: Vec<u8>,
    pub key_id: u32,
}

impl CandidateKey {
    pub fn new(key: impl Into<Vec<u8>>, key_id: u32) -> Self {
        Self {
            key: key.into(),
            key_id,
        }
    }
}

impl fmt::Debug for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateKey")
            .field("key_id", &self.key_id)
            .field("len", &self.key.len())
            .finish()
    }
}

/// Lower-layer addressing needed for nonces and AAD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketInfo {
    pub src_addr: Option<Ipv6Addr>,
    pub dst_addr: Option<Ipv6Addr>,
    /// 802.15.4 extended source address, when the MAC layer is known.
    pub src_ext_addr: Option<[u8; 8]>,
}

impl PacketInfo {
    /// Extended source address, falling back to the link-local IID with
    /// the universal/local bit flipped.
    pub fn source_ext_addr(&self) -> Option<[u8; 8]> {
        self.src_ext_addr.or_else(|| {
            self.src_addr.map(|addr| {
                let octets = addr.octets();
                let mut ext = [0u8; 8];
                ext.copy_from_slice(&octets[8..]);
                ext[0] ^= 0x02;
                ext
            })
        })
    }
}

/// A Thread master key and the key sequence currently in use.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey {
    pub key: [u8; 16],
    pub sequence: u32,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Request-side OSCORE binding used to decrypt the matching response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OscoreRequest {
    pub kid: Vec<u8>,
    pub partial_iv: Vec<u8>,
}

/// Per-dissection key material.
#[derive(Debug, Clone, Default)]
pub struct KeyContext {
    /// Raw keys tried before any derived ones.
    pub candidate_keys: Vec<CandidateKey>,
    pub nonce_builder: Option<NonceBuilder>,
    pub packet: PacketInfo,
    pub master_keys: Vec<MasterKey>,
    pub oscore_contexts: Vec<OscoreContext>,
    pub oscore_request: Option<OscoreRequest>,
}

impl KeyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidate_key(mut self, key: CandidateKey) -> Self {
        self.candidate_keys.push(key);
        self
    }

    pub fn with_master_key(mut self, key: [u8; 16], sequence: u32) -> Self {
        self.master_keys.push(MasterKey { key, sequence });
        self
    }

    pub fn with_oscore_context(mut self, context: OscoreContext) -> Self {
        self.oscore_contexts.push(context);
        self
    }

    pub fn with_oscore_request(mut self, kid: impl Into<Vec<u8>>, partial_iv: impl Into<Vec<u8>>) -> Self {
        self.oscore_request = Some(OscoreRequest {
            kid: kid.into(),
            partial_iv: partial_iv.into(),
        });
        self
    }

    pub fn with_packet(mut self, packet: PacketInfo) -> Self {
        self.packet = packet;
        self
    }

    pub fn with_nonce_builder(mut self, builder: NonceBuilder) -> Self {
        self.nonce_builder = Some(builder);
        self
    }

    /// Build a nonce with the installed builder, or the standard layout.
    pub fn nonce(&self, input: &NonceInput<'_>) -> Vec<u8> {
        match self.nonce_builder {
            Some(build) => build(input),
            None => default_nonce(input),
        }
    }
}

/// Key-identification fields of one protected frame.
#[derive(Debug, Clone, Copy)]
pub struct KeyRequest<'a> {
    pub context: &'a KeyContext,
    pub key_id_mode: u8,
    pub key_index: Option<u8>,
    pub key_source: &'a [u8],
}

/// Produces ordered candidate keys for one protocol.
pub trait KeyProvider: Send + Sync {
    fn candidate_keys(&self, request: &KeyRequest<'_>) -> Vec<CandidateKey>;
}

impl<F> KeyProvider for F
where
    F: Fn(&KeyRequest<'_>) -> Vec<CandidateKey> + Send + Sync,
{
    fn candidate_keys(&self, request: &KeyRequest<'_>) -> Vec<CandidateKey> {
        self(request)
    }
}

/// Derives MLE keys from the configured Thread master keys.
///
/// Key id mode 2 names the key sequence directly in the key source. Other
/// modes only carry a key index, so the current sequence and its neighbours
/// are tried, filtered by index.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadKeyProvider;

fn candidate_sequences(current: u32, request: &KeyRequest<'_>) -> SmallVec<[u32; 3]> {
    if request.key_id_mode == 2 {
        if let Ok(source) = <[u8; 4]>::try_from(request.key_source) {
            return SmallVec::from_elem(u32::from_be_bytes(source), 1);
        }
    }
    [current, current.wrapping_add(1), current.wrapping_sub(1)]
        .into_iter()
        .filter(|seq| request.key_index.map_or(true, |idx| thread_key_index(*seq) == idx))
        .collect()
}

impl KeyProvider for ThreadKeyProvider {
    fn candidate_keys(&self, request: &KeyRequest<'_>) -> Vec<CandidateKey> {
        let mut keys = request.context.candidate_keys.clone();
        for master in &request.context.master_keys {
            for seq in candidate_sequences(master.sequence, request) {
                keys.push(CandidateKey::new(thread_keys(&master.key, seq).mle.to_vec(), seq));
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(ctx: &'a KeyContext, mode: u8, index: Option<u8>, source: &'a [u8]) -> KeyRequest<'a> {
        KeyRequest {
            context: ctx,
            key_id_mode: mode,
            key_index: index,
            key_source: source,
        }
    }

    // Test 1: mode 2 uses the sequence from the key source
    #[test]
    fn test_thread_mode2() {
        let ctx = KeyContext::new().with_master_key([0x11; 16], 9);
        let keys = ThreadKeyProvider.candidate_keys(&request(&ctx, 2, Some(1), &[0, 0, 0, 0]));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key_id, 0);
    }

    // Test 2: mode 1 filters neighbouring sequences by key index
    #[test]
    fn test_thread_index_filter() {
        let ctx = KeyContext::new().with_master_key([0x11; 16], 5);
        let keys = ThreadKeyProvider.candidate_keys(&request(&ctx, 1, Some(7), &[]));
        assert_eq!(keys.iter().map(|k| k.key_id).collect::<Vec<_>>(), vec![6]);

        let all = ThreadKeyProvider.candidate_keys(&request(&ctx, 1, None, &[]));
        assert_eq!(all.iter().map(|k| k.key_id).collect::<Vec<_>>(), vec![5, 6, 4]);
    }

    // Test 3: raw candidate keys are tried first
    #[test]
    fn test_raw_keys_first() {
        let ctx = KeyContext::new()
            .with_candidate_key(CandidateKey::new(vec![0; 16], 99))
            .with_master_key([0x11; 16], 0);
        let keys = ThreadKeyProvider.candidate_keys(&request(&ctx, 2, None, &[0, 0, 0, 0]));
        assert_eq!(keys[0].key_id, 99);
        assert_eq!(keys.len(), 2);
    }

    // Test 4: plain functions are providers
    #[test]
    fn test_fn_provider() {
        fn provider(_: &KeyRequest<'_>) -> Vec<CandidateKey> {
            vec![CandidateKey::new(vec![1, 2], 3)]
        }
        let ctx = KeyContext::new();
        assert_eq!(provider.candidate_keys(&request(&ctx, 0, None, &[]))[0].key_id, 3);
    }

    // Test 5: extended address from the link-local source
    #[test]
    fn test_source_ext_addr() {
        let info = PacketInfo {
            src_addr: Some("fe80::1122:3344:5566:7788".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(
            info.source_ext_addr(),
            Some([0x13, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])
        );
    }
}
