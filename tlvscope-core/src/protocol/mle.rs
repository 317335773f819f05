//! Thread MLE (Mesh Link Establishment) dissector.
//!
//! ```text
//! | suite (1) | aux security header | command (1) | TLVs ... | MIC |
//!              \__ only when suite == 0 __/ \____ CCM* protected ____/
//! ```
//!
//! The protected region is decrypted with AES-128-CCM*. The nonce is the
//! sender's extended address, the frame counter and the security level; the
//! AAD is the IPv6 source, the IPv6 destination and the auxiliary header.

use std::net::Ipv6Addr;

use tracing::debug;

use crate::crypto::{decrypt_payload, AeadRequest, KeyRequest, NonceInput, THREAD_MLE_KEY_HASH};
use crate::cursor::{ByteCursor, BE, LE};
use crate::error::{DecodeError, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, FieldWidth, FixedLayout, RegistryEntry, TlvDescriptor};

use super::meshcop::timestamp;
use super::{DecodeCtx, Dissector, ObjectRegistry, Selector};

/// UDP port for MLE.
pub const MLE_PORT: u16 = 19788;

const SUITE_SECURED: u8 = 0;
const SUITE_PLAINTEXT: u8 = 255;

const LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::One);

const MODE_FLAGS: &[BitFlag] = &[
    BitFlag::new("receiver_on_when_idle", 0x08),
    BitFlag::new("secure_data_requests", 0x04),
    BitFlag::new("full_thread_device", 0x02),
    BitFlag::new("full_network_data", 0x01),
];

const SCAN_MASK_FLAGS: &[BitFlag] = &[BitFlag::new("router", 0x80), BitFlag::new("end_device", 0x40)];

/// MLE command names.
pub fn command_name(command: u8) -> Option<&'static str> {
    Some(match command {
        0 => "Link Request",
        1 => "Link Accept",
        2 => "Link Accept and Request",
        3 => "Link Reject",
        4 => "Advertisement",
        5 => "Update",
        6 => "Update Request",
        7 => "Data Request",
        8 => "Data Response",
        9 => "Parent Request",
        10 => "Parent Response",
        11 => "Child ID Request",
        12 => "Child ID Response",
        13 => "Child Update Request",
        14 => "Child Update Response",
        15 => "Announce",
        16 => "Discovery Request",
        17 => "Discovery Response",
        _ => return None,
    })
}

const TLVS: &[RegistryEntry] = &[
    RegistryEntry::exact(0, "source_address", |_, _, v| Ok(field::uint("source_address", v, 2, BE))),
    RegistryEntry::exact(1, "mode", decode_mode),
    RegistryEntry::exact(2, "timeout", |_, _, v| Ok(field::uint("timeout", v, 4, BE))),
    RegistryEntry::exact(3, "challenge", |_, _, v| Ok(field::bytes("challenge", v))),
    RegistryEntry::exact(4, "response", |_, _, v| Ok(field::bytes("response", v))),
    RegistryEntry::exact(5, "link_layer_frame_counter", |_, _, v| {
        Ok(field::uint("link_layer_frame_counter", v, 4, BE))
    }),
    RegistryEntry::exact(6, "link_quality", |_, _, v| Ok(field::bytes("link_quality", v))),
    RegistryEntry::exact(7, "network_parameter", |_, _, v| Ok(field::bytes("network_parameter", v))),
    RegistryEntry::exact(8, "mle_frame_counter", |_, _, v| Ok(field::uint("mle_frame_counter", v, 4, BE))),
    RegistryEntry::exact(9, "route64", decode_route64),
    RegistryEntry::exact(10, "address16", |_, _, v| Ok(field::uint("address16", v, 2, BE))),
    RegistryEntry::exact(11, "leader_data", decode_leader_data),
    RegistryEntry::exact(12, "network_data", decode_network_data),
    RegistryEntry::exact(13, "tlv_request", |_, _, v| {
        field::repeated("tlv_request", v, 1, |c| Ok(DecodedObject::scalar("tlv_type", c.read_u8()?)))
    }),
    RegistryEntry::exact(14, "scan_mask", |_, _, v| {
        field::fixed("scan_mask", v, 1, |c| {
            Ok(field::bitfield("scan_mask", u64::from(c.read_u8()?), SCAN_MASK_FLAGS, 0x3F))
        })
    }),
    RegistryEntry::exact(15, "connectivity", decode_connectivity),
    RegistryEntry::exact(16, "link_margin", |_, _, v| Ok(field::uint("link_margin", v, 1, BE))),
    RegistryEntry::exact(17, "status", |_, _, v| Ok(field::uint("status", v, 1, BE))),
    RegistryEntry::exact(18, "version", |_, _, v| Ok(field::uint("version", v, 2, BE))),
    RegistryEntry::exact(19, "address_registration", decode_address_registration),
    RegistryEntry::exact(20, "channel", decode_channel),
    RegistryEntry::exact(21, "pan_id", |_, _, v| Ok(field::uint("pan_id", v, 2, BE))),
    RegistryEntry::exact(22, "active_timestamp", |_, _, v| timestamp("active_timestamp", v)),
    RegistryEntry::exact(23, "pending_timestamp", |_, _, v| timestamp("pending_timestamp", v)),
    RegistryEntry::exact(24, "active_operational_dataset", |ctx, _, v| {
        Ok(ctx.walk_composite("meshcop", "active_operational_dataset", v))
    })
    .with_subtree("meshcop"),
    RegistryEntry::exact(25, "pending_operational_dataset", |ctx, _, v| {
        Ok(ctx.walk_composite("meshcop", "pending_operational_dataset", v))
    })
    .with_subtree("meshcop"),
    RegistryEntry::exact(26, "thread_discovery", |ctx, _, v| {
        Ok(ctx.walk_composite("meshcop", "thread_discovery", v))
    })
    .with_subtree("meshcop"),
];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    registry.register_protocol("mle", LAYOUT, TLVS)?;
    registry.register_dissector(MleDissector)
}

/// Auxiliary security header fields (IEEE 802.15.4-2006 7.6.2).
#[derive(Debug, Clone, Copy)]
struct AuxHeader<'a> {
    security_level: u8,
    key_id_mode: u8,
    frame_counter: u32,
    key_source: &'a [u8],
    key_index: Option<u8>,
}

impl<'a> AuxHeader<'a> {
    fn parse(c: &mut ByteCursor<'a>) -> Result<Self, DecodeError> {
        let control = c.read_u8()?;
        let key_id_mode = (control >> 3) & 0x03;
        let frame_counter = c.read_u32(LE)?;
        let source_len = match key_id_mode {
            0 | 1 => 0,
            2 => 4,
            _ => 8,
        };
        let key_source = c.read_bytes(source_len)?;
        let key_index = if key_id_mode == 0 { None } else { Some(c.read_u8()?) };
        Ok(Self {
            security_level: control & 0x07,
            key_id_mode,
            frame_counter,
            key_source,
            key_index,
        })
    }

    fn mic_len(&self) -> usize {
        match self.security_level & 0x03 {
            0 => 0,
            1 => 4,
            2 => 8,
            _ => 16,
        }
    }

    fn encrypted(&self) -> bool {
        self.security_level & 0x04 != 0
    }

    fn to_node(self) -> DecodedObject {
        let mut node = DecodedObject::composite(
            "aux_header",
            vec![
                DecodedObject::scalar("security_level", self.security_level),
                DecodedObject::scalar("key_id_mode", self.key_id_mode),
                DecodedObject::scalar("frame_counter", self.frame_counter),
            ],
        );
        if !self.key_source.is_empty() {
            node.push_child(DecodedObject::bytes("key_source", self.key_source));
        }
        if let Some(index) = self.key_index {
            node.push_child(DecodedObject::scalar("key_index", index));
        }
        node
    }
}

/// MLE dissector.
#[derive(Debug, Clone, Copy, Default)]
pub struct MleDissector;

impl Dissector for MleDissector {
    fn name(&self) -> &'static str {
        "mle"
    }

    fn display_name(&self) -> &'static str {
        "Thread MLE"
    }

    fn can_parse(&self, selector: &Selector) -> Option<u32> {
        selector.has_port(MLE_PORT).then_some(100)
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        let suite = cursor.read_u8()?;
        let mut root = DecodedObject::composite("mle", vec![DecodedObject::scalar("security_suite", suite)]);
        match suite {
            SUITE_PLAINTEXT => {
                decode_body(ctx, &mut root, cursor)?;
            }
            SUITE_SECURED => {
                let aux_start = cursor.position();
                let aux = AuxHeader::parse(&mut cursor)?;
                let aux_bytes = cursor.slice(aux_start, cursor.position() - aux_start)?.rest();
                root.push_child(aux.to_node());
                if aux.security_level == 0 {
                    decode_body(ctx, &mut root, cursor)?;
                } else {
                    decode_protected(ctx, &mut root, cursor, &aux, aux_bytes);
                }
            }
            other => {
                return Err(DecodeError::UnsupportedVersion {
                    protocol: "mle",
                    version: u32::from(other),
                })
            }
        }
        Ok(root)
    }
}

/// Command byte followed by the TLV stream.
fn decode_body(ctx: &mut DecodeCtx<'_>, root: &mut DecodedObject, mut body: ByteCursor<'_>) -> Result<(), DecodeError> {
    let command = body.read_u8()?;
    root.push_child(DecodedObject::scalar("command_type", command));
    if let Some(name) = command_name(command) {
        root.push_child(DecodedObject::text("command_name", name));
    }
    root.push_child(ctx.walk_composite("mle", "tlvs", body));
    Ok(())
}

fn decode_protected(
    ctx: &mut DecodeCtx<'_>,
    root: &mut DecodedObject,
    cursor: ByteCursor<'_>,
    aux: &AuxHeader<'_>,
    aux_bytes: &[u8],
) {
    let protected = cursor.rest();
    let Some(keys) = ctx.keys() else {
        root.push_child(DecodedObject::aborted("payload", DecodeError::NoKeyAvailable, protected));
        return;
    };
    let candidates = ctx
        .key_provider(THREAD_MLE_KEY_HASH)
        .map(|provider| {
            provider.candidate_keys(&KeyRequest {
                context: keys,
                key_id_mode: aux.key_id_mode,
                key_index: aux.key_index,
                key_source: aux.key_source,
            })
        })
        .unwrap_or_default();
    let Some(source) = keys.packet.source_ext_addr() else {
        let error = DecodeError::malformed("mle", "nonce", "source extended address unknown");
        root.push_child(DecodedObject::aborted("payload", error, protected));
        return;
    };

    let src = keys.packet.src_addr.unwrap_or(Ipv6Addr::UNSPECIFIED);
    let dst = keys.packet.dst_addr.unwrap_or(Ipv6Addr::UNSPECIFIED);
    let aad = [&src.octets()[..], &dst.octets()[..], aux_bytes].concat();

    let nonce = keys.nonce(&NonceInput::Ccm802154 {
        source,
        frame_counter: aux.frame_counter,
        security_level: aux.security_level,
    });

    let frame = cursor.window();
    let offset = cursor.position() - cursor.start();
    let request = AeadRequest::new(frame, offset, aux.mic_len(), &aad)
        .with_reported_len(ctx.reported_len().map(|len| len.saturating_sub(cursor.start())))
        .authenticate_only(!aux.encrypted())
        .strict(ctx.config().strict_tag);

    match decrypt_payload(ctx.crypto(), &request, &candidates, |_| nonce.clone()) {
        Ok(outcome) => {
            if let Err(error) = decode_body(ctx, root, ByteCursor::new(&outcome.plaintext)) {
                root.push_child(DecodedObject::aborted("payload", error, &outcome.plaintext));
            }
            let status = if outcome.tag_truncated {
                "truncated"
            } else if outcome.tag_check_failed {
                "failed"
            } else if outcome.tag.is_empty() {
                "none"
            } else {
                "verified"
            };
            root.push_child(DecodedObject::bytes("mic", &outcome.tag));
            root.push_child(DecodedObject::text("mic_status", status));
            if let Some(key_id) = outcome.key_id {
                root.push_child(DecodedObject::scalar("key_sequence", key_id));
            }
            for warning in outcome.warnings {
                root.push_warning(warning);
            }
        }
        Err(error) => {
            debug!(%error, "MLE payload not decrypted");
            root.push_child(DecodedObject::aborted("payload", error, protected));
        }
    }
}

fn decode_mode(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("mode", value, 1, |c| {
        Ok(field::bitfield("mode", u64::from(c.read_u8()?), MODE_FLAGS, 0xF0))
    })
}

/// Route64: ID sequence, 64-bit router mask, one route byte per set bit.
///
/// The popcount of the mask must equal the number of route bytes; a
/// disagreement leaves the whole value raw.
fn decode_route64(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::at_least("route64", value, 9, |c| {
        let id_sequence = c.read_u8()?;
        let mask = c.read_u64(BE)?;
        let routers = mask.count_ones() as usize;
        if let Some(warning) = field::cross_check("route64", routers, c.remaining()) {
            return Ok(DecodedObject::bytes("route64", value.rest()).with_warning(warning));
        }
        let mut node = DecodedObject::composite(
            "route64",
            vec![
                DecodedObject::scalar("id_sequence", id_sequence),
                DecodedObject::scalar("router_mask", mask),
            ],
        );
        for router_id in (0..64u8).filter(|id| mask & (1u64 << (63 - id)) != 0) {
            let route = u64::from(c.read_u8()?);
            node.push_child(DecodedObject::composite(
                "route",
                vec![
                    DecodedObject::scalar("router_id", router_id),
                    DecodedObject::scalar("link_quality_out", field::masked(route, 0xC0)),
                    DecodedObject::scalar("link_quality_in", field::masked(route, 0x30)),
                    DecodedObject::scalar("route_cost", field::masked(route, 0x0F)),
                ],
            ));
        }
        Ok(node)
    })
}

fn decode_leader_data(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("leader_data", value, 8, |c| {
        Ok(DecodedObject::composite(
            "leader_data",
            vec![
                DecodedObject::scalar("partition_id", c.read_u32(BE)?),
                DecodedObject::scalar("weighting", c.read_u8()?),
                DecodedObject::scalar("data_version", c.read_u8()?),
                DecodedObject::scalar("stable_data_version", c.read_u8()?),
                DecodedObject::scalar("leader_router_id", c.read_u8()?),
            ],
        ))
    })
}

fn decode_network_data(ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let inner = ctx.call_subdissector("thread.nwd", value);
    Ok(DecodedObject::composite("network_data", vec![inner]))
}

fn decode_connectivity(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::at_least("connectivity", value, 7, |c| {
        let flags = u64::from(c.read_u8()?);
        let mut node = DecodedObject::composite(
            "connectivity",
            vec![
                DecodedObject::scalar("parent_priority", field::masked(flags, 0xC0)),
                DecodedObject::scalar("link_quality_3", c.read_u8()?),
                DecodedObject::scalar("link_quality_2", c.read_u8()?),
                DecodedObject::scalar("link_quality_1", c.read_u8()?),
                DecodedObject::scalar("leader_cost", c.read_u8()?),
                DecodedObject::scalar("id_sequence", c.read_u8()?),
                DecodedObject::scalar("active_routers", c.read_u8()?),
            ],
        );
        if c.remaining() >= 3 {
            node.push_child(DecodedObject::scalar("sed_buffer_size", c.read_u16(BE)?));
            node.push_child(DecodedObject::scalar("sed_datagram_count", c.read_u8()?));
        }
        Ok(node)
    })
}

/// Entries are either a context id plus IID (compressed) or a full address.
fn decode_address_registration(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    mut value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    let mut node = DecodedObject::composite("address_registration", Vec::new());
    while !value.is_empty() {
        let control = value.read_u8()?;
        let entry = if control & 0x80 != 0 {
            DecodedObject::composite(
                "compressed",
                vec![
                    DecodedObject::scalar("context_id", control & 0x0F),
                    DecodedObject::bytes("iid", value.read_bytes(8)?),
                ],
            )
        } else {
            DecodedObject::address("address", value.read_ipv6()?)
        };
        node.push_child(entry);
    }
    Ok(node)
}

fn decode_channel(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("channel", value, 3, |c| {
        Ok(DecodedObject::composite(
            "channel",
            vec![
                DecodedObject::scalar("channel_page", c.read_u8()?),
                DecodedObject::scalar("channel", c.read_u16(BE)?),
            ],
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyContext, PacketInfo};
    use crate::error::DecodeWarning;
    use crate::protocol::test_utils::{mle_keys, MLE_ADVERTISEMENT};
    use crate::protocol::{default_registry, dissect, dissect_with, DissectConfig, DissectOptions};
    use crate::tlv::DecodedValue;

    // Test 1: plaintext suite with Mode and Route64
    #[test]
    fn test_plaintext_route64() {
        let frame = [
            0xff, 0x04, // plaintext Advertisement
            0x01, 0x01, 0x0f, // mode: all flags
            0x09, 0x0b, 0x05, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x5f, 0xa1,
        ];
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &frame, "mle", None);
        assert_eq!(d.root.find("command_name").and_then(|n| n.as_text()), Some("Advertisement"));
        let mode = d.root.find("tlvs.mode").unwrap();
        assert_eq!(mode.flag("full_thread_device"), Some(true));
        let route64 = d.root.find("tlvs.route64").unwrap();
        let ids: Vec<_> = route64
            .children_named("route")
            .filter_map(|r| r.find("router_id").and_then(|n| n.as_scalar()))
            .collect();
        assert_eq!(ids, vec![0, 63]);
        let first = route64.children_named("route").next().unwrap();
        assert_eq!(first.find("link_quality_out").and_then(|n| n.as_scalar()), Some(1));
        assert_eq!(first.find("route_cost").and_then(|n| n.as_scalar()), Some(15));
        assert!(d.warnings().is_empty());
    }

    // Test 2: Route64 popcount disagreement degrades to raw bytes
    #[test]
    fn test_route64_cross_check() {
        let frame = [0xff, 0x04, 0x09, 0x0a, 0x05, 0x80, 0, 0, 0, 0, 0, 0, 0x01, 0x5f];
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &frame, "mle", None);
        let route64 = d.root.find("tlvs.route64").unwrap();
        assert!(matches!(route64.value, DecodedValue::Bytes(_)));
        assert_eq!(
            route64.warnings,
            vec![DecodeWarning::LengthMismatch { field: "route64", expected: 2, actual: 1 }]
        );
    }

    // Test 3: secured frame decrypts with the derived key
    #[test]
    fn test_secured_advertisement() {
        let registry = default_registry().unwrap();
        let keys = mle_keys();
        let d = dissect(&registry, &MLE_ADVERTISEMENT, "mle", Some(&keys));
        assert!(d.error().is_none(), "{:?}", d.error());
        assert_eq!(d.root.find("aux_header.security_level").and_then(|n| n.as_scalar()), Some(5));
        assert_eq!(d.root.find("command_type").and_then(|n| n.as_scalar()), Some(4));
        assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
        assert_eq!(
            d.root.find("tlvs.leader_data.weighting").and_then(|n| n.as_scalar()),
            Some(64)
        );
        assert_eq!(d.root.find("mic_status").and_then(|n| n.as_text()), Some("verified"));
        assert!(d.warnings().is_empty());
    }

    // Test 4: corrupted MIC keeps the payload and warns on the root
    #[test]
    fn test_corrupted_mic() {
        let registry = default_registry().unwrap();
        let keys = mle_keys();
        let mut frame = MLE_ADVERTISEMENT.to_vec();
        *frame.last_mut().unwrap() ^= 0xff;

        let d = dissect(&registry, &frame, "mle", Some(&keys));
        assert_eq!(d.root.warnings, vec![DecodeWarning::TagCheckFailed]);
        assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
        assert_eq!(d.root.find("mic_status").and_then(|n| n.as_text()), Some("failed"));

        let options = DissectOptions::new("mle")
            .with_keys(Some(&keys))
            .with_config(DissectConfig::default().strict(true));
        let strict = dissect_with(&registry, &frame, &options);
        let payload = strict.root.child("payload").unwrap();
        assert_eq!(payload.error(), Some(&DecodeError::TagCheckFailed));
    }

    // Test 5: no keys yields a marker, not a failure
    #[test]
    fn test_no_keys() {
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &MLE_ADVERTISEMENT, "mle", None);
        assert!(d.error.is_none());
        assert_eq!(d.root.child("payload").and_then(|n| n.error()), Some(&DecodeError::NoKeyAvailable));

        let empty = KeyContext::new().with_packet(PacketInfo::default());
        let d = dissect(&registry, &MLE_ADVERTISEMENT, "mle", Some(&empty));
        assert!(d.root.child("payload").unwrap().is_aborted());
    }

    // Test 6: unknown suite is fatal to the call
    #[test]
    fn test_unknown_suite() {
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &[0x07, 0x00], "mle", None);
        assert_eq!(d.error, Some(DecodeError::UnsupportedVersion { protocol: "mle", version: 7 }));
    }

    // Test 7: network data is handed to the Network Data dissector
    #[test]
    fn test_network_data_handoff() {
        let frame = [0xff, 0x08, 0x0c, 0x04, 0x07, 0x02, 0x11, 0x40];
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &frame, "mle", None);
        let id = d.root.find("tlvs.network_data.thread_nwd.sixlowpan_id").unwrap();
        assert_eq!(id.attribute("stable"), Some(1));
        assert_eq!(id.find("context_id").and_then(|n| n.as_scalar()), Some(1));
        assert_eq!(id.find("context_length").and_then(|n| n.as_scalar()), Some(64));
    }

    // Test 8: address registration entries
    #[test]
    fn test_address_registration() {
        let mut frame = vec![0xff, 0x0b, 19, 26, 0x81, 1, 2, 3, 4, 5, 6, 7, 8, 0x00];
        frame.extend_from_slice(&[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let registry = default_registry().unwrap();
        let d = dissect(&registry, &frame, "mle", None);
        let reg = d.root.find("tlvs.address_registration").unwrap();
        assert_eq!(reg.find("compressed.context_id").and_then(|n| n.as_scalar()), Some(1));
        assert_eq!(
            reg.find("address").and_then(|n| n.as_address()),
            Some("fd00::1".parse::<std::net::IpAddr>().unwrap())
        );
    }
}
