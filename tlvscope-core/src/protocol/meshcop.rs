//! Thread MeshCoP (Mesh Commissioning Protocol) TLVs.
//!
//! One type byte and one length byte; a length of 0xFF is followed by the
//! real length as a 16-bit big-endian field.

use crate::cursor::{ByteCursor, BE};
use crate::error::{DecodeError, DecodeWarning, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, FieldWidth, FixedLayout, RegistryEntry, TlvDescriptor};

use super::{DecodeCtx, Dissector, ObjectRegistry};

const LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::One).with_escape(0xFF, FieldWidth::Two);

const SECURITY_POLICY_FLAGS: &[BitFlag] = &[
    BitFlag::new("obtain_master_key", 0x80),
    BitFlag::new("native_commissioning", 0x40),
    BitFlag::new("routers", 0x20),
    BitFlag::new("external_commissioning", 0x10),
    BitFlag::new("beacons", 0x08),
];

const DISCOVERY_REQUEST_FLAGS: &[BitFlag] = &[BitFlag::new("joiner", 0x08)];

const DISCOVERY_RESPONSE_FLAGS: &[BitFlag] = &[BitFlag::new("native_commissioner", 0x08)];

const TLVS: &[RegistryEntry] = &[
    RegistryEntry::exact(0, "channel", decode_channel),
    RegistryEntry::exact(1, "pan_id", |_, _, v| Ok(field::uint("pan_id", v, 2, BE))),
    RegistryEntry::exact(2, "extended_pan_id", |_, _, v| Ok(bytes_of("extended_pan_id", v, 8))),
    RegistryEntry::exact(3, "network_name", |_, _, v| Ok(field::text("network_name", v))),
    RegistryEntry::exact(4, "pskc", |_, _, v| Ok(bytes_of("pskc", v, 16))),
    RegistryEntry::exact(5, "network_master_key", |_, _, v| Ok(bytes_of("network_master_key", v, 16))),
    RegistryEntry::exact(6, "key_sequence_counter", |_, _, v| Ok(field::uint("key_sequence_counter", v, 4, BE))),
    RegistryEntry::exact(7, "mesh_local_prefix", |_, _, v| Ok(bytes_of("mesh_local_prefix", v, 8))),
    RegistryEntry::exact(8, "steering_data", |_, _, v| Ok(field::bytes("steering_data", v))),
    RegistryEntry::exact(9, "border_agent_locator", |_, _, v| Ok(field::uint("border_agent_locator", v, 2, BE))),
    RegistryEntry::exact(10, "commissioner_id", |_, _, v| Ok(field::text("commissioner_id", v))),
    RegistryEntry::exact(11, "commissioner_session_id", |_, _, v| {
        Ok(field::uint("commissioner_session_id", v, 2, BE))
    }),
    RegistryEntry::exact(12, "security_policy", decode_security_policy),
    RegistryEntry::exact(13, "get", decode_get),
    RegistryEntry::exact(14, "active_timestamp", |_, _, v| timestamp("active_timestamp", v)),
    RegistryEntry::exact(15, "commissioner_udp_port", |_, _, v| Ok(field::uint("commissioner_udp_port", v, 2, BE))),
    RegistryEntry::exact(16, "state", decode_state),
    RegistryEntry::exact(17, "joiner_dtls_encapsulation", |_, _, v| {
        Ok(field::bytes("joiner_dtls_encapsulation", v))
    }),
    RegistryEntry::exact(18, "joiner_udp_port", |_, _, v| Ok(field::uint("joiner_udp_port", v, 2, BE))),
    RegistryEntry::exact(19, "joiner_iid", |_, _, v| Ok(bytes_of("joiner_iid", v, 8))),
    RegistryEntry::exact(20, "joiner_router_locator", |_, _, v| Ok(field::uint("joiner_router_locator", v, 2, BE))),
    RegistryEntry::exact(21, "joiner_router_kek", |_, _, v| Ok(bytes_of("joiner_router_kek", v, 16))),
    RegistryEntry::exact(32, "provisioning_url", |_, _, v| Ok(field::text("provisioning_url", v))),
    RegistryEntry::exact(33, "vendor_name", |_, _, v| Ok(field::text("vendor_name", v))),
    RegistryEntry::exact(34, "vendor_model", |_, _, v| Ok(field::text("vendor_model", v))),
    RegistryEntry::exact(35, "vendor_sw_version", |_, _, v| Ok(field::text("vendor_sw_version", v))),
    RegistryEntry::exact(36, "vendor_data", |_, _, v| Ok(field::text("vendor_data", v))),
    RegistryEntry::exact(37, "vendor_stack_version", decode_vendor_stack_version),
    RegistryEntry::exact(48, "udp_encapsulation", decode_udp_encapsulation),
    RegistryEntry::exact(49, "ipv6_address", |_, _, v| Ok(field::ipv6("ipv6_address", v))),
    RegistryEntry::exact(51, "pending_timestamp", |_, _, v| timestamp("pending_timestamp", v)),
    RegistryEntry::exact(52, "delay_timer", |_, _, v| Ok(field::uint("delay_timer", v, 4, BE))),
    RegistryEntry::exact(53, "channel_mask", decode_channel_mask),
    RegistryEntry::exact(54, "count", |_, _, v| Ok(field::uint("count", v, 1, BE))),
    RegistryEntry::exact(55, "period", |_, _, v| Ok(field::uint("period", v, 2, BE))),
    RegistryEntry::exact(56, "scan_duration", |_, _, v| Ok(field::uint("scan_duration", v, 2, BE))),
    RegistryEntry::exact(57, "energy_list", |_, _, v| Ok(field::bytes("energy_list", v))),
    RegistryEntry::exact(128, "discovery_request", decode_discovery_request),
    RegistryEntry::exact(129, "discovery_response", decode_discovery_response),
];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    registry.register_protocol("meshcop", LAYOUT, TLVS)?;
    registry.register_dissector(MeshcopDissector)
}

/// MeshCoP TLV stream carried in CoAP payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshcopDissector;

impl Dissector for MeshcopDissector {
    fn name(&self) -> &'static str {
        "meshcop"
    }

    fn display_name(&self) -> &'static str {
        "Thread MeshCoP"
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        Ok(ctx.walk_composite("meshcop", "meshcop", cursor))
    }
}

fn bytes_of(name: &'static str, value: ByteCursor<'_>, width: usize) -> DecodedObject {
    if value.remaining() == width {
        field::bytes(name, value)
    } else {
        field::length_fallback(name, &value, width)
    }
}

/// Thread timestamp: 48-bit seconds, 15-bit ticks and the authoritative bit.
pub(super) fn timestamp(name: &'static str, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed(name, value, 8, |c| {
        let seconds = c.read_uint(6)?;
        let low = c.read_u16(BE)?;
        Ok(DecodedObject::composite(
            name,
            vec![
                DecodedObject::scalar("seconds", seconds),
                DecodedObject::scalar("ticks", low >> 1),
                DecodedObject::scalar("authoritative", low & 0x01),
            ],
        ))
    })
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

fn decode_security_policy(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    field::at_least("security_policy", value, 3, |c| {
        let rotation = c.read_u16(BE)?;
        let flags = c.read_u8()?;
        let mut node = DecodedObject::composite(
            "security_policy",
            vec![
                DecodedObject::scalar("rotation_time", rotation),
                field::bitfield("flags", u64::from(flags), SECURITY_POLICY_FLAGS, 0),
            ],
        );
        if !c.is_empty() {
            node.push_child(DecodedObject::bytes("extended_flags", c.rest()));
        }
        Ok(node)
    })
}

fn decode_get(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::repeated("get", value, 1, |c| Ok(DecodedObject::scalar("tlv_type", c.read_u8()?)))
}

fn decode_state(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("state", value, 1, |c| {
        let state = c.read_u8()? as i8;
        let name = match state {
            1 => "accept",
            0 => "pending",
            -1 => "reject",
            _ => "unknown",
        };
        Ok(DecodedObject::composite(
            "state",
            vec![
                DecodedObject::scalar("value", state as u8),
                DecodedObject::text("name", name),
            ],
        ))
    })
}

fn decode_vendor_stack_version(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    field::fixed("vendor_stack_version", value, 6, |c| {
        let oui = c.read_u24(BE)?;
        let build = c.read_u16(BE)?;
        let rev = c.read_u8()?;
        Ok(DecodedObject::composite(
            "vendor_stack_version",
            vec![
                DecodedObject::scalar("oui", oui),
                DecodedObject::scalar("build", build >> 4),
                DecodedObject::scalar("revision", build & 0x0F),
                DecodedObject::scalar("minor", rev >> 4),
                DecodedObject::scalar("major", rev & 0x0F),
            ],
        ))
    })
}

fn decode_udp_encapsulation(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    field::at_least("udp_encapsulation", value, 4, |c| {
        Ok(DecodedObject::composite(
            "udp_encapsulation",
            vec![
                DecodedObject::scalar("source_port", c.read_u16(BE)?),
                DecodedObject::scalar("destination_port", c.read_u16(BE)?),
                DecodedObject::bytes("payload", c.rest()),
            ],
        ))
    })
}

/// Channel Mask: a sequence of `{page, mask_len, mask}` entries.
///
/// The whole value is validated before any entry is emitted, so a bad
/// length never yields a partial list.
fn decode_channel_mask(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    let data = value.rest();
    let mut offset = 0;
    while offset < data.len() {
        if offset + 2 > data.len() {
            break;
        }
        offset += 2 + usize::from(data[offset + 1]);
    }
    if offset != data.len() {
        return Ok(DecodedObject::bytes("channel_mask", data).with_warning(DecodeWarning::LengthMismatch {
            field: "channel_mask",
            expected: offset,
            actual: data.len(),
        }));
    }

    let mut c = value;
    let mut node = DecodedObject::composite("channel_mask", Vec::new());
    while !c.is_empty() {
        let page = c.read_u8()?;
        let mask_len = usize::from(c.read_u8()?);
        let mask = c.read_bytes(mask_len)?;
        node.push_child(DecodedObject::composite(
            "channel_mask_entry",
            vec![DecodedObject::scalar("channel_page", page), DecodedObject::bytes("mask", mask)],
        ));
    }
    Ok(node)
}

fn discovery(name: &'static str, value: ByteCursor<'_>, flags: &'static [BitFlag]) -> Result<DecodedObject, DecodeError> {
    field::fixed(name, value, 2, |c| {
        let first = c.read_u8()?;
        c.advance(1)?;
        Ok(DecodedObject::composite(
            name,
            vec![
                DecodedObject::scalar("version", first >> 4),
                field::bitfield("flags", u64::from(first), flags, 0x07),
            ],
        ))
    })
}

fn decode_discovery_request(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    discovery("discovery_request", value, DISCOVERY_REQUEST_FLAGS)
}

fn decode_discovery_response(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    discovery("discovery_response", value, DISCOVERY_RESPONSE_FLAGS)
}
