//! Thread Network Data TLVs.
//!
//! The type byte carries the TLV type in its upper seven bits and the
//! "stable" flag in bit 0. The walker copies the flag onto every node it
//! emits, including unknown and malformed ones, as the `stable` attribute.

use crate::cursor::{ByteCursor, BE};
use crate::error::{DecodeError, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, FieldWidth, FixedLayout, ObjectTable, RegistryEntry, TlvDescriptor};

use super::{DecodeCtx, Dissector, ObjectRegistry};

const LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::One).with_type_shift(1);

const HAS_ROUTE_FLAGS: &[BitFlag] = &[BitFlag::new("nat64", 0x20)];

const BORDER_ROUTER_FLAGS: &[BitFlag] = &[
    BitFlag::new("preferred", 0x2000),
    BitFlag::new("slaac", 0x1000),
    BitFlag::new("dhcp", 0x0800),
    BitFlag::new("configure", 0x0400),
    BitFlag::new("default_route", 0x0200),
    BitFlag::new("on_mesh", 0x0100),
    BitFlag::new("nd_dns", 0x0080),
    BitFlag::new("dp", 0x0040),
];

const TLVS: &[RegistryEntry] = &[
    RegistryEntry::exact(0, "has_route", decode_has_route),
    RegistryEntry::exact(1, "prefix", decode_prefix),
    RegistryEntry::exact(2, "border_router", decode_border_router),
    RegistryEntry::exact(3, "sixlowpan_id", decode_sixlowpan_id),
    RegistryEntry::exact(4, "commissioning_data", decode_commissioning_data).with_subtree("meshcop"),
    RegistryEntry::exact(5, "service", decode_service),
    RegistryEntry::exact(6, "server", decode_server),
];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    let tlvs = ObjectTable::new("thread.nwd", LAYOUT.into(), TLVS)?.with_header_attribute("stable", 0x01);
    registry.register_table(tlvs)?;
    registry.register_dissector(ThreadNwdDissector)
}

/// Network Data carried in the MLE Network Data TLV.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadNwdDissector;

impl Dissector for ThreadNwdDissector {
    fn name(&self) -> &'static str {
        "thread.nwd"
    }

    fn display_name(&self) -> &'static str {
        "Thread Network Data"
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        Ok(ctx.walk_composite("thread.nwd", "thread_nwd", cursor))
    }
}

/// Two-bit signed route preference.
fn preference(bits: u64) -> DecodedObject {
    let name = match bits {
        0 => "medium",
        1 => "high",
        3 => "low",
        _ => "reserved",
    };
    DecodedObject::text("preference", name)
}

fn decode_has_route(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let node = field::repeated("has_route", value, 3, |c| {
        let rloc16 = c.read_u16(BE)?;
        let flags = u64::from(c.read_u8()?);
        Ok(DecodedObject::composite(
            "route",
            vec![
                DecodedObject::scalar("rloc16", rloc16),
                preference(field::masked(flags, 0xC0)),
                field::bitfield("flags", flags, HAS_ROUTE_FLAGS, 0x1F),
            ],
        ))
    })?;
    Ok(node)
}

fn decode_prefix(ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let node = field::at_least("prefix", value, 2, |c| {
        let domain_id = c.read_u8()?;
        let prefix_bits = c.read_u8()?;
        let prefix_len = usize::from(prefix_bits).div_ceil(8);
        if prefix_len > 16 || prefix_len > c.remaining() {
            return Err(DecodeError::malformed(
                "thread.nwd",
                "prefix",
                format!("prefix length {prefix_bits} bits does not fit"),
            ));
        }
        let mut octets = [0u8; 16];
        octets[..prefix_len].copy_from_slice(c.read_bytes(prefix_len)?);
        let mut node = DecodedObject::composite(
            "prefix",
            vec![
                DecodedObject::scalar("domain_id", domain_id),
                DecodedObject::scalar("prefix_length", prefix_bits),
                DecodedObject::address("prefix", std::net::Ipv6Addr::from(octets)),
            ],
        );
        if !c.is_empty() {
            node.push_child(ctx.walk_composite("thread.nwd", "sub_tlvs", c.take_rest()));
        }
        Ok(node)
    })?;
    Ok(node)
}

fn decode_border_router(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    let node = field::repeated("border_router", value, 4, |c| {
        let rloc16 = c.read_u16(BE)?;
        let flags = u64::from(c.read_u16(BE)?);
        Ok(DecodedObject::composite(
            "server",
            vec![
                DecodedObject::scalar("rloc16", rloc16),
                preference(field::masked(flags, 0xC000)),
                field::bitfield("flags", flags, BORDER_ROUTER_FLAGS, 0x003F),
            ],
        ))
    })?;
    Ok(node)
}

fn decode_sixlowpan_id(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    let node = field::fixed("sixlowpan_id", value, 2, |c| {
        let flags = u64::from(c.read_u8()?);
        Ok(DecodedObject::composite(
            "sixlowpan_id",
            vec![
                DecodedObject::scalar("compress", field::masked(flags, 0x10)),
                DecodedObject::scalar("context_id", field::masked(flags, 0x0F)),
                DecodedObject::scalar("context_length", c.read_u8()?),
            ],
        ))
    })?;
    Ok(node)
}

fn decode_commissioning_data(
    ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    Ok(ctx.walk_composite("meshcop", "commissioning_data", value))
}

fn decode_service(ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let node = field::at_least("service", value, 2, |c| {
        let first = c.read_u8()?;
        let thread_enterprise = first & 0x80 != 0;
        let mut node = DecodedObject::composite(
            "service",
            vec![
                DecodedObject::scalar("thread_enterprise", u8::from(thread_enterprise)),
                DecodedObject::scalar("service_id", first & 0x0F),
            ],
        );
        if !thread_enterprise {
            node.push_child(DecodedObject::scalar("enterprise_number", c.read_u32(BE)?));
        }
        let data_len = usize::from(c.read_u8()?);
        node.push_child(DecodedObject::bytes("service_data", c.read_bytes(data_len)?));
        if !c.is_empty() {
            node.push_child(ctx.walk_composite("thread.nwd", "sub_tlvs", c.take_rest()));
        }
        Ok(node)
    })?;
    Ok(node)
}

fn decode_server(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let node = field::at_least("server", value, 2, |c| {
        Ok(DecodedObject::composite(
            "server",
            vec![
                DecodedObject::scalar("rloc16", c.read_u16(BE)?),
                DecodedObject::bytes("server_data", c.rest()),
            ],
        ))
    })?;
    Ok(node)
}
