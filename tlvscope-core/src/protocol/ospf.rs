//! OSPF (Open Shortest Path First) dissector.
//!
//! OSPF is a link-state routing protocol for IP networks that uses
//! a shortest path first (SPF) algorithm for finding the best path.
//!
//! RFC 2328: OSPF Version 2
//! RFC 5340: OSPF for IPv6
//! RFC 3630: Traffic Engineering extensions (opaque type 1)
//! RFC 7770: Router Information (opaque type 4)

use crate::checksum::{fletcher_checksum, fletcher_valid, internet_checksum_without};
use crate::cursor::{ByteCursor, BE};
use crate::error::{DecodeError, DecodeWarning, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, FieldWidth, FixedLayout, RegistryEntry, TlvDescriptor};

use super::{DecodeCtx, Dissector, ObjectRegistry, Selector};

/// IP protocol number for OSPF.
pub const IP_PROTOCOL_OSPF: u8 = 89;

const V2_HEADER_LEN: usize = 24;
const V3_HEADER_LEN: usize = 16;
const LSA_HEADER_LEN: usize = 20;

/// Authentication type whose trailer replaces the checksum.
const AUTH_CRYPTOGRAPHIC: u16 = 2;

/// OSPF packet types.
pub mod packet_type {
    pub const HELLO: u8 = 1;
    pub const DATABASE_DESCRIPTION: u8 = 2;
    pub const LINK_STATE_REQUEST: u8 = 3;
    pub const LINK_STATE_UPDATE: u8 = 4;
    pub const LINK_STATE_ACK: u8 = 5;
}

/// OSPF LSA types (RFC 2328, RFC 5250).
pub mod lsa_type {
    /// Router-LSA: Describes router's links within an area.
    pub const ROUTER: u16 = 1;
    /// Network-LSA: Describes transit network.
    pub const NETWORK: u16 = 2;
    /// Summary-LSA (IP network): Describes route to network.
    pub const SUMMARY_NETWORK: u16 = 3;
    /// Summary-LSA (ASBR): Describes route to ASBR.
    pub const SUMMARY_ASBR: u16 = 4;
    /// AS-External-LSA: Describes route to external network.
    pub const AS_EXTERNAL: u16 = 5;
    pub const NSSA: u16 = 7;
    pub const OPAQUE_LINK: u16 = 9;
    pub const OPAQUE_AREA: u16 = 10;
    pub const OPAQUE_AS: u16 = 11;
}

/// Get the name of an LSA type.
fn lsa_type_name(ls_type: u16) -> &'static str {
    match ls_type {
        lsa_type::ROUTER => "Router-LSA",
        lsa_type::NETWORK => "Network-LSA",
        lsa_type::SUMMARY_NETWORK => "Summary-LSA-Network",
        lsa_type::SUMMARY_ASBR => "Summary-LSA-ASBR",
        lsa_type::AS_EXTERNAL => "AS-External-LSA",
        lsa_type::NSSA => "NSSA-LSA",
        lsa_type::OPAQUE_LINK => "Opaque-LSA-Link",
        lsa_type::OPAQUE_AREA => "Opaque-LSA-Area",
        lsa_type::OPAQUE_AS => "Opaque-LSA-AS",
        _ => "Unknown",
    }
}

/// Get the name of an OSPF packet type.
fn packet_type_name(pkt_type: u8) -> &'static str {
    match pkt_type {
        packet_type::HELLO => "Hello",
        packet_type::DATABASE_DESCRIPTION => "Database Description",
        packet_type::LINK_STATE_REQUEST => "Link State Request",
        packet_type::LINK_STATE_UPDATE => "Link State Update",
        packet_type::LINK_STATE_ACK => "Link State Acknowledgment",
        _ => "Unknown",
    }
}

const OPTIONS: &[BitFlag] = &[
    BitFlag::new("mt", 0x01),
    BitFlag::new("external", 0x02),
    BitFlag::new("multicast", 0x04),
    BitFlag::new("nssa", 0x08),
    BitFlag::new("lls", 0x10),
    BitFlag::new("demand_circuits", 0x20),
    BitFlag::new("opaque", 0x40),
    BitFlag::new("down", 0x80),
];

const V3_OPTIONS: &[BitFlag] = &[
    BitFlag::new("v6", 0x01),
    BitFlag::new("external", 0x02),
    BitFlag::new("multicast", 0x04),
    BitFlag::new("nssa", 0x08),
    BitFlag::new("router", 0x10),
    BitFlag::new("demand_circuits", 0x20),
    BitFlag::new("af", 0x100),
];

const DD_FLAGS: &[BitFlag] = &[
    BitFlag::new("master", 0x01),
    BitFlag::new("more", 0x02),
    BitFlag::new("init", 0x04),
    BitFlag::new("oob_resync", 0x08),
];

const ROUTER_FLAGS: &[BitFlag] = &[
    BitFlag::new("border", 0x01),
    BitFlag::new("external", 0x02),
    BitFlag::new("virtual", 0x04),
    BitFlag::new("nssa_translator", 0x10),
];

const RI_CAPABILITIES: &[BitFlag] = &[
    BitFlag::new("graceful_restart_capable", 0x8000_0000),
    BitFlag::new("graceful_restart_helper", 0x4000_0000),
    BitFlag::new("stub_router", 0x2000_0000),
    BitFlag::new("traffic_engineering", 0x1000_0000),
    BitFlag::new("point_to_point_over_lan", 0x0800_0000),
    BitFlag::new("experimental_te", 0x0400_0000),
];

const TE_LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::Two, FieldWidth::Two).aligned(4);

const TE_TLVS: &[RegistryEntry] = &[
    RegistryEntry::exact(1, "router_address", |_, _, v| Ok(field::ipv4("router_address", v))),
    RegistryEntry::exact(2, "link", |ctx, _, v| Ok(ctx.walk_composite("ospf.te.link", "link", v)))
        .with_subtree("ospf.te.link"),
];

const TE_LINK_TLVS: &[RegistryEntry] = &[
    RegistryEntry::exact(1, "link_type", decode_link_type),
    RegistryEntry::exact(2, "link_id", |_, _, v| Ok(field::ipv4("link_id", v))),
    RegistryEntry::exact(3, "local_interface_addresses", |_, _, v| {
        field::repeated("local_interface_addresses", v, 4, |c| {
            Ok(DecodedObject::address("address", c.read_ipv4()?))
        })
    }),
    RegistryEntry::exact(4, "remote_interface_addresses", |_, _, v| {
        field::repeated("remote_interface_addresses", v, 4, |c| {
            Ok(DecodedObject::address("address", c.read_ipv4()?))
        })
    }),
    RegistryEntry::exact(5, "te_metric", |_, _, v| Ok(field::uint("te_metric", v, 4, BE))),
    RegistryEntry::exact(6, "max_bandwidth", |_, _, v| Ok(field::float32("max_bandwidth", v))),
    RegistryEntry::exact(7, "max_reservable_bandwidth", |_, _, v| {
        Ok(field::float32("max_reservable_bandwidth", v))
    }),
    RegistryEntry::exact(8, "unreserved_bandwidth", decode_unreserved_bandwidth),
    RegistryEntry::exact(9, "admin_group", |_, _, v| Ok(field::uint("admin_group", v, 4, BE))),
];

const RI_TLVS: &[RegistryEntry] = &[RegistryEntry::exact(1, "capabilities", |_, _, v| {
    field::at_least("capabilities", v, 4, |c| {
        Ok(field::bitfield("capabilities", u64::from(c.read_u32(BE)?), RI_CAPABILITIES, 0))
    })
})];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    registry.register_protocol("ospf.te", TE_LAYOUT, TE_TLVS)?;
    registry.register_protocol("ospf.te.link", TE_LAYOUT, TE_LINK_TLVS)?;
    registry.register_protocol("ospf.ri", TE_LAYOUT, RI_TLVS)?;
    registry.register_dissector(OspfDissector)
}

/// OSPF dissector.
#[derive(Debug, Clone, Copy, Default)]
pub struct OspfDissector;

impl Dissector for OspfDissector {
    fn name(&self) -> &'static str {
        "ospf"
    }

    fn display_name(&self) -> &'static str {
        "OSPF"
    }

    fn can_parse(&self, selector: &Selector) -> Option<u32> {
        // Match when IP protocol hint equals 89
        match selector.hint("ip_protocol") {
            Some(proto) if proto == u64::from(IP_PROTOCOL_OSPF) => Some(100),
            _ => None,
        }
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        let start = cursor.position();
        let version = cursor.read_u8()?;
        let header_len = match version {
            2 => V2_HEADER_LEN,
            3 => V3_HEADER_LEN,
            _ => {
                return Err(DecodeError::UnsupportedVersion {
                    protocol: "ospf",
                    version: u32::from(version),
                })
            }
        };
        if cursor.limit() - start < header_len {
            return Err(DecodeError::PacketTooSmall {
                needed: header_len,
                have: cursor.limit() - start,
            });
        }

        let msg_type = cursor.read_u8()?;
        let length = usize::from(cursor.read_u16(BE)?);
        if length < header_len {
            return Err(DecodeError::LengthUnderflow {
                type_code: u32::from(msg_type),
                declared: length,
                minimum: header_len,
            });
        }

        let mut root = DecodedObject::composite(
            "ospf",
            vec![
                DecodedObject::scalar("version", version),
                DecodedObject::scalar("message_type", msg_type),
                DecodedObject::text("message_type_name", packet_type_name(msg_type)),
                DecodedObject::scalar("length", length as u64),
                DecodedObject::address("router_id", cursor.read_ipv4()?),
                DecodedObject::address("area_id", cursor.read_ipv4()?),
            ],
        );
        let checksum = cursor.read_u16(BE)?;
        root.push_child(DecodedObject::scalar("checksum", checksum));

        let mut auth_type = None;
        if version == 2 {
            let au = cursor.read_u16(BE)?;
            auth_type = Some(au);
            root.push_child(DecodedObject::scalar("auth_type", au));
            root.push_child(DecodedObject::bytes("authentication", cursor.read_bytes(8)?));
        } else {
            root.push_child(DecodedObject::scalar("instance_id", cursor.read_u8()?));
            cursor.advance(1)?;
        }

        let captured = cursor.limit() - start;
        if length > captured {
            root.push_warning(DecodeWarning::LengthMismatch {
                field: "length",
                expected: length,
                actual: captured,
            });
        } else if let Some(au) = auth_type {
            // The OSPFv3 checksum covers an IPv6 pseudo-header that is not available here.
            if ctx.checksums_enabled() && au != AUTH_CRYPTOGRAPHIC {
                let packet = cursor.slice(start, length)?.rest();
                let covered = [&packet[..16], &packet[V2_HEADER_LEN..]].concat();
                let expected = internet_checksum_without(&covered, 12);
                ctx.check_checksum(&mut root, "ospf", expected, checksum)?;
            }
        }

        let body = cursor.sub(length - header_len);
        let v3 = version == 3;
        let decoded = match msg_type {
            packet_type::HELLO => decode_hello(body, v3),
            packet_type::DATABASE_DESCRIPTION => decode_db_description(body, v3),
            packet_type::LINK_STATE_REQUEST => decode_ls_request(body, v3),
            packet_type::LINK_STATE_UPDATE => decode_ls_update(ctx, body, v3),
            packet_type::LINK_STATE_ACK => field::repeated("ls_ack", body, LSA_HEADER_LEN, |c| lsa_header(c, v3)),
            _ => Ok(DecodedObject::unknown(u32::from(msg_type), body.rest()).with_warning(
                DecodeWarning::UnknownType {
                    protocol: "ospf",
                    type_code: u32::from(msg_type),
                },
            )),
        };
        root.push_child(decoded.unwrap_or_else(|error| DecodedObject::aborted("body", error, body.rest())));
        Ok(root)
    }
}

fn neighbors(c: &mut ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::repeated("neighbors", c.take_rest(), 4, |c| Ok(DecodedObject::address("neighbor", c.read_ipv4()?)))
}

/// Parse OSPF Hello packet.
fn decode_hello(mut c: ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    let mut node = DecodedObject::composite("hello", Vec::new());
    if v3 {
        node.push_child(DecodedObject::scalar("interface_id", c.read_u32(BE)?));
        node.push_child(DecodedObject::scalar("router_priority", c.read_u8()?));
        node.push_child(field::bitfield("options", u64::from(c.read_u24(BE)?), V3_OPTIONS, 0));
        node.push_child(DecodedObject::scalar("hello_interval", c.read_u16(BE)?));
        node.push_child(DecodedObject::scalar("dead_interval", c.read_u16(BE)?));
    } else {
        node.push_child(DecodedObject::address("network_mask", c.read_ipv4()?));
        node.push_child(DecodedObject::scalar("hello_interval", c.read_u16(BE)?));
        node.push_child(field::bitfield("options", u64::from(c.read_u8()?), OPTIONS, 0));
        node.push_child(DecodedObject::scalar("router_priority", c.read_u8()?));
        node.push_child(DecodedObject::scalar("dead_interval", c.read_u32(BE)?));
    }
    node.push_child(DecodedObject::address("designated_router", c.read_ipv4()?));
    node.push_child(DecodedObject::address("backup_dr", c.read_ipv4()?));
    node.push_child(neighbors(&mut c)?);
    Ok(node)
}

/// Parse OSPF Database Description packet.
fn decode_db_description(mut c: ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    let mut node = DecodedObject::composite("database_description", Vec::new());
    if v3 {
        c.advance(1)?;
        node.push_child(field::bitfield("options", u64::from(c.read_u24(BE)?), V3_OPTIONS, 0));
        node.push_child(DecodedObject::scalar("interface_mtu", c.read_u16(BE)?));
        c.advance(1)?;
    } else {
        node.push_child(DecodedObject::scalar("interface_mtu", c.read_u16(BE)?));
        node.push_child(field::bitfield("options", u64::from(c.read_u8()?), OPTIONS, 0));
    }
    node.push_child(field::bitfield("flags", u64::from(c.read_u8()?), DD_FLAGS, 0xF0));
    node.push_child(DecodedObject::scalar("dd_sequence", c.read_u32(BE)?));
    node.push_child(field::repeated("lsa_headers", c.take_rest(), LSA_HEADER_LEN, |c| {
        lsa_header(c, v3)
    })?);
    Ok(node)
}

/// Parse OSPF Link State Request packet.
fn decode_ls_request(c: ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    field::repeated("ls_request", c, 12, |c| {
        let ls_type = if v3 {
            c.advance(2)?;
            c.read_u16(BE)?
        } else {
            // LS type is a 32-bit field in v2; only the low byte is assigned
            (c.read_u32(BE)? & 0xFFFF) as u16
        };
        Ok(DecodedObject::composite(
            "request",
            vec![
                DecodedObject::scalar("ls_type", ls_type),
                DecodedObject::address("link_state_id", c.read_ipv4()?),
                DecodedObject::address("advertising_router", c.read_ipv4()?),
            ],
        ))
    })
}

/// Fields of one LSA header (20 bytes).
///
/// ```text
/// |            LS Age             |    Options    |    LS Type    |
/// |                        Link State ID                          |
/// |                     Advertising Router                        |
/// |                     LS Sequence Number                        |
/// |         LS Checksum           |             Length            |
/// ```
struct LsaHeader {
    ls_type: u16,
    link_state_id: [u8; 4],
    checksum: u16,
    length: usize,
}

fn read_lsa_header(c: &mut ByteCursor<'_>, v3: bool, node: &mut DecodedObject) -> Result<LsaHeader, DecodeError> {
    node.push_child(DecodedObject::scalar("ls_age", c.read_u16(BE)?));
    let ls_type = if v3 {
        c.read_u16(BE)?
    } else {
        node.push_child(field::bitfield("options", u64::from(c.read_u8()?), OPTIONS, 0));
        u16::from(c.read_u8()?)
    };
    node.push_child(DecodedObject::scalar("ls_type", ls_type));
    node.push_child(DecodedObject::text("ls_type_name", lsa_type_name(ls_type)));
    let link_state_id: [u8; 4] = c.read_array()?;
    node.push_child(DecodedObject::address("link_state_id", std::net::Ipv4Addr::from(link_state_id)));
    node.push_child(DecodedObject::address("advertising_router", c.read_ipv4()?));
    node.push_child(DecodedObject::scalar("ls_sequence", c.read_u32(BE)?));
    let checksum = c.read_u16(BE)?;
    node.push_child(DecodedObject::scalar("ls_checksum", checksum));
    let length = usize::from(c.read_u16(BE)?);
    node.push_child(DecodedObject::scalar("length", length as u64));
    Ok(LsaHeader {
        ls_type,
        link_state_id,
        checksum,
        length,
    })
}

fn lsa_header(c: &mut ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    let mut node = DecodedObject::composite("lsa_header", Vec::new());
    read_lsa_header(c, v3, &mut node)?;
    Ok(node)
}

/// Parse OSPF Link State Update packet.
///
/// Each LSA is bounded by its own length field. A bad LSA stops the list
/// since the next one cannot be located.
fn decode_ls_update(ctx: &mut DecodeCtx<'_>, mut c: ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    let count = c.read_u32(BE)?;
    let mut node = DecodedObject::composite(
        "ls_update",
        vec![DecodedObject::scalar("lsa_count", count)],
    );
    let mut decoded = 0usize;
    while !c.is_empty() {
        let lsa_start = c.position();
        match decode_lsa(ctx, &mut c, v3) {
            Ok(lsa) => node.push_child(lsa),
            Err(error) => {
                let raw = c.slice(lsa_start, c.limit() - lsa_start)?.rest();
                node.push_child(DecodedObject::aborted("lsa", error, raw));
                break;
            }
        }
        decoded += 1;
    }
    if let Some(warning) = field::cross_check("lsa_count", decoded, count as usize) {
        node.push_warning(warning);
    }
    Ok(node)
}

fn decode_lsa(ctx: &mut DecodeCtx<'_>, c: &mut ByteCursor<'_>, v3: bool) -> Result<DecodedObject, DecodeError> {
    let lsa_start = c.position();
    let mut node = DecodedObject::composite("lsa", Vec::new());
    let header = read_lsa_header(c, v3, &mut node)?;
    if header.length < LSA_HEADER_LEN {
        return Err(DecodeError::LengthUnderflow {
            type_code: u32::from(header.ls_type),
            declared: header.length,
            minimum: LSA_HEADER_LEN,
        });
    }

    let available = c.limit() - lsa_start;
    if header.length > available {
        node.push_warning(DecodeWarning::LengthMismatch {
            field: "lsa_length",
            expected: header.length,
            actual: available,
        });
    } else if ctx.checksums_enabled() {
        let lsa = c.slice(lsa_start, header.length)?.rest();
        if !fletcher_valid(&lsa[2..]) {
            let expected = fletcher_checksum(&lsa[2..], 14);
            ctx.check_checksum(&mut node, "ospf.lsa", expected, header.checksum)?;
        }
    }

    let body = c.sub(header.length - LSA_HEADER_LEN);
    c.seek((lsa_start + header.length).min(c.limit()))?;

    let decoded = if v3 {
        Ok(DecodedObject::bytes("body", body.rest()))
    } else {
        decode_lsa_body(ctx, &header, body)
    };
    node.push_child(decoded.unwrap_or_else(|error| DecodedObject::aborted("body", error, body.rest())));
    Ok(node)
}

fn decode_lsa_body(ctx: &mut DecodeCtx<'_>, header: &LsaHeader, mut c: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    match header.ls_type {
        lsa_type::ROUTER => decode_router_lsa(c),
        lsa_type::NETWORK => Ok(DecodedObject::composite(
            "network",
            vec![
                DecodedObject::address("network_mask", c.read_ipv4()?),
                field::repeated("attached_routers", c.take_rest(), 4, |c| {
                    Ok(DecodedObject::address("router", c.read_ipv4()?))
                })?,
            ],
        )),
        lsa_type::SUMMARY_NETWORK | lsa_type::SUMMARY_ASBR => {
            let mask = c.read_ipv4()?;
            c.advance(1)?;
            Ok(DecodedObject::composite(
                "summary",
                vec![
                    DecodedObject::address("network_mask", mask),
                    DecodedObject::scalar("metric", c.read_u24(BE)?),
                ],
            ))
        }
        lsa_type::AS_EXTERNAL | lsa_type::NSSA => {
            let mask = c.read_ipv4()?;
            let routes = field::repeated("routes", c.take_rest(), 12, |c| {
                let first = c.read_u8()?;
                Ok(DecodedObject::composite(
                    "route",
                    vec![
                        DecodedObject::scalar("external_type", if first & 0x80 != 0 { 2u8 } else { 1 }),
                        DecodedObject::scalar("tos", first & 0x7F),
                        DecodedObject::scalar("metric", c.read_u24(BE)?),
                        DecodedObject::address("forwarding_address", c.read_ipv4()?),
                        DecodedObject::scalar("route_tag", c.read_u32(BE)?),
                    ],
                ))
            })?;
            Ok(DecodedObject::composite(
                "external",
                vec![DecodedObject::address("network_mask", mask), routes],
            ))
        }
        lsa_type::OPAQUE_LINK | lsa_type::OPAQUE_AREA | lsa_type::OPAQUE_AS => {
            match header.link_state_id[0] {
                1 => Ok(ctx.walk_composite("ospf.te", "traffic_engineering", c)),
                4 => Ok(ctx.walk_composite("ospf.ri", "router_information", c)),
                _ => Ok(DecodedObject::bytes("opaque", c.rest())),
            }
        }
        other => Ok(DecodedObject::unknown(u32::from(other), c.rest()).with_warning(
            DecodeWarning::UnknownType {
                protocol: "ospf.lsa",
                type_code: u32::from(other),
            },
        )),
    }
}

fn decode_router_lsa(mut c: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let flags = c.read_u8()?;
    c.advance(1)?;
    let link_count = usize::from(c.read_u16(BE)?);
    let mut node = DecodedObject::composite(
        "router",
        vec![
            field::bitfield("flags", u64::from(flags), ROUTER_FLAGS, 0xE8),
            DecodedObject::scalar("link_count", link_count as u64),
        ],
    );
    let mut links = 0usize;
    while !c.is_empty() {
        let mut link = DecodedObject::composite(
            "link",
            vec![
                DecodedObject::address("link_id", c.read_ipv4()?),
                DecodedObject::address("link_data", c.read_ipv4()?),
                DecodedObject::scalar("link_type", c.read_u8()?),
            ],
        );
        let tos_count = usize::from(c.read_u8()?);
        link.push_child(DecodedObject::scalar("metric", c.read_u16(BE)?));
        for _ in 0..tos_count {
            let tos = c.read_u8()?;
            c.advance(1)?;
            link.push_child(DecodedObject::composite(
                "tos",
                vec![
                    DecodedObject::scalar("tos", tos),
                    DecodedObject::scalar("metric", c.read_u16(BE)?),
                ],
            ));
        }
        node.push_child(link);
        links += 1;
    }
    if let Some(warning) = field::cross_check("link_count", links, link_count) {
        node.push_warning(warning);
    }
    Ok(node)
}

fn decode_link_type(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("link_type", value, 1, |c| {
        let link_type = c.read_u8()?;
        let name = match link_type {
            1 => "point-to-point",
            2 => "multi-access",
            _ => "unknown",
        };
        Ok(DecodedObject::composite(
            "link_type",
            vec![DecodedObject::scalar("value", link_type), DecodedObject::text("name", name)],
        ))
    })
}

/// Unreserved bandwidth for the eight priority levels.
fn decode_unreserved_bandwidth(
    _ctx: &mut DecodeCtx<'_>,
    _desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    field::fixed("unreserved_bandwidth", value, 32, |c| {
        field::repeated("unreserved_bandwidth", c.take_rest(), 4, |c| {
            Ok(DecodedObject::float("priority", c.read_f32(BE)?))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{ospf_lsa, OspfBuilder};
    use crate::protocol::{default_registry, dissect, dissect_with, ChecksumPolicy, DissectConfig, DissectOptions};
    use std::net::{IpAddr, Ipv4Addr};

    const ROUTER_LSA_BODY: [u8; 16] = [
        0x00, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0xff, 0xff, 0xff, 0x00, 0x03, 0x00, 0x00, 0x0a,
    ];

    fn hello_body() -> Vec<u8> {
        let mut body = vec![255, 255, 255, 0, 0x00, 0x0a, 0x02, 0x01, 0x00, 0x00, 0x00, 0x28];
        body.extend_from_slice(&[10, 0, 0, 1, 0, 0, 0, 0]);
        body.extend_from_slice(&[10, 0, 0, 2, 10, 0, 0, 3]);
        body
    }

    fn run(frame: &[u8]) -> crate::protocol::Dissection {
        let registry = default_registry().unwrap();
        dissect(&registry, frame, "ospf", None)
    }

    // Test 1: can_parse with IP protocol 89
    #[test]
    fn test_can_parse_with_ip_protocol_89() {
        assert_eq!(OspfDissector.can_parse(&Selector::ip_protocol(89)), Some(100));
        assert!(OspfDissector.can_parse(&Selector::ip_protocol(6)).is_none());
        assert!(OspfDissector.can_parse(&Selector::new()).is_none());
    }

    // Test 2: Hello with neighbors and a valid checksum
    #[test]
    fn test_hello_packet_parsing() {
        let frame = OspfBuilder::new(packet_type::HELLO).body(hello_body()).build();
        let d = run(&frame);
        assert!(d.error().is_none());
        assert!(d.warnings().is_empty(), "{:?}", d.warnings());
        assert_eq!(
            d.root.find("router_id").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)))
        );
        assert_eq!(d.root.find("hello.hello_interval").and_then(|n| n.as_scalar()), Some(10));
        assert_eq!(d.root.find("hello.dead_interval").and_then(|n| n.as_scalar()), Some(40));
        assert_eq!(d.root.find("hello.options").and_then(|n| n.flag("external")), Some(true));
        assert_eq!(d.root.find("hello.neighbors").map(|n| n.children().len()), Some(2));
    }

    // Test 3: version detection
    #[test]
    fn test_version_detection() {
        let mut frame = OspfBuilder::new(packet_type::HELLO).body(hello_body()).build();
        frame[0] = 4;
        let d = run(&frame);
        assert_eq!(d.error, Some(DecodeError::UnsupportedVersion { protocol: "ospf", version: 4 }));
    }

    // Test 4: checksum policy
    #[test]
    fn test_checksum_policy() {
        let mut frame = OspfBuilder::new(packet_type::HELLO).body(hello_body()).build();
        frame[12] ^= 0xff;
        let registry = default_registry().unwrap();

        let d = dissect(&registry, &frame, "ospf", None);
        assert!(matches!(d.root.warnings[..], [DecodeWarning::ChecksumInvalid { protocol: "ospf", .. }]));

        let options = DissectOptions::new("ospf")
            .with_config(DissectConfig::default().with_checksums(ChecksumPolicy::Mandatory));
        let d = dissect_with(&registry, &frame, &options);
        assert!(matches!(d.error, Some(DecodeError::ChecksumInvalid { protocol: "ospf", .. })));

        let options = DissectOptions::new("ospf")
            .with_config(DissectConfig::default().with_checksums(ChecksumPolicy::Ignore));
        assert!(dissect_with(&registry, &frame, &options).warnings().is_empty());
    }

    // Test 5: cryptographic authentication skips the checksum
    #[test]
    fn test_crypto_auth_skips_checksum() {
        let mut frame = OspfBuilder::new(packet_type::HELLO).auth_type(2).body(hello_body()).build();
        frame[12] = 0;
        frame[13] = 0;
        assert!(run(&frame).warnings().is_empty());
    }

    // Test 6: LS Update with a router LSA and a count mismatch
    #[test]
    fn test_ls_update_parsing() {
        let lsa = ospf_lsa(lsa_type::ROUTER as u8, [10, 0, 0, 1], &ROUTER_LSA_BODY);
        let mut body = 2u32.to_be_bytes().to_vec();
        body.extend_from_slice(&lsa);
        let frame = OspfBuilder::new(packet_type::LINK_STATE_UPDATE).body(body).build();
        let d = run(&frame);

        let lsu = d.root.child("ls_update").unwrap();
        let lsa = lsu.child("lsa").unwrap();
        assert_eq!(lsa.find("ls_type_name").and_then(|n| n.as_text()), Some("Router-LSA"));
        assert_eq!(lsa.find("router.link.metric").and_then(|n| n.as_scalar()), Some(10));
        assert_eq!(
            lsa.find("router.link.link_data").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0)))
        );
        assert!(lsa.warnings.is_empty());
        assert_eq!(
            lsu.warnings,
            vec![DecodeWarning::LengthMismatch { field: "lsa_count", expected: 1, actual: 2 }]
        );
    }

    // Test 7: corrupted LSA fails its Fletcher check
    #[test]
    fn test_lsa_fletcher() {
        let mut lsa = ospf_lsa(lsa_type::ROUTER as u8, [10, 0, 0, 1], &ROUTER_LSA_BODY);
        lsa[35] ^= 0x01;
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend_from_slice(&lsa);
        let frame = OspfBuilder::new(packet_type::LINK_STATE_UPDATE).body(body).build();
        let d = run(&frame);
        let lsa = d.root.find("ls_update.lsa").unwrap();
        assert!(matches!(
            lsa.warnings[..],
            [DecodeWarning::ChecksumInvalid { protocol: "ospf.lsa", .. }]
        ));
    }

    // Test 8: opaque TE LSA with padded sub-TLVs
    #[test]
    fn test_te_opaque_lsa() {
        let te = [
            0x00, 0x01, 0x00, 0x04, 192, 0, 2, 1, // router address
            0x00, 0x02, 0x00, 0x14, // link, 20 bytes
            0x00, 0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, // link type p2p + padding
            0x00, 0x02, 0x00, 0x04, 192, 0, 2, 2, // link id
            0x00, 0x05, 0x00, 0x00, // empty TE metric
        ];
        let lsa = ospf_lsa(lsa_type::OPAQUE_AREA as u8, [1, 0, 0, 0], &te);
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend_from_slice(&lsa);
        let frame = OspfBuilder::new(packet_type::LINK_STATE_UPDATE).body(body).build();
        let d = run(&frame);
        let te = d.root.find("ls_update.lsa.traffic_engineering").unwrap();
        assert_eq!(
            te.find("router_address").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
        );
        assert_eq!(te.find("link.link_type.name").and_then(|n| n.as_text()), Some("point-to-point"));
        assert_eq!(
            te.find("link.link_id").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2)))
        );
        assert_eq!(
            d.warnings(),
            vec![DecodeWarning::LengthMismatch { field: "te_metric", expected: 4, actual: 0 }]
        );
    }

    // Test 9: Router Information capabilities
    #[test]
    fn test_router_information() {
        let ri = [0x00, 0x01, 0x00, 0x04, 0xa0, 0x00, 0x00, 0x00];
        let lsa = ospf_lsa(lsa_type::OPAQUE_AREA as u8, [4, 0, 0, 0], &ri);
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend_from_slice(&lsa);
        let frame = OspfBuilder::new(packet_type::LINK_STATE_UPDATE).body(body).build();
        let d = run(&frame);
        let caps = d.root.find("ls_update.lsa.router_information.capabilities").unwrap();
        assert_eq!(caps.flag("graceful_restart_capable"), Some(true));
        assert_eq!(caps.flag("stub_router"), Some(true));
        assert_eq!(caps.flag("graceful_restart_helper"), Some(false));
    }

    // Test 10: OSPFv3 Hello
    #[test]
    fn test_v3_hello() {
        let mut frame = vec![3, 1, 0x00, 0x24, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        frame.extend_from_slice(&[0, 0, 0, 5, 1, 0x00, 0x00, 0x13, 0x00, 0x0a, 0x00, 0x28]);
        frame.extend_from_slice(&[1, 1, 1, 1, 0, 0, 0, 0]);
        let d = run(&frame);
        assert!(d.error().is_none());
        assert_eq!(d.root.find("hello.interface_id").and_then(|n| n.as_scalar()), Some(5));
        assert_eq!(d.root.find("hello.options").and_then(|n| n.flag("router")), Some(true));
        assert_eq!(d.root.find("hello.dead_interval").and_then(|n| n.as_scalar()), Some(40));
    }

    // Test 11: truncated header
    #[test]
    fn test_ospf_too_short() {
        let d = run(&[2, 1, 0, 24, 1, 1]);
        assert_eq!(d.error, Some(DecodeError::PacketTooSmall { needed: 24, have: 6 }));
    }

    // Test 12: LS Request entries
    #[test]
    fn test_ls_request() {
        let body = [0, 0, 0, 1, 10, 0, 0, 1, 10, 0, 0, 9];
        let frame = OspfBuilder::new(packet_type::LINK_STATE_REQUEST).body(body.to_vec()).build();
        let d = run(&frame);
        let req = d.root.find("ls_request.request").unwrap();
        assert_eq!(req.find("ls_type").and_then(|n| n.as_scalar()), Some(1));
        assert_eq!(
            req.find("advertising_router").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)))
        );
    }
}
