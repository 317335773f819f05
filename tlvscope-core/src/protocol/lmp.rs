//! LMP (Link Management Protocol) dissector.
//!
//! RFC 4204 with the SONET/SDH test extensions of RFC 4207, the UNI service
//! discovery objects of RFC 4208 and the DCN/LAD objects of RFC 5818.
//!
//! ```text
//!  0                   1                   2                   3
//! | Vers  |      (Reserved)       |    Flags      |    Msg Type   |
//! |          LMP Length           |       (Reserved/Checksum)     |
//! |N|   C-Type    |     Class     |            Length             |  objects...
//! ```

use crate::checksum::internet_checksum_without;
use crate::cursor::{ByteCursor, BE};
use crate::error::{DecodeError, DecodeWarning, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, DecodedValue, FieldWidth, FixedLayout, ObjectTable, RegistryEntry, TlvDescriptor};

use super::{DecodeCtx, Dissector, ObjectRegistry, Selector};

/// UDP port for LMP.
pub const LMP_PORT: u16 = 701;

const HEADER_LEN: usize = 8;
const SUPPORTED_VERSION: u8 = 1;

const OBJECT_LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::Two)
    .with_flags_byte()
    .length_includes_header();

const SUBOBJECT_LAYOUT: FixedLayout = FixedLayout::new(FieldWidth::One, FieldWidth::One).length_includes_header();

/// LMP object class numbers.
pub mod class {
    pub const CCID: u32 = 1;
    pub const NODE_ID: u32 = 2;
    pub const LINK_ID: u32 = 3;
    pub const INTERFACE_ID: u32 = 4;
    pub const MESSAGE_ID: u32 = 5;
    pub const CONFIG: u32 = 6;
    pub const HELLO: u32 = 7;
    pub const BEGIN_VERIFY: u32 = 8;
    pub const BEGIN_VERIFY_ACK: u32 = 9;
    pub const VERIFY_ID: u32 = 10;
    pub const TE_LINK: u32 = 11;
    pub const DATA_LINK: u32 = 12;
    pub const CHANNEL_STATUS: u32 = 13;
    pub const CHANNEL_STATUS_REQUEST: u32 = 14;
    pub const ERROR: u32 = 20;
    pub const TRACE: u32 = 21;
    pub const TRACE_REQ: u32 = 22;
    pub const SERVICE_CONFIG: u32 = 51;
    pub const DA_DCN_ADDRESS: u32 = 248;
    pub const LOCAL_LAD_INFO: u32 = 249;
}

/// Classes 1-14 are contiguous; the rest are assigned individually.
pub fn lmp_valid_class(class: u32) -> bool {
    matches!(class, 1..=14 | 20 | 21 | 22 | 51 | 248 | 249)
}

const HEADER_FLAGS: &[BitFlag] = &[
    BitFlag::new("control_channel_down", 0x01),
    BitFlag::new("lmp_restart", 0x02),
];

const LINK_FLAGS: &[BitFlag] = &[
    BitFlag::new("fault_management", 0x01),
    BitFlag::new("link_verification", 0x02),
];

const DATA_LINK_FLAGS: &[BitFlag] = &[BitFlag::new("port", 0x01), BitFlag::new("allocated", 0x02)];

const BEGIN_VERIFY_FLAGS: &[BitFlag] = &[
    BitFlag::new("verify_all_links", 0x0001),
    BitFlag::new("data_link_type", 0x0002),
];

const WDM_CONFIG_FLAGS: &[BitFlag] = &[BitFlag::new("wdm", 0x01), BitFlag::new("optical_switching", 0x02)];

const CHANNEL_STATUS_FLAGS: &[BitFlag] = &[
    BitFlag::new("active", 0x8000_0000),
    BitFlag::new("direction", 0x4000_0000),
];

const BEGIN_VERIFY_ERRORS: &[BitFlag] = &[
    BitFlag::new("verification_not_supported", 0x01),
    BitFlag::new("unwilling_to_verify", 0x02),
    BitFlag::new("unsupported_transport", 0x04),
    BitFlag::new("te_link_id_error", 0x08),
    BitFlag::new("unknown_ctype", 0x10),
];

const LINK_SUMMARY_ERRORS: &[BitFlag] = &[
    BitFlag::new("unacceptable_parameters", 0x01),
    BitFlag::new("renegotiate_parameters", 0x02),
    BitFlag::new("bad_te_link", 0x04),
    BitFlag::new("bad_data_link", 0x08),
    BitFlag::new("unknown_te_link_ctype", 0x10),
    BitFlag::new("unknown_data_link_ctype", 0x20),
];

const TRACE_ERRORS: &[BitFlag] = &[
    BitFlag::new("unsupported_trace_type", 0x01),
    BitFlag::new("invalid_trace_message", 0x02),
    BitFlag::new("unknown_ctype", 0x10),
];

const SIGNALING_PROTOCOLS: &[BitFlag] = &[BitFlag::new("rsvp_te", 0x01), BitFlag::new("ldp", 0x02)];

const DIVERSITY_FLAGS: &[BitFlag] = &[
    BitFlag::new("node", 0x01),
    BitFlag::new("link", 0x02),
    BitFlag::new("srlg", 0x04),
];

/// Message type names (RFC 4204 section 12, RFC 4207, RFC 4208).
pub fn message_type_name(message_type: u8) -> Option<&'static str> {
    Some(match message_type {
        1 => "Config",
        2 => "ConfigAck",
        3 => "ConfigNack",
        4 => "Hello",
        5 => "BeginVerify",
        6 => "BeginVerifyAck",
        7 => "BeginVerifyNack",
        8 => "EndVerify",
        9 => "EndVerifyAck",
        10 => "Test",
        11 => "TestStatusSuccess",
        12 => "TestStatusFailure",
        13 => "TestStatusAck",
        14 => "LinkSummary",
        15 => "LinkSummaryAck",
        16 => "LinkSummaryNack",
        17 => "ChannelStatus",
        18 => "ChannelStatusAck",
        19 => "ChannelStatusRequest",
        20 => "ChannelStatusResponse",
        21 => "TraceMonitor",
        22 => "TraceMonitorAck",
        23 => "TraceMonitorNack",
        24 => "TraceMismatch",
        25 => "TraceMismatchAck",
        26 => "TraceRequest",
        27 => "TraceReport",
        28 => "TraceReportNack",
        29 => "InsertTrace",
        30 => "InsertTraceAck",
        31 => "InsertTraceNack",
        50 => "ServiceConfig",
        51 => "ServiceConfigAck",
        52 => "ServiceConfigNack",
        _ => return None,
    })
}

const OBJECTS: &[RegistryEntry] = &[
    RegistryEntry::exact(class::CCID, "ccid", decode_ccid),
    RegistryEntry::exact(class::NODE_ID, "node_id", decode_node_id),
    RegistryEntry::exact(class::LINK_ID, "link_id", decode_link_id),
    RegistryEntry::exact(class::INTERFACE_ID, "interface_id", decode_interface_id),
    RegistryEntry::exact(class::MESSAGE_ID, "message_id", decode_message_id),
    RegistryEntry::exact(class::CONFIG, "config", decode_config),
    RegistryEntry::exact(class::HELLO, "hello", decode_hello),
    RegistryEntry::exact(class::BEGIN_VERIFY, "begin_verify", decode_begin_verify),
    RegistryEntry::exact(class::BEGIN_VERIFY_ACK, "begin_verify_ack", decode_begin_verify_ack),
    RegistryEntry::exact(class::VERIFY_ID, "verify_id", decode_verify_id),
    RegistryEntry::exact(class::TE_LINK, "te_link", decode_te_link),
    RegistryEntry::exact(class::DATA_LINK, "data_link", decode_data_link).with_subtree("lmp.data_link"),
    RegistryEntry::exact(class::CHANNEL_STATUS, "channel_status", decode_channel_status),
    RegistryEntry::exact(
        class::CHANNEL_STATUS_REQUEST,
        "channel_status_request",
        decode_channel_status_request,
    ),
    RegistryEntry::exact(class::ERROR, "error", decode_error),
    RegistryEntry::exact(class::TRACE, "trace", decode_trace),
    RegistryEntry::exact(class::TRACE_REQ, "trace_req", decode_trace_req),
    RegistryEntry::exact(class::SERVICE_CONFIG, "service_config", decode_service_config),
    RegistryEntry::exact(class::DA_DCN_ADDRESS, "da_dcn_address", decode_da_dcn_address),
    RegistryEntry::exact(class::LOCAL_LAD_INFO, "local_lad_info", decode_local_lad_info),
];

const DATA_LINK_SUBOBJECTS: &[RegistryEntry] = &[
    RegistryEntry::exact(1, "interface_switching_type", decode_switching_type),
    RegistryEntry::exact(2, "wavelength", decode_wavelength),
];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    let objects = ObjectTable::new("lmp", OBJECT_LAYOUT.into(), OBJECTS)?.with_valid_types(lmp_valid_class);
    registry.register_table(objects)?;
    registry.register_protocol("lmp.data_link", SUBOBJECT_LAYOUT, DATA_LINK_SUBOBJECTS)?;
    registry.register_dissector(LmpDissector)
}

/// LMP dissector.
#[derive(Debug, Clone, Copy, Default)]
pub struct LmpDissector;

impl Dissector for LmpDissector {
    fn name(&self) -> &'static str {
        "lmp"
    }

    fn display_name(&self) -> &'static str {
        "LMP"
    }

    fn can_parse(&self, selector: &Selector) -> Option<u32> {
        selector.has_port(LMP_PORT).then_some(100)
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        let start = cursor.position();
        let version = cursor.read_u8()? >> 4;
        if version != SUPPORTED_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                protocol: "lmp",
                version: u32::from(version),
            });
        }
        cursor.advance(1)?;
        let flags = cursor.read_u8()?;
        let message_type = cursor.read_u8()?;
        let length = usize::from(cursor.read_u16(BE)?);
        let checksum = cursor.read_u16(BE)?;
        if length < HEADER_LEN {
            return Err(DecodeError::LengthUnderflow {
                type_code: u32::from(message_type),
                declared: length,
                minimum: HEADER_LEN,
            });
        }

        let mut root = DecodedObject::composite("lmp", Vec::new());
        root.push_child(DecodedObject::scalar("version", version));
        root.push_child(field::bitfield("flags", u64::from(flags), HEADER_FLAGS, 0xFC));
        root.push_child(DecodedObject::scalar("message_type", message_type));
        if let Some(name) = message_type_name(message_type) {
            root.push_child(DecodedObject::text("message_type_name", name));
        }
        root.push_child(DecodedObject::scalar("length", length as u64));
        root.push_child(DecodedObject::scalar("checksum", checksum));

        let captured = cursor.limit() - start;
        if length > captured {
            root.push_warning(DecodeWarning::LengthMismatch {
                field: "length",
                expected: length,
                actual: captured,
            });
        } else if checksum != 0 && ctx.checksums_enabled() {
            let message = &cursor.window()[..length];
            let expected = internet_checksum_without(message, 6);
            ctx.check_checksum(&mut root, "lmp", expected, checksum)?;
        }

        let objects = cursor.sub(length - HEADER_LEN);
        root.push_child(ctx.walk_composite("lmp", "objects", objects));

        let trailing = start + length;
        if trailing < cursor.limit() {
            if let Ok(extra) = cursor.slice(trailing, cursor.limit() - trailing) {
                root.push_child(DecodedObject::bytes("trailing", extra.rest()));
            }
        }
        Ok(root)
    }
}

fn ctype(desc: &TlvDescriptor) -> u8 {
    desc.flags & 0x7F
}

/// Unrecognized C-Type under a known class, named after the class.
///
/// The type code is `class << 8 | c_type`.
fn unknown_ctype(desc: &TlvDescriptor, value: ByteCursor<'_>) -> DecodedObject {
    let name = OBJECTS
        .iter()
        .find(|entry| entry.types.matches(desc.type_code))
        .map_or("unknown", |entry| entry.name);
    let type_code = (desc.type_code << 8) | u32::from(ctype(desc));
    let raw = DecodedValue::Unknown { type_code, raw: value.window().to_vec() };
    DecodedObject::new(name, raw).with_warning(DecodeWarning::UnknownType { protocol: "lmp.ctype", type_code })
}

/// Address family selected by a TE_LINK / DATA_LINK / CHANNEL_STATUS C-Type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrKind {
    V4,
    V6,
    Unnumbered,
}

impl AddrKind {
    fn from_ctype(ctype: u8) -> Option<Self> {
        match ctype {
            1 => Some(AddrKind::V4),
            2 => Some(AddrKind::V6),
            3 => Some(AddrKind::Unnumbered),
            _ => None,
        }
    }

    fn width(self) -> usize {
        match self {
            AddrKind::V6 => 16,
            AddrKind::V4 | AddrKind::Unnumbered => 4,
        }
    }

    fn read(self, name: &'static str, c: &mut ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        Ok(match self {
            AddrKind::V4 => DecodedObject::address(name, c.read_ipv4()?),
            AddrKind::V6 => DecodedObject::address(name, c.read_ipv6()?),
            AddrKind::Unnumbered => DecodedObject::scalar(name, c.read_u32(BE)?),
        })
    }
}

/// Local/remote identifier objects whose C-Type picks the family:
/// 1/2 IPv4, 3/4 IPv6, 5/6 unnumbered.
fn local_remote_id(desc: &TlvDescriptor, value: ByteCursor<'_>, local: &'static str, remote: &'static str) -> DecodedObject {
    match ctype(desc) {
        1 => field::ipv4(local, value),
        2 => field::ipv4(remote, value),
        3 => field::ipv6(local, value),
        4 => field::ipv6(remote, value),
        5 => field::uint(local, value, 4, BE),
        6 => field::uint(remote, value, 4, BE),
        _ => unknown_ctype(desc, value),
    }
}

fn decode_ccid(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(match ctype(desc) {
        1 => field::uint("local_ccid", value, 4, BE),
        2 => field::uint("remote_ccid", value, 4, BE),
        _ => unknown_ctype(desc, value),
    })
}

fn decode_node_id(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(match ctype(desc) {
        1 => field::ipv4("local_node_id", value),
        2 => field::ipv4("remote_node_id", value),
        _ => unknown_ctype(desc, value),
    })
}

fn decode_link_id(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(local_remote_id(desc, value, "local_link_id", "remote_link_id"))
}

fn decode_interface_id(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(local_remote_id(desc, value, "local_interface_id", "remote_interface_id"))
}

fn decode_da_dcn_address(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(local_remote_id(desc, value, "local_da_dcn_address", "remote_da_dcn_address"))
}

fn decode_message_id(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(match ctype(desc) {
        1 => field::uint("message_id", value, 4, BE),
        2 => field::uint("message_id_ack", value, 4, BE),
        _ => unknown_ctype(desc, value),
    })
}

fn decode_config(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let negotiable = DecodedObject::scalar("negotiable", desc.flags >> 7);
    match ctype(desc) {
        1 => field::fixed("hello_config", value, 4, |c| {
            Ok(DecodedObject::composite(
                "hello_config",
                vec![
                    negotiable,
                    DecodedObject::scalar("hello_interval", c.read_u16(BE)?),
                    DecodedObject::scalar("hello_dead_interval", c.read_u16(BE)?),
                ],
            ))
        }),
        2 => field::fixed("wdm_config", value, 4, |c| {
            let flags = c.read_u8()?;
            Ok(DecodedObject::composite(
                "wdm_config",
                vec![negotiable, field::bitfield("flags", u64::from(flags), WDM_CONFIG_FLAGS, 0xFC)],
            ))
        }),
        _ => Ok(unknown_ctype(desc, value)),
    }
}

fn decode_hello(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::fixed("hello", value, 8, |c| {
        Ok(DecodedObject::composite(
            "hello",
            vec![
                DecodedObject::scalar("tx_seq_num", c.read_u32(BE)?),
                DecodedObject::scalar("rcv_seq_num", c.read_u32(BE)?),
            ],
        ))
    })
}

fn decode_begin_verify(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::fixed("begin_verify", value, 20, |c| {
        let flags = c.read_u16(BE)?;
        let mut node = DecodedObject::composite(
            "begin_verify",
            vec![field::bitfield("flags", u64::from(flags), BEGIN_VERIFY_FLAGS, 0xFFFC)],
        );
        node.push_child(DecodedObject::scalar("verify_interval", c.read_u16(BE)?));
        node.push_child(DecodedObject::scalar("data_links", c.read_u32(BE)?));
        node.push_child(DecodedObject::scalar("encoding_type", c.read_u8()?));
        c.advance(1)?;
        node.push_child(DecodedObject::scalar("verify_transport_mechanism", c.read_u16(BE)?));
        node.push_child(DecodedObject::float("transmission_rate", c.read_f32(BE)?));
        node.push_child(DecodedObject::scalar("wavelength", c.read_u32(BE)?));
        Ok(node)
    })
}

fn decode_begin_verify_ack(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::fixed("begin_verify_ack", value, 4, |c| {
        Ok(DecodedObject::composite(
            "begin_verify_ack",
            vec![
                DecodedObject::scalar("verify_dead_interval", c.read_u16(BE)?),
                DecodedObject::scalar("verify_transport_response", c.read_u16(BE)?),
            ],
        ))
    })
}

fn decode_verify_id(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(match ctype(desc) {
        1 => field::uint("verify_id", value, 4, BE),
        _ => unknown_ctype(desc, value),
    })
}

fn decode_te_link(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let Some(kind) = AddrKind::from_ctype(ctype(desc)) else {
        return Ok(unknown_ctype(desc, value));
    };
    field::fixed("te_link", value, 4 + 2 * kind.width(), |c| {
        let flags = c.read_u8()?;
        c.advance(3)?;
        Ok(DecodedObject::composite(
            "te_link",
            vec![
                field::bitfield("flags", u64::from(flags), LINK_FLAGS, 0xFC),
                kind.read("local_link_id", c)?,
                kind.read("remote_link_id", c)?,
            ],
        ))
    })
}

fn decode_data_link(ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let Some(kind) = AddrKind::from_ctype(ctype(desc)) else {
        return Ok(unknown_ctype(desc, value));
    };
    field::at_least("data_link", value, 4 + 2 * kind.width(), |c| {
        let flags = c.read_u8()?;
        c.advance(3)?;
        let mut node = DecodedObject::composite(
            "data_link",
            vec![
                field::bitfield("flags", u64::from(flags), DATA_LINK_FLAGS, 0xFC),
                kind.read("local_interface_id", c)?,
                kind.read("remote_interface_id", c)?,
            ],
        );
        if !c.is_empty() {
            node.push_child(ctx.walk_composite("lmp.data_link", "subobjects", c.take_rest()));
        }
        Ok(node)
    })
}

fn decode_switching_type(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    field::fixed("interface_switching_type", value, 10, |c| {
        Ok(DecodedObject::composite(
            "interface_switching_type",
            vec![
                DecodedObject::scalar("switching_type", c.read_u8()?),
                DecodedObject::scalar("encoding_type", c.read_u8()?),
                DecodedObject::float("min_reservable_bandwidth", c.read_f32(BE)?),
                DecodedObject::float("max_reservable_bandwidth", c.read_f32(BE)?),
            ],
        ))
    })
}

fn decode_wavelength(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    Ok(field::uint("wavelength", value, 4, BE))
}

fn decode_channel_status(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let Some(kind) = AddrKind::from_ctype(ctype(desc)) else {
        return Ok(unknown_ctype(desc, value));
    };
    field::repeated("channel_status", value, kind.width() + 4, |c| {
        let id = kind.read("interface_id", c)?;
        let status = c.read_u32(BE)?;
        Ok(DecodedObject::composite(
            "channel",
            vec![
                id,
                field::bitfield("status_flags", u64::from(status), CHANNEL_STATUS_FLAGS, 0),
                DecodedObject::scalar("status", field::masked(u64::from(status), 0x3FFF_FFFF)),
            ],
        ))
    })
}

fn decode_channel_status_request(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let Some(kind) = AddrKind::from_ctype(ctype(desc)) else {
        return Ok(unknown_ctype(desc, value));
    };
    field::repeated("channel_status_request", value, kind.width(), |c| kind.read("interface_id", c))
}

fn decode_error(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let (name, flags, reserved) = match ctype(desc) {
        1 => ("begin_verify_error", BEGIN_VERIFY_ERRORS, 0xFFFF_FFE0),
        2 => ("link_summary_error", LINK_SUMMARY_ERRORS, 0xFFFF_FFC0),
        3 => ("trace_error", TRACE_ERRORS, 0xFFFF_FFEC),
        _ => return Ok(unknown_ctype(desc, value)),
    };
    field::fixed(name, value, 4, |c| {
        Ok(field::bitfield(name, u64::from(c.read_u32(BE)?), flags, reserved))
    })
}

fn decode_trace(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::at_least("trace", value, 4, |c| {
        let trace_type = c.read_u16(BE)?;
        let trace_len = usize::from(c.read_u16(BE)?);
        let mut node = DecodedObject::composite(
            "trace",
            vec![
                DecodedObject::scalar("trace_type", trace_type),
                DecodedObject::scalar("trace_length", trace_len as u64),
            ],
        );
        if trace_len > c.remaining() {
            node.push_warning(DecodeWarning::LengthMismatch {
                field: "trace_length",
                expected: trace_len,
                actual: c.remaining(),
            });
        }
        node.push_child(DecodedObject::bytes("trace_message", c.sub(trace_len).rest()));
        Ok(node)
    })
}

fn decode_trace_req(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::at_least("trace_req", value, 2, |c| Ok(DecodedObject::scalar("trace_type", c.read_u16(BE)?)))
}

fn decode_service_config(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    match ctype(desc) {
        1 => field::at_least("supported_signaling", value, 2, |c| {
            let protocols = c.read_u8()?;
            Ok(DecodedObject::composite(
                "supported_signaling",
                vec![
                    field::bitfield("protocols", u64::from(protocols), SIGNALING_PROTOCOLS, 0xFC),
                    DecodedObject::scalar("uni_version", c.read_u8()?),
                ],
            ))
        }),
        2 => Ok(field::bytes("port_service_attributes", value)),
        3 => field::at_least("transparency", value, 8, |c| {
            Ok(DecodedObject::composite(
                "transparency",
                vec![
                    DecodedObject::scalar("transparency_flags", c.read_u32(BE)?),
                    DecodedObject::scalar("tcm_monitoring", c.read_u32(BE)?),
                ],
            ))
        }),
        4 => field::at_least("diversity", value, 1, |c| {
            Ok(field::bitfield("diversity", u64::from(c.read_u8()?), DIVERSITY_FLAGS, 0xF8))
        }),
        _ => Ok(unknown_ctype(desc, value)),
    }
}

fn decode_local_lad_info(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if ctype(desc) != 1 {
        return Ok(unknown_ctype(desc, value));
    }
    field::at_least("local_lad_info", value, 24, |c| {
        let mut node = DecodedObject::composite("local_lad_info", Vec::new());
        for name in ["node_id", "area_id", "te_link_id", "component_link_id", "sc_pc_id", "sc_pc_address"] {
            node.push_child(DecodedObject::address(name, c.read_ipv4()?));
        }
        if !c.is_empty() {
            node.push_child(DecodedObject::bytes("subobjects", c.rest()));
        }
        Ok(node)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{lmp_object, LmpBuilder};
    use crate::protocol::{default_registry, dissect, dissect_with, ChecksumPolicy, DissectConfig, DissectOptions};
    use std::net::{IpAddr, Ipv4Addr};

    fn run(frame: &[u8]) -> crate::protocol::Dissection {
        let registry = default_registry().unwrap();
        dissect(&registry, frame, "lmp", None)
    }

    // Test 1: CCID object decodes to a named scalar
    #[test]
    fn test_local_ccid() {
        let frame = LmpBuilder::new(1).object(lmp_object(1, 1, &[0, 0, 0, 7])).build();
        let d = run(&frame);
        assert!(d.error().is_none());
        let ccid = d.root.find("objects.local_ccid").unwrap();
        assert_eq!(ccid.value, DecodedValue::Scalar(7));
        assert!(d.warnings().is_empty());
        assert_eq!(d.root.find("message_type_name").and_then(|n| n.as_text()), Some("Config"));
    }

    // Test 2: unsupported version is fatal to the call
    #[test]
    fn test_bad_version() {
        let mut frame = LmpBuilder::new(4).build();
        frame[0] = 0x20;
        let d = run(&frame);
        assert_eq!(
            d.error,
            Some(DecodeError::UnsupportedVersion { protocol: "lmp", version: 2 })
        );
        assert!(d.root.children().is_empty());
    }

    // Test 3: invalid class decodes as unknown
    #[test]
    fn test_invalid_class_unknown() {
        let frame = LmpBuilder::new(4).object(lmp_object(1, 30, &[1, 2, 3, 4])).build();
        let d = run(&frame);
        let objects = d.root.child("objects").unwrap();
        assert_eq!(
            objects.children()[0].value,
            DecodedValue::Unknown { type_code: 30, raw: vec![1, 2, 3, 4] }
        );
        assert_eq!(
            d.warnings(),
            vec![DecodeWarning::UnknownType { protocol: "lmp", type_code: 30 }]
        );
    }

    // Test 4: object length smaller than its header
    #[test]
    fn test_object_length_underflow() {
        let frame = LmpBuilder::new(4).object(vec![0x01, 0x07, 0x00, 0x02]).build();
        let d = run(&frame);
        let objects = d.root.child("objects").unwrap();
        let marker = objects.child("malformed").unwrap();
        assert_eq!(
            marker.error(),
            Some(&DecodeError::LengthUnderflow { type_code: 7, declared: 2, minimum: 4 })
        );
    }

    // Test 5: TE_LINK IPv4 with flags
    #[test]
    fn test_te_link() {
        let value = [0x03, 0, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2];
        let frame = LmpBuilder::new(14).object(lmp_object(1, 11, &value)).build();
        let d = run(&frame);
        let te = d.root.find("objects.te_link").unwrap();
        assert_eq!(te.find("flags").and_then(|f| f.flag("fault_management")), Some(true));
        assert_eq!(
            te.find("remote_link_id").and_then(|n| n.as_address()),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
        );
    }

    // Test 6: DATA_LINK with nested sub-objects
    #[test]
    fn test_data_link_subobjects() {
        let mut value = vec![0x01, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 6];
        value.extend_from_slice(&[2, 6, 0, 0, 0x05, 0xdc]); // wavelength 1500
        value.extend_from_slice(&[9, 3, 0xAA]); // unknown sub-object
        let frame = LmpBuilder::new(14).object(lmp_object(3, 12, &value)).build();
        let d = run(&frame);
        let dl = d.root.find("objects.data_link").unwrap();
        assert_eq!(dl.find("local_interface_id").and_then(|n| n.as_scalar()), Some(5));
        let subs = dl.child("subobjects").unwrap();
        assert_eq!(subs.find("wavelength").and_then(|n| n.as_scalar()), Some(1500));
        assert_eq!(
            subs.children()[1].value,
            DecodedValue::Unknown { type_code: 9, raw: vec![0xAA] }
        );
    }

    // Test 7: CHANNEL_STATUS repeated records
    #[test]
    fn test_channel_status() {
        let value = [10, 0, 0, 1, 0x80, 0, 0, 1, 10, 0, 0, 2, 0x40, 0, 0, 3];
        let frame = LmpBuilder::new(17).object(lmp_object(1, 13, &value)).build();
        let d = run(&frame);
        let cs = d.root.find("objects.channel_status").unwrap();
        let channels: Vec<_> = cs.children_named("channel").collect();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].find("status_flags").and_then(|f| f.flag("active")), Some(true));
        assert_eq!(channels[1].find("status").and_then(|n| n.as_scalar()), Some(3));
    }

    // Test 8: unknown C-Type is kept raw under its class
    #[test]
    fn test_unknown_ctype() {
        let frame = LmpBuilder::new(1)
            .object(lmp_object(9, 1, &[0xde, 0xad, 0xbe, 0xef]))
            .object(lmp_object(9, 2, &[0, 0, 0, 1]))
            .build();
        let d = run(&frame);
        assert_eq!(
            d.warnings(),
            vec![
                DecodeWarning::UnknownType { protocol: "lmp.ctype", type_code: 0x0109 },
                DecodeWarning::UnknownType { protocol: "lmp.ctype", type_code: 0x0209 },
            ]
        );
        let ccid = d.root.find("objects.ccid").unwrap();
        assert_eq!(
            ccid.value,
            DecodedValue::Unknown { type_code: 0x0109, raw: vec![0xde, 0xad, 0xbe, 0xef] }
        );
        assert!(d.root.find("objects.node_id").is_some());
    }

    // Test 9: ERROR bitfield per C-Type
    #[test]
    fn test_error_object() {
        let frame = LmpBuilder::new(7).object(lmp_object(1, 20, &[0, 0, 0, 0x12])).build();
        let d = run(&frame);
        let err = d.root.find("objects.begin_verify_error").unwrap();
        assert_eq!(err.flag("unwilling_to_verify"), Some(true));
        assert_eq!(err.flag("unknown_ctype"), Some(true));
        assert_eq!(err.flag("verification_not_supported"), Some(false));
    }

    // Test 10: checksum policy
    #[test]
    fn test_checksum_policy() {
        let mut frame = LmpBuilder::new(4).object(lmp_object(1, 7, &[0, 0, 0, 1, 0, 0, 0, 0])).build();
        frame[6] = 0x12;
        frame[7] = 0x34;
        let registry = default_registry().unwrap();

        let advisory = dissect(&registry, &frame, "lmp", None);
        assert!(matches!(
            advisory.warnings()[0],
            DecodeWarning::ChecksumInvalid { protocol: "lmp", actual: 0x1234, .. }
        ));

        let options = DissectOptions::new("lmp")
            .with_config(DissectConfig::default().with_checksums(ChecksumPolicy::Mandatory));
        let mandatory = dissect_with(&registry, &frame, &options);
        assert!(matches!(mandatory.error, Some(DecodeError::ChecksumInvalid { .. })));

        let expected = internet_checksum_without(&frame, 6);
        frame[6..8].copy_from_slice(&expected.to_be_bytes());
        let valid = dissect_with(&registry, &frame, &options);
        assert!(valid.error.is_none());
        assert!(valid.warnings().is_empty());
    }

    // Test 11: class predicate
    #[test]
    fn test_valid_class() {
        assert!(lmp_valid_class(1) && lmp_valid_class(14) && lmp_valid_class(249));
        assert!(!lmp_valid_class(0) && !lmp_valid_class(15) && !lmp_valid_class(50));
        for c in [class::ERROR, class::TRACE_REQ, class::SERVICE_CONFIG, class::DA_DCN_ADDRESS] {
            assert!(lmp_valid_class(c), "class {c}");
        }
    }
}
