//! CoAP (Constrained Application Protocol) dissector.
//!
//! RFC 7252 message format:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```
//!
//! Options use delta/length nibbles and are walked with
//! [`HeaderLayout::DeltaNibble`]; the 0xFF payload marker terminates the walk.
//! A payload protected by OSCORE (RFC 8613) is handed to
//! [`oscore`](super::oscore) when keys are supplied.

use crate::cursor::{ByteCursor, BE};
use crate::error::{DecodeError, DecodeWarning, RegistryError};
use crate::tlv::field::{self, BitFlag};
use crate::tlv::{DecodedObject, HeaderLayout, ObjectTable, RegistryEntry, TlvDescriptor, WalkState};

use super::oscore::{self, OscoreOption};
use super::{DecodeCtx, Dissector, ObjectRegistry, Selector};

/// Default UDP port for CoAP.
pub const COAP_PORT: u16 = 5683;

/// Thread Management Framework port; payloads are MeshCoP TLVs.
pub const TMF_PORT: u16 = 61631;

const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LEN: usize = 8;

/// CoAP option numbers (RFC 7252, 7641, 7959, 8613).
pub mod option {
    pub const IF_MATCH: u32 = 1;
    pub const URI_HOST: u32 = 3;
    pub const ETAG: u32 = 4;
    pub const IF_NONE_MATCH: u32 = 5;
    pub const OBSERVE: u32 = 6;
    pub const URI_PORT: u32 = 7;
    pub const LOCATION_PATH: u32 = 8;
    pub const OSCORE: u32 = 9;
    pub const URI_PATH: u32 = 11;
    pub const CONTENT_FORMAT: u32 = 12;
    pub const MAX_AGE: u32 = 14;
    pub const URI_QUERY: u32 = 15;
    pub const ACCEPT: u32 = 17;
    pub const LOCATION_QUERY: u32 = 20;
    pub const BLOCK2: u32 = 23;
    pub const BLOCK1: u32 = 27;
    pub const SIZE2: u32 = 28;
    pub const PROXY_URI: u32 = 35;
    pub const PROXY_SCHEME: u32 = 39;
    pub const SIZE1: u32 = 60;
}

const OSCORE_FLAGS: &[BitFlag] = &[BitFlag::new("kid", 0x08), BitFlag::new("kid_context", 0x10)];

const OPTIONS: &[RegistryEntry] = &[
    RegistryEntry::exact(option::IF_MATCH, "if_match", |_, _, v| Ok(field::bytes("if_match", v))),
    RegistryEntry::exact(option::URI_HOST, "uri_host", |_, _, v| Ok(field::text("uri_host", v))),
    RegistryEntry::exact(option::ETAG, "etag", |_, _, v| Ok(field::bytes("etag", v))),
    RegistryEntry::exact(option::IF_NONE_MATCH, "if_none_match", |_, _, v| {
        field::fixed("if_none_match", v, 0, |_| Ok(DecodedObject::scalar("if_none_match", 1u8)))
    }),
    RegistryEntry::exact(option::OBSERVE, "observe", |_, _, v| Ok(field::var_uint("observe", v, 3))),
    RegistryEntry::exact(option::URI_PORT, "uri_port", |_, _, v| Ok(field::var_uint("uri_port", v, 2))),
    RegistryEntry::exact(option::LOCATION_PATH, "location_path", |_, _, v| {
        Ok(field::text("location_path", v))
    }),
    RegistryEntry::exact(option::OSCORE, "oscore", decode_oscore),
    RegistryEntry::exact(option::URI_PATH, "uri_path", |_, _, v| Ok(field::text("uri_path", v))),
    RegistryEntry::exact(option::CONTENT_FORMAT, "content_format", decode_content_format),
    RegistryEntry::exact(option::MAX_AGE, "max_age", |_, _, v| Ok(field::var_uint("max_age", v, 4))),
    RegistryEntry::exact(option::URI_QUERY, "uri_query", |_, _, v| Ok(field::text("uri_query", v))),
    RegistryEntry::exact(option::ACCEPT, "accept", decode_content_format),
    RegistryEntry::exact(option::LOCATION_QUERY, "location_query", |_, _, v| {
        Ok(field::text("location_query", v))
    }),
    RegistryEntry::exact(option::BLOCK2, "block2", decode_block),
    RegistryEntry::exact(option::BLOCK1, "block1", decode_block),
    RegistryEntry::exact(option::SIZE2, "size2", |_, _, v| Ok(field::var_uint("size2", v, 4))),
    RegistryEntry::exact(option::PROXY_URI, "proxy_uri", |_, _, v| Ok(field::text("proxy_uri", v))),
    RegistryEntry::exact(option::PROXY_SCHEME, "proxy_scheme", |_, _, v| {
        Ok(field::text("proxy_scheme", v))
    }),
    RegistryEntry::exact(option::SIZE1, "size1", |_, _, v| Ok(field::var_uint("size1", v, 4))),
];

pub(super) fn register(registry: &mut ObjectRegistry) -> Result<(), RegistryError> {
    let options = ObjectTable::new("coap.options", HeaderLayout::DeltaNibble, OPTIONS)?.with_terminator(PAYLOAD_MARKER);
    registry.register_table(options)?;
    registry.register_dissector(CoapDissector)?;
    registry.register_dissector(CoapInnerDissector)
}

/// Message type name.
fn type_name(t: u8) -> &'static str {
    match t {
        0 => "CON",
        1 => "NON",
        2 => "ACK",
        _ => "RST",
    }
}

/// Name of a request method or response code, as `class.detail`.
pub fn code_name(code: u8) -> Option<&'static str> {
    Some(match (code >> 5, code & 0x1F) {
        (0, 0) => "Empty",
        (0, 1) => "GET",
        (0, 2) => "POST",
        (0, 3) => "PUT",
        (0, 4) => "DELETE",
        (0, 5) => "FETCH",
        (0, 6) => "PATCH",
        (0, 7) => "iPATCH",
        (2, 1) => "Created",
        (2, 2) => "Deleted",
        (2, 3) => "Valid",
        (2, 4) => "Changed",
        (2, 5) => "Content",
        (2, 31) => "Continue",
        (4, 0) => "Bad Request",
        (4, 1) => "Unauthorized",
        (4, 2) => "Bad Option",
        (4, 3) => "Forbidden",
        (4, 4) => "Not Found",
        (4, 5) => "Method Not Allowed",
        (4, 6) => "Not Acceptable",
        (4, 8) => "Request Entity Incomplete",
        (4, 12) => "Precondition Failed",
        (4, 13) => "Request Entity Too Large",
        (4, 15) => "Unsupported Content-Format",
        (5, 0) => "Internal Server Error",
        (5, 1) => "Not Implemented",
        (5, 2) => "Bad Gateway",
        (5, 3) => "Service Unavailable",
        (5, 4) => "Gateway Timeout",
        (5, 5) => "Proxying Not Supported",
        _ => return None,
    })
}

fn content_format_name(format: u64) -> Option<&'static str> {
    Some(match format {
        0 => "text/plain; charset=utf-8",
        16 => "application/cose; cose-type=\"cose-encrypt0\"",
        40 => "application/link-format",
        41 => "application/xml",
        42 => "application/octet-stream",
        47 => "application/exi",
        50 => "application/json",
        60 => "application/cbor",
        61 => "application/cwt",
        _ => return None,
    })
}

fn code_children(code: u8) -> Vec<DecodedObject> {
    let mut children = vec![
        DecodedObject::scalar("code", code),
        DecodedObject::scalar("code_class", code >> 5),
        DecodedObject::scalar("code_detail", code & 0x1F),
    ];
    if let Some(name) = code_name(code) {
        children.push(DecodedObject::text("code_name", name));
    }
    children
}

/// CoAP dissector.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoapDissector;

impl Dissector for CoapDissector {
    fn name(&self) -> &'static str {
        "coap"
    }

    fn display_name(&self) -> &'static str {
        "CoAP"
    }

    fn can_parse(&self, selector: &Selector) -> Option<u32> {
        (selector.has_port(COAP_PORT) || selector.has_port(TMF_PORT)).then_some(100)
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        let first = cursor.read_u8()?;
        let version = first >> 6;
        if version != 1 {
            return Err(DecodeError::UnsupportedVersion {
                protocol: "coap",
                version: u32::from(version),
            });
        }
        let msg_type = (first >> 4) & 0x03;
        let token_len = usize::from(first & 0x0F);
        if token_len > MAX_TOKEN_LEN {
            return Err(DecodeError::malformed(
                "coap",
                "token_length",
                format!("token length {token_len} exceeds {MAX_TOKEN_LEN}"),
            ));
        }
        let code = cursor.read_u8()?;
        let message_id = cursor.read_u16(BE)?;
        let token = cursor.read_bytes(token_len)?;

        let mut children = vec![
            DecodedObject::scalar("version", version),
            DecodedObject::scalar("type", msg_type),
            DecodedObject::text("type_name", type_name(msg_type)),
            DecodedObject::scalar("token_length", token_len as u64),
        ];
        children.extend(code_children(code));
        children.push(DecodedObject::scalar("message_id", message_id));
        children.push(DecodedObject::bytes("token", token));
        let mut root = DecodedObject::composite("coap", children);

        let Some(payload) = decode_options(ctx, &mut root, cursor) else {
            return Ok(root);
        };

        let protection = root
            .child("options")
            .and_then(|options| options.child("oscore"))
            .filter(|node| !node.is_aborted())
            .map(OscoreOption::from_node);
        match protection {
            Some(protection) if !payload.is_empty() => {
                root.push_child(DecodedObject::bytes("payload", payload.rest()));
                let is_request = code >> 5 == 0 && code != 0;
                root.push_child(oscore::unprotect(ctx, &protection, is_request, payload.rest()));
            }
            _ => decode_payload(ctx, &mut root, payload),
        }
        Ok(root)
    }
}

/// Inner message recovered from an OSCORE payload: code, options, payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoapInnerDissector;

impl Dissector for CoapInnerDissector {
    fn name(&self) -> &'static str {
        "coap.inner"
    }

    fn display_name(&self) -> &'static str {
        "CoAP (OSCORE inner)"
    }

    fn dissect(&self, ctx: &mut DecodeCtx<'_>, mut cursor: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
        let code = cursor.read_u8()?;
        let mut root = DecodedObject::composite("coap_inner", code_children(code));
        if let Some(payload) = decode_options(ctx, &mut root, cursor) {
            decode_payload(ctx, &mut root, payload);
        }
        Ok(root)
    }
}

/// Walk the option stream into an `options` child.
///
/// Returns the payload, empty when there is no marker, or `None` when the
/// option stream was malformed and the payload cannot be located.
fn decode_options<'a>(
    ctx: &mut DecodeCtx<'_>,
    root: &mut DecodedObject,
    cursor: ByteCursor<'a>,
) -> Option<ByteCursor<'a>> {
    let outcome = ctx.walk("coap.options", cursor);
    let state = outcome.state;
    let end = outcome.end;
    root.push_child(outcome.into_composite("options"));

    match state {
        WalkState::Aborted => None,
        WalkState::Done => Some(cursor.sub(0)),
        WalkState::Terminated => {
            let payload = cursor.slice(end, cursor.limit().saturating_sub(end)).ok()?;
            if payload.is_empty() {
                // A marker must be followed by a payload (RFC 7252 section 3).
                root.push_warning(DecodeWarning::LengthMismatch {
                    field: "payload",
                    expected: 1,
                    actual: 0,
                });
            }
            Some(payload)
        }
    }
}

fn decode_payload(ctx: &mut DecodeCtx<'_>, root: &mut DecodedObject, payload: ByteCursor<'_>) {
    if payload.is_empty() {
        return;
    }
    root.push_child(DecodedObject::bytes("payload", payload.rest()));
    if ctx.selector().has_port(TMF_PORT) {
        root.push_child(ctx.call_subdissector("meshcop", payload));
    }
}

fn decode_content_format(
    _ctx: &mut DecodeCtx<'_>,
    desc: &TlvDescriptor,
    value: ByteCursor<'_>,
) -> Result<DecodedObject, DecodeError> {
    let name = if desc.type_code == option::ACCEPT {
        "accept"
    } else {
        "content_format"
    };
    let format = field::var_uint(name, value, 2);
    let Some(raw) = format.as_scalar() else {
        return Ok(format);
    };
    let mut children = vec![DecodedObject::scalar("value", raw)];
    if let Some(media) = content_format_name(raw) {
        children.push(DecodedObject::text("media_type", media));
    }
    Ok(DecodedObject::composite(name, children))
}

/// Block1/Block2 (RFC 7959): `NUM | M | SZX`.
fn decode_block(_ctx: &mut DecodeCtx<'_>, desc: &TlvDescriptor, value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    let name = if desc.type_code == option::BLOCK1 {
        "block1"
    } else {
        "block2"
    };
    let block = field::var_uint(name, value, 3);
    let Some(raw) = block.as_scalar() else {
        return Ok(block);
    };
    let szx = raw & 0x07;
    let mut node = DecodedObject::composite(
        name,
        vec![
            DecodedObject::scalar("num", raw >> 4),
            DecodedObject::scalar("more", (raw >> 3) & 0x01),
            DecodedObject::scalar("szx", szx),
        ],
    );
    if szx == 7 {
        node.push_warning(DecodeWarning::ReservedFieldNonzero { field: "szx", value: szx });
    } else {
        node.push_child(DecodedObject::scalar("block_size", 1u64 << (szx + 4)));
    }
    Ok(node)
}

/// OSCORE option (RFC 8613 section 6.1).
///
/// ```text
///  0 1 2 3 4 5 6 7 <------------- n bytes -------------->
/// +-+-+-+-+-+-+-+-+--------------------------------------
/// |0 0 0|h|k|  n  |       Partial IV (if any) ...
/// +-+-+-+-+-+-+-+-+--------------------------------------
///  <- 1 byte -> <----- s bytes ------>
/// +------------+----------------------+------------------+
/// | s (if any) | kid context (if any) | kid (if any) ... |
/// +------------+----------------------+------------------+
/// ```
fn decode_oscore(_ctx: &mut DecodeCtx<'_>, _desc: &TlvDescriptor, mut value: ByteCursor<'_>) -> Result<DecodedObject, DecodeError> {
    if value.is_empty() {
        return Ok(DecodedObject::composite(
            "oscore",
            vec![field::bitfield("flags", 0, OSCORE_FLAGS, 0xE0), DecodedObject::scalar("partial_iv_length", 0u8)],
        ));
    }
    let flags = value.read_u8()?;
    let piv_len = usize::from(flags & 0x07);
    if piv_len > 5 {
        return Err(DecodeError::malformed(
            "coap",
            "oscore",
            format!("reserved partial IV length {piv_len}"),
        ));
    }
    let mut node = DecodedObject::composite(
        "oscore",
        vec![
            field::bitfield("flags", u64::from(flags), OSCORE_FLAGS, 0xE0),
            DecodedObject::scalar("partial_iv_length", piv_len as u64),
        ],
    );
    if piv_len > 0 {
        node.push_child(DecodedObject::bytes("partial_iv", value.read_bytes(piv_len)?));
    }
    if flags & 0x10 != 0 {
        let s = usize::from(value.read_u8()?);
        node.push_child(DecodedObject::bytes("kid_context", value.read_bytes(s)?));
    }
    if flags & 0x08 != 0 {
        node.push_child(DecodedObject::bytes("kid", value.rest()));
    } else if !value.is_empty() {
        node.push_warning(DecodeWarning::LengthMismatch {
            field: "oscore",
            expected: value.position() - value.start(),
            actual: value.limit() - value.start(),
        });
    }
    Ok(node)
}
