//! Test utilities for protocol dissection.
//!
//! Provides builders for constructing test frames and reference vectors
//! shared by unit and integration tests.

use std::net::Ipv6Addr;

use crate::checksum::{fletcher_checksum, internet_checksum_without};
use crate::crypto::{KeyContext, PacketInfo};

/// Builder for constructing LMP messages.
#[derive(Debug, Clone)]
pub struct LmpBuilder {
    message_type: u8,
    flags: u8,
    objects: Vec<u8>,
}

impl LmpBuilder {
    pub fn new(message_type: u8) -> Self {
        Self {
            message_type,
            flags: 0,
            objects: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Append one encoded object (see [`lmp_object`]).
    pub fn object(mut self, object: Vec<u8>) -> Self {
        self.objects.extend(object);
        self
    }

    /// Version 1 header with the correct length and a zero checksum.
    pub fn build(self) -> Vec<u8> {
        let length = (8 + self.objects.len()) as u16;
        let mut msg = vec![0x10, 0x00, self.flags, self.message_type];
        msg.extend_from_slice(&length.to_be_bytes());
        msg.extend_from_slice(&[0x00, 0x00]);
        msg.extend(self.objects);
        msg
    }
}

/// Encode one LMP object with a header-inclusive length.
pub fn lmp_object(ctype: u8, class: u8, value: &[u8]) -> Vec<u8> {
    let length = (4 + value.len()) as u16;
    let mut obj = vec![ctype, class];
    obj.extend_from_slice(&length.to_be_bytes());
    obj.extend_from_slice(value);
    obj
}

/// Builder for constructing OSPFv2 packets.
#[derive(Debug, Clone)]
pub struct OspfBuilder {
    packet_type: u8,
    router_id: [u8; 4],
    area_id: [u8; 4],
    auth_type: u16,
    body: Vec<u8>,
}

impl OspfBuilder {
    pub fn new(packet_type: u8) -> Self {
        Self {
            packet_type,
            router_id: [1, 1, 1, 1],
            area_id: [0, 0, 0, 0],
            auth_type: 0,
            body: Vec::new(),
        }
    }

    pub fn router_id(mut self, router_id: [u8; 4]) -> Self {
        self.router_id = router_id;
        self
    }

    pub fn area_id(mut self, area_id: [u8; 4]) -> Self {
        self.area_id = area_id;
        self
    }

    pub fn auth_type(mut self, auth_type: u16) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// 24-byte header with length and checksum filled in.
    pub fn build(self) -> Vec<u8> {
        let length = (24 + self.body.len()) as u16;
        let mut pkt = vec![2, self.packet_type];
        pkt.extend_from_slice(&length.to_be_bytes());
        pkt.extend_from_slice(&self.router_id);
        pkt.extend_from_slice(&self.area_id);
        pkt.extend_from_slice(&[0x00, 0x00]);
        pkt.extend_from_slice(&self.auth_type.to_be_bytes());
        pkt.extend_from_slice(&[0u8; 8]);
        pkt.extend(self.body);

        let covered = [&pkt[..16], &pkt[24..]].concat();
        let checksum = internet_checksum_without(&covered, 12);
        pkt[12..14].copy_from_slice(&checksum.to_be_bytes());
        pkt
    }
}

/// Encode one OSPFv2 LSA advertised by 10.0.0.1 with a valid Fletcher checksum.
pub fn ospf_lsa(ls_type: u8, link_state_id: [u8; 4], body: &[u8]) -> Vec<u8> {
    let length = (20 + body.len()) as u16;
    let mut lsa = vec![0x00, 0x01, 0x22, ls_type];
    lsa.extend_from_slice(&link_state_id);
    lsa.extend_from_slice(&[10, 0, 0, 1]);
    lsa.extend_from_slice(&0x8000_0001u32.to_be_bytes());
    lsa.extend_from_slice(&[0x00, 0x00]);
    lsa.extend_from_slice(&length.to_be_bytes());
    lsa.extend_from_slice(body);

    let checksum = fletcher_checksum(&lsa[2..], 14);
    lsa[16..18].copy_from_slice(&checksum.to_be_bytes());
    lsa
}

/// Builder for constructing CoAP messages.
#[derive(Debug, Clone)]
pub struct CoapBuilder {
    msg_type: u8,
    code: u8,
    message_id: u16,
    token: Vec<u8>,
    options: Vec<(u32, Vec<u8>)>,
    payload: Vec<u8>,
}

impl CoapBuilder {
    pub fn new(code: u8) -> Self {
        Self {
            msg_type: 0,
            code,
            message_id: 1,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn msg_type(mut self, msg_type: u8) -> Self {
        self.msg_type = msg_type;
        self
    }

    pub fn message_id(mut self, message_id: u16) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn token(mut self, token: &[u8]) -> Self {
        self.token = token.to_vec();
        self
    }

    /// Add an option; options are sorted by number when built.
    pub fn option(mut self, number: u32, value: &[u8]) -> Self {
        self.options.push((number, value.to_vec()));
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let mut msg = vec![0x40 | (self.msg_type & 0x03) << 4 | self.token.len() as u8, self.code];
        msg.extend_from_slice(&self.message_id.to_be_bytes());
        msg.extend_from_slice(&self.token);

        self.options.sort_by_key(|(number, _)| *number);
        let mut last = 0;
        for (number, value) in &self.options {
            let (delta, delta_ext) = nibble(number - last);
            let (len, len_ext) = nibble(value.len() as u32);
            msg.push(delta << 4 | len);
            msg.extend(delta_ext);
            msg.extend(len_ext);
            msg.extend_from_slice(value);
            last = *number;
        }

        if !self.payload.is_empty() {
            msg.push(0xff);
            msg.extend(self.payload);
        }
        msg
    }
}

fn nibble(value: u32) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

/// MLE Advertisement protected at security level 5 with key id mode 2.
///
/// Produced with master key 00112233445566778899aabbccddeeff, key sequence 0,
/// frame counter 1 and source fe80::1122:3344:5566:7788 to ff02::1. The
/// plaintext is command 4 with Source Address 0x0400 and Leader Data.
pub const MLE_ADVERTISEMENT: [u8; 30] = [
    0x00, 0x15, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // suite, aux header
    0xc3, 0x92, 0xa7, 0x62, 0xc9, 0x55, 0x45, 0x88, 0x3a, 0xc2, 0xbf, 0x76, 0x73, 0x4e, 0x3d, // ciphertext
    0x3e, 0x3c, 0xf4, 0x7e, // MIC
];

/// Keys and addressing that open [`MLE_ADVERTISEMENT`].
pub fn mle_keys() -> KeyContext {
    let master = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    ];
    KeyContext::new().with_master_key(master, 0).with_packet(PacketInfo {
        src_addr: Some(Ipv6Addr::new(0xfe80, 0, 0, 0, 0x1122, 0x3344, 0x5566, 0x7788)),
        dst_addr: Some(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1)),
        src_ext_addr: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{fletcher_valid, internet_checksum};

    // Test 1: LMP builder header
    #[test]
    fn test_lmp_builder() {
        let msg = LmpBuilder::new(1).object(lmp_object(1, 1, &[0, 0, 0, 7])).build();
        assert_eq!(&msg[..8], &[0x10, 0x00, 0x00, 0x01, 0x00, 0x10, 0x00, 0x00]);
        assert_eq!(&msg[8..12], &[0x01, 0x01, 0x00, 0x08]);
    }

    // Test 2: OSPF builder produces valid checksums
    #[test]
    fn test_ospf_builder_checksums() {
        let lsa = ospf_lsa(1, [10, 0, 0, 1], &[0, 0, 0, 0]);
        assert!(fletcher_valid(&lsa[2..]));

        let pkt = OspfBuilder::new(4).body(lsa).build();
        let covered = [&pkt[..16], &pkt[24..]].concat();
        assert_eq!(internet_checksum(&covered), 0);
    }

    // Test 3: CoAP builder option deltas
    #[test]
    fn test_coap_builder() {
        let msg = CoapBuilder::new(0x01)
            .token(&[0xab])
            .option(11, b"a")
            .option(3, b"h")
            .option(60, &[1])
            .payload(b"x")
            .build();
        assert_eq!(
            msg,
            vec![0x41, 0x01, 0x00, 0x01, 0xab, 0x31, b'h', 0x81, b'a', 0xd1, 36, 1, 0xff, b'x']
        );
    }
}
