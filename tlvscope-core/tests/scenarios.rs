//! End-to-end dissection of whole frames selected by lower-layer hints.

use std::net::{IpAddr, Ipv4Addr};

use tlvscope_core::protocol::test_utils::{
    lmp_object, mle_keys, ospf_lsa, CoapBuilder, LmpBuilder, OspfBuilder, MLE_ADVERTISEMENT,
};
use tlvscope_core::{
    builtin_registry, dissect_with, DecodeWarning, DecodedValue, DissectOptions, Dissection, KeyContext,
    OscoreContext, Selector,
};

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn selected(frame: &[u8], selector: Selector, keys: Option<&KeyContext>) -> Dissection {
    let options = DissectOptions::selected(selector).with_keys(keys);
    dissect_with(builtin_registry().unwrap(), frame, &options)
}

fn hello_body() -> Vec<u8> {
    let mut body = vec![255, 255, 255, 0, 0x00, 0x0a, 0x02, 0x01, 0x00, 0x00, 0x00, 0x28];
    body.extend_from_slice(&[10, 0, 0, 1, 0, 0, 0, 0]);
    body.extend_from_slice(&[10, 0, 0, 2]);
    body
}

// Test 1: each transport hint picks its dissector
#[test]
fn test_selection_by_hint() {
    let lmp = LmpBuilder::new(4).build();
    assert_eq!(selected(&lmp, Selector::udp(701, 701), None).root.name, "lmp");

    let mle = [0xff, 0x04];
    assert_eq!(selected(&mle, Selector::udp(19788, 19788), None).root.name, "mle");

    let ospf = OspfBuilder::new(1).body(hello_body()).build();
    assert_eq!(selected(&ospf, Selector::ip_protocol(89), None).root.name, "ospf");

    let coap = CoapBuilder::new(0x01).build();
    assert_eq!(selected(&coap, Selector::udp(40000, 5683), None).root.name, "coap");
}

// Test 2: no dissector claims the frame
#[test]
fn test_unclaimed_frame() {
    let d = selected(&[1, 2, 3], Selector::udp(40000, 40001), None);
    assert_eq!(d.root.name, "data");
    assert_eq!(d.root.as_bytes(), Some(&[1, 2, 3][..]));
    assert!(matches!(d.warnings()[..], [DecodeWarning::MissingDissector { .. }]));
}

// Test 3: LMP Config over UDP 701
#[test]
fn test_lmp_config() {
    let frame = LmpBuilder::new(1).object(lmp_object(1, 1, &[0, 0, 0, 7])).build();
    let d = selected(&frame, Selector::udp(701, 49152), None);
    let ccid = d.root.find("objects.local_ccid").unwrap();
    assert_eq!(ccid.value, DecodedValue::Scalar(7));
    assert!(d.error().is_none());
    assert!(d.warnings().is_empty());
}

// Test 4: secured MLE Advertisement end to end
#[test]
fn test_mle_advertisement() {
    let keys = mle_keys();
    let d = selected(&MLE_ADVERTISEMENT, Selector::udp(19788, 19788), Some(&keys));
    assert!(d.error().is_none());
    assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
    assert_eq!(d.root.find("mic_status").and_then(|n| n.as_text()), Some("verified"));
    assert_eq!(d.root.find("key_sequence").and_then(|n| n.as_scalar()), Some(0));

    let mut corrupted = MLE_ADVERTISEMENT.to_vec();
    corrupted[28] ^= 0x01;
    let d = selected(&corrupted, Selector::udp(19788, 19788), Some(&keys));
    assert_eq!(d.warnings(), vec![DecodeWarning::TagCheckFailed]);
    assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
}

// Test 5: MLE capture cut inside the MIC
#[test]
fn test_mle_truncated_capture() {
    let keys = mle_keys();
    let options = DissectOptions::new("mle")
        .with_keys(Some(&keys))
        .with_reported_len(MLE_ADVERTISEMENT.len());
    let d = dissect_with(builtin_registry().unwrap(), &MLE_ADVERTISEMENT[..28], &options);
    assert!(d.error().is_none());
    assert_eq!(d.root.warnings, vec![DecodeWarning::PacketTooSmall { needed: 4, have: 2 }]);
    assert_eq!(d.root.find("mic_status").and_then(|n| n.as_text()), Some("truncated"));
    assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
}

// Test 6: plaintext MLE with a bad Route64 keeps its other TLVs
#[test]
fn test_mle_route64_mismatch() {
    let frame = [
        0xff, 0x04, // plaintext Advertisement
        0x01, 0x01, 0x0f, // mode
        0x09, 0x0a, 0x05, 0x80, 0, 0, 0, 0, 0, 0, 0x01, 0x5f, // route64: 2 bits set, 1 route
        0x00, 0x02, 0x04, 0x00, // source address
    ];
    let d = selected(&frame, Selector::udp(19788, 19788), None);
    assert_eq!(
        d.warnings(),
        vec![DecodeWarning::LengthMismatch { field: "route64", expected: 2, actual: 1 }]
    );
    assert!(matches!(d.root.find("tlvs.route64").map(|n| &n.value), Some(DecodedValue::Bytes(_))));
    assert_eq!(d.root.find("tlvs.source_address").and_then(|n| n.as_scalar()), Some(0x0400));
    assert_eq!(d.root.find("tlvs.mode").and_then(|n| n.flag("full_thread_device")), Some(true));
}

// Test 7: TMF message carrying a MeshCoP channel mask
#[test]
fn test_tmf_channel_mask() {
    let mask = [53, 12, 0x00, 0x04, 0x07, 0xff, 0xf8, 0x00, 0x02, 0x04, 0x00, 0x00, 0x00, 0x01];
    let frame = CoapBuilder::new(0x02).msg_type(1).token(&[1, 2]).payload(&mask).build();
    let d = selected(&frame, Selector::udp(49152, 61631), None);
    let entries = d.root.find("meshcop.channel_mask").map(|n| n.children().len());
    assert_eq!(entries, Some(2));
    assert!(d.warnings().is_empty());

    let bad = [53, 5, 0x00, 0x04, 0x07, 0xff, 0xf8];
    let frame = CoapBuilder::new(0x02).msg_type(1).payload(&bad).build();
    let d = selected(&frame, Selector::udp(49152, 61631), None);
    assert_eq!(d.root.find("meshcop.channel_mask").map(|n| n.children().len()), Some(0));
    assert_eq!(
        d.warnings(),
        vec![DecodeWarning::LengthMismatch { field: "channel_mask", expected: 6, actual: 5 }]
    );
}

// Test 8: OSCORE-protected GET (RFC 8613 C.4)
#[test]
fn test_oscore_request() {
    let context = OscoreContext::new(hex("0102030405060708090a0b0c0d0e0f10"), hex("9e7ca92223786340"))
        .with_ids(vec![], vec![0x01]);
    let keys = KeyContext::new().with_oscore_context(context);
    let frame = hex("44025d1f00003974396c6f63616c686f7374620914ff612f1092f1776f1c1668b3825e");

    let d = selected(&frame, Selector::udp(40000, 5683), Some(&keys));
    assert!(d.error().is_none());
    assert_eq!(d.root.find("options.uri_host").and_then(|n| n.as_text()), Some("localhost"));
    let inner = d.root.find("oscore_payload.coap_inner").unwrap();
    assert_eq!(inner.find("code_name").and_then(|n| n.as_text()), Some("GET"));
    assert_eq!(inner.find("options.uri_path").and_then(|n| n.as_text()), Some("tv1"));

    let d = selected(&frame, Selector::udp(40000, 5683), None);
    assert!(d.root.find("oscore_payload").is_some_and(|n| n.is_aborted()));
    assert!(d.root.find("options.oscore").is_some());
}

// Test 9: OSPF Hello and Router Information over IP protocol 89
#[test]
fn test_ospf_flow() {
    let frame = OspfBuilder::new(1).router_id([192, 0, 2, 1]).body(hello_body()).build();
    let d = selected(&frame, Selector::ip_protocol(89), None);
    let (root, warnings, error) = d.into_parts();
    assert!(warnings.is_empty());
    assert!(error.is_none());
    assert_eq!(
        root.find("router_id").and_then(|n| n.as_address()),
        Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
    );
    assert_eq!(root.find("hello.neighbors").map(|n| n.children().len()), Some(1));

    let ri = [0x00, 0x01, 0x00, 0x04, 0xa0, 0x00, 0x00, 0x00];
    let mut body = 1u32.to_be_bytes().to_vec();
    body.extend_from_slice(&ospf_lsa(10, [4, 0, 0, 0], &ri));
    let frame = OspfBuilder::new(4).body(body).build();
    let d = selected(&frame, Selector::ip_protocol(89), None);
    let caps = d.root.find("ls_update.lsa.router_information.capabilities").unwrap();
    assert_eq!(caps.flag("graceful_restart_capable"), Some(true));
    assert!(d.warnings().is_empty());
}
