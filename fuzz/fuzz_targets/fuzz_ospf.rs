//! Fuzz target for the OSPF dissector.
//!
//! The fuzz data follows a well-formed OSPFv2 header so the packet length
//! check passes and the body decoders are reached:
//! - Hello, DD, LS Request, LS Update and LS Ack bodies
//! - LSA headers, Fletcher checksums and LSA bodies
//! - TE and Router Information object walks inside opaque LSAs

#![no_main]

use libfuzzer_sys::fuzz_target;
use tlvscope_core::protocol::test_utils::OspfBuilder;
use tlvscope_core::{builtin_registry, dissect_with, ChecksumPolicy, DissectConfig, DissectOptions};

fuzz_target!(|data: &[u8]| {
    let Some((&packet_type, body)) = data.split_first() else {
        return;
    };
    let Ok(registry) = builtin_registry() else {
        return;
    };

    // Packet types 1..=5, with an occasional unknown one
    let frame = OspfBuilder::new(packet_type % 7).body(body.to_vec()).build();
    for policy in [ChecksumPolicy::Advisory, ChecksumPolicy::Mandatory] {
        let options = DissectOptions::new("ospf").with_config(DissectConfig::default().with_checksums(policy));
        let _ = dissect_with(registry, &frame, &options);
    }

    // Raw input, including v3 and truncated headers
    let _ = dissect_with(registry, data, &DissectOptions::new("ospf"));
});
