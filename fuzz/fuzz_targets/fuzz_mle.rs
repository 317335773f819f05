//! Fuzz target for secured MLE frames.
//!
//! Frames are prefixed with the 802.15.4 security suite so the auxiliary
//! header parser and the AES-CCM* path always run with a usable key:
//! - key id modes and MIC lengths from the security control byte
//! - truncated captures via a reported length past the data
//! - decrypted (unverified) plaintext fed to the TLV walker

#![no_main]

use libfuzzer_sys::fuzz_target;
use tlvscope_core::protocol::test_utils::mle_keys;
use tlvscope_core::{builtin_registry, dissect_with, DissectConfig, DissectOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(registry) = builtin_registry() else {
        return;
    };
    let keys = mle_keys();

    let mut frame = vec![0x00];
    frame.extend_from_slice(data);

    let options = DissectOptions::new("mle").with_keys(Some(&keys));
    let _ = dissect_with(registry, &frame, &options);

    let strict = options.clone().with_config(DissectConfig::default().strict(true));
    let _ = dissect_with(registry, &frame, &strict);

    let truncated = options.with_reported_len(frame.len() + 3);
    let _ = dissect_with(registry, &frame, &truncated);
});
