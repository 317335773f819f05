//! Fuzz target for every registered dissector.
//!
//! The same input is handed to each dissector by name, with and without
//! key material, and once more through port-based selection.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tlvscope_core::protocol::test_utils::mle_keys;
use tlvscope_core::{builtin_registry, dissect, dissect_with, DissectOptions, Dissector, OscoreContext, Selector};

fuzz_target!(|data: &[u8]| {
    let Ok(registry) = builtin_registry() else {
        return;
    };
    let keys = mle_keys().with_oscore_context(
        OscoreContext::new(vec![1, 2, 3, 4, 5, 6, 7, 8], vec![]).with_ids(vec![], vec![0x01]),
    );

    for dissector in registry.all_dissectors() {
        let _ = dissect(registry, data, dissector.name(), None);
        let _ = dissect(registry, data, dissector.name(), Some(&keys));
    }

    for port in [701, 5683, 19788, 61631] {
        let options = DissectOptions::selected(Selector::udp(49152, port)).with_keys(Some(&keys));
        let _ = dissect_with(registry, data, &options);
    }
});
