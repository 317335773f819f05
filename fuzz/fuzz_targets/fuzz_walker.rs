//! Fuzz target for the object walker.
//!
//! The first byte picks one registered object table; the rest is walked
//! directly, bypassing dissector headers:
//! - header decoding for every layout
//! - declared-length and alignment bounds
//! - terminator and trailing-slack handling

#![no_main]

use libfuzzer_sys::fuzz_target;
use tlvscope_core::{builtin_registry, AesCcmStar, ByteCursor, DecodeCtx, DissectConfig, Selector};

fuzz_target!(|data: &[u8]| {
    let Some((&pick, body)) = data.split_first() else {
        return;
    };
    let Ok(registry) = builtin_registry() else {
        return;
    };
    let names = registry.table_names();
    let name = names[usize::from(pick) % names.len()];

    let config = DissectConfig::default().with_max_depth(8);
    let selector = Selector::new();
    let mut ctx = DecodeCtx::new(registry, &config, None, &AesCcmStar, &selector);
    let outcome = ctx.walk(name, ByteCursor::new(body));

    assert!(outcome.end <= body.len());
    assert_eq!(ctx.depth(), 0);
});
