//! Frame and key-material input.

use anyhow::{bail, Context, Result};
use tlvscope_core::{KeyContext, PacketInfo};

use super::keys::{parse_hex, KeyFile};
use super::Args;

/// Decode one frame given as hex; whitespace and `:` separators are ignored.
pub fn parse_frame(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if digits.is_empty() || digits == "-" {
        bail!("empty frame");
    }
    parse_hex(&digits, 0).map_err(|e| anyhow::anyhow!("invalid frame '{text}': {e}"))
}

/// Key material from the key file and addressing flags, if any was given.
pub fn key_context(args: &Args) -> Result<Option<KeyContext>> {
    let has_packet = args.src_addr.is_some() || args.dst_addr.is_some() || args.src_ext_addr.is_some();
    if args.keys.is_none() && args.oscore_request.is_none() && !has_packet {
        return Ok(None);
    }

    let mut context = KeyContext::new();
    if let Some(path) = &args.keys {
        let file = KeyFile::from_file(path).with_context(|| format!("Failed to load key file: {}", path.display()))?;
        tracing::info!(entries = file.entry_count(), path = %path.display(), "loaded keys");
        context = file.apply(context);
    }

    let src_ext_addr = match &args.src_ext_addr {
        Some(hex) => {
            let bytes = parse_hex(hex, 0).context("Invalid --src-ext-addr")?;
            let addr = <[u8; 8]>::try_from(bytes.as_slice())
                .map_err(|_| anyhow::anyhow!("--src-ext-addr must be 8 bytes, got {}", bytes.len()))?;
            Some(addr)
        }
        None => None,
    };
    context = context.with_packet(PacketInfo {
        src_addr: args.src_addr,
        dst_addr: args.dst_addr,
        src_ext_addr,
    });

    if let Some(binding) = &args.oscore_request {
        let (kid, piv) = binding
            .split_once(':')
            .context("--oscore-request must be <kid>:<piv>")?;
        let kid = parse_hex(kid, 0).context("Invalid OSCORE request kid")?;
        let piv = parse_hex(piv, 0).context("Invalid OSCORE request partial IV")?;
        context = context.with_oscore_request(kid, piv);
    }

    Ok(Some(context))
}
