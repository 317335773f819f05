//! Command-line argument definitions.

use std::net::Ipv6Addr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tlvscope_core::{ChecksumPolicy, DissectConfig, Selector};

use super::OutputFormat;

/// Checksum handling, mirrored from [`ChecksumPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChecksumMode {
    /// Do not compute checksums
    Ignore,
    /// Report mismatches as warnings
    Advisory,
    /// Reject frames with a bad checksum
    Mandatory,
}

impl From<ChecksumMode> for ChecksumPolicy {
    fn from(mode: ChecksumMode) -> Self {
        match mode {
            ChecksumMode::Ignore => ChecksumPolicy::Ignore,
            ChecksumMode::Advisory => ChecksumPolicy::Advisory,
            ChecksumMode::Mandatory => ChecksumPolicy::Mandatory,
        }
    }
}

/// Dissect hex-encoded protocol frames.
#[derive(Parser, Debug)]
#[command(name = "tlvscope")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Frames as hex strings; read one per line from stdin when omitted
    #[arg(value_name = "HEX")]
    pub frames: Vec<String>,

    /// Dissector to run (see --list-protocols)
    #[arg(short = 'p', long = "protocol", value_name = "NAME")]
    pub protocol: Option<String>,

    /// UDP source port, used to pick a dissector
    #[arg(long = "src-port", value_name = "PORT")]
    pub src_port: Option<u16>,

    /// UDP destination port, used to pick a dissector
    #[arg(long = "dst-port", value_name = "PORT")]
    pub dst_port: Option<u16>,

    /// IP protocol number, used to pick a dissector
    #[arg(long = "ip-protocol", value_name = "NUMBER")]
    pub ip_protocol: Option<u8>,

    /// Key file for MLE and OSCORE decryption.
    ///
    /// Format: one entry per line, e.g.:
    ///   thread-master <hex> [key-sequence]
    ///   oscore <master-secret> <master-salt> <sender-id> <recipient-id> [id-context]
    #[arg(short = 'k', long = "keys", value_name = "FILE")]
    pub keys: Option<PathBuf>,

    /// IPv6 source address of the frames (MLE AAD and nonce)
    #[arg(long = "src-addr", value_name = "IPV6")]
    pub src_addr: Option<Ipv6Addr>,

    /// IPv6 destination address of the frames (MLE AAD)
    #[arg(long = "dst-addr", value_name = "IPV6")]
    pub dst_addr: Option<Ipv6Addr>,

    /// 802.15.4 extended source address as 16 hex characters
    #[arg(long = "src-ext-addr", value_name = "HEX")]
    pub src_ext_addr: Option<String>,

    /// OSCORE request kid and partial IV for responses, as `<kid>:<piv>` hex
    #[arg(long = "oscore-request", value_name = "KID:PIV")]
    pub oscore_request: Option<String>,

    /// Original frame length when the capture was truncated
    #[arg(long = "reported-len", value_name = "BYTES")]
    pub reported_len: Option<usize>,

    /// Maximum nesting depth
    #[arg(long = "max-depth", default_value = "32")]
    pub max_depth: usize,

    /// Treat MIC and tag mismatches as errors
    #[arg(long = "strict")]
    pub strict: bool,

    /// Checksum validation
    #[arg(long = "checksums", value_enum, default_value = "advisory")]
    pub checksums: ChecksumMode,

    /// Output format for stdout
    #[arg(long = "format", value_enum, default_value = "tree")]
    pub format: OutputFormat,

    /// List registered dissectors and object tables
    #[arg(long = "list-protocols")]
    pub list_protocols: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn config(&self) -> DissectConfig {
        DissectConfig::default()
            .with_max_depth(self.max_depth)
            .strict(self.strict)
            .with_checksums(self.checksums.into())
    }

    /// Lower-layer hints from the port and protocol flags.
    pub fn selector(&self) -> Selector {
        let mut selector = Selector::new();
        if let Some(port) = self.src_port {
            selector.set_hint("src_port", u64::from(port));
        }
        if let Some(port) = self.dst_port {
            selector.set_hint("dst_port", u64::from(port));
        }
        if let Some(protocol) = self.ip_protocol {
            selector.set_hint("ip_protocol", u64::from(protocol));
        }
        selector
    }

    /// True when frames come from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: defaults
    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["tlvscope", "ff04"]).unwrap();
        assert_eq!(args.frames, vec!["ff04"]);
        assert_eq!(args.config(), DissectConfig::default());
        assert_eq!(args.format, OutputFormat::Tree);
        assert!(!args.reads_stdin());
    }

    // Test 2: selector and config flags
    #[test]
    fn test_selector_and_config() {
        let args = Args::try_parse_from([
            "tlvscope",
            "--dst-port",
            "19788",
            "--ip-protocol",
            "17",
            "--strict",
            "--checksums",
            "mandatory",
            "--max-depth",
            "4",
            "-vv",
        ])
        .unwrap();
        let selector = args.selector();
        assert!(selector.has_port(19788));
        assert_eq!(selector.hint("ip_protocol"), Some(17));
        assert_eq!(selector.hint("src_port"), None);

        let config = args.config();
        assert_eq!(config.max_depth, 4);
        assert!(config.strict_tag);
        assert_eq!(config.validate_checksums, ChecksumPolicy::Mandatory);
        assert_eq!(args.verbose, 2);
        assert!(args.reads_stdin());
    }

    // Test 3: addressing flags
    #[test]
    fn test_addresses() {
        let args = Args::try_parse_from(["tlvscope", "--src-addr", "fe80::1", "-p", "mle", "00"]).unwrap();
        assert_eq!(args.src_addr, Some(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)));
        assert_eq!(args.protocol.as_deref(), Some("mle"));
        assert!(Args::try_parse_from(["tlvscope", "--src-addr", "10.0.0.1"]).is_err());
    }
}
