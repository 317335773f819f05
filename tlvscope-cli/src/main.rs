//! tlvscope CLI entry point.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tlvscope_core::{builtin_registry, dissect_with, DissectOptions, Dissector, ObjectRegistry};
use tlvscope_cli::cli::{key_context, parse_frame, Args, OutputFormatter};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    let registry = builtin_registry().context("Failed to build protocol registry")?;

    if args.list_protocols {
        list_protocols(registry);
        return Ok(());
    }

    let keys = key_context(&args)?;
    let mut options = DissectOptions::selected(args.selector())
        .with_config(args.config())
        .with_keys(keys.as_ref());
    options.protocol = args.protocol.as_deref();
    if let Some(len) = args.reported_len {
        options = options.with_reported_len(len);
    }

    let formatter = OutputFormatter::new(args.format);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.reads_stdin() {
        let stdin = io::stdin();
        let mut frame_num = 0;
        for (line_num, line) in stdin.lock().lines().enumerate() {
            let line = line.context("Failed to read stdin")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            frame_num += 1;
            let frame = parse_frame(line).with_context(|| format!("stdin line {}", line_num + 1))?;
            run_frame(registry, &frame, frame_num, &options, &formatter, &mut out)?;
        }
    } else {
        for (i, text) in args.frames.iter().enumerate() {
            let frame = parse_frame(text).with_context(|| format!("argument {}", i + 1))?;
            run_frame(registry, &frame, i + 1, &options, &formatter, &mut out)?;
        }
    }

    Ok(())
}

fn run_frame<W: Write>(
    registry: &ObjectRegistry,
    frame: &[u8],
    frame_num: usize,
    options: &DissectOptions<'_>,
    formatter: &OutputFormatter,
    out: &mut W,
) -> Result<()> {
    let dissection = dissect_with(registry, frame, options);
    if let Some(error) = &dissection.error {
        tracing::debug!(frame = frame_num, %error, "frame rejected");
    }
    writeln!(out, "# frame {frame_num} ({} bytes)", frame.len())?;
    formatter.write_dissection(&dissection, out)?;
    Ok(())
}

fn list_protocols(registry: &ObjectRegistry) {
    println!("Registered Dissectors:");
    println!("{:-<50}", "");
    for dissector in registry.all_dissectors() {
        println!("  {} ({})", dissector.display_name(), dissector.name());
    }

    println!();
    println!("Object Tables:");
    println!("{:-<50}", "");
    for name in registry.table_names() {
        println!("  {name}");
    }
}
