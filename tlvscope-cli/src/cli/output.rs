//! Output formatting for dissection trees.

use std::fmt::Write as _;
use std::io::{self, Write};

use clap::ValueEnum;
use tlvscope_core::{DecodedObject, DecodedValue, Dissection};

/// Output format for stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree, one node per line
    #[default]
    Tree,
    /// Flat `dotted.path = value` lines
    Paths,
}

/// Formats dissection results for display.
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Write one dissection, followed by its fatal error if any.
    pub fn write_dissection<W: Write>(&self, dissection: &Dissection, writer: &mut W) -> io::Result<()> {
        match self.format {
            OutputFormat::Tree => write_tree(&dissection.root, 0, writer)?,
            OutputFormat::Paths => write_paths(&dissection.root, &mut String::new(), writer)?,
        }
        if let Some(error) = &dissection.error {
            writeln!(writer, "error: {error}")?;
        }
        Ok(())
    }
}

fn write_tree<W: Write>(node: &DecodedObject, depth: usize, writer: &mut W) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    let mut label = node.name.to_string();
    for (name, value) in &node.attributes {
        let _ = write!(label, " [{name}={value}]");
    }
    match format_value(&node.value) {
        Some(value) => writeln!(writer, "{indent}{label}: {value}")?,
        None => writeln!(writer, "{indent}{label}")?,
    }
    for warning in &node.warnings {
        writeln!(writer, "{indent}  ! {warning}")?;
    }
    for child in node.children() {
        write_tree(child, depth + 1, writer)?;
    }
    Ok(())
}

fn write_paths<W: Write>(node: &DecodedObject, prefix: &mut String, writer: &mut W) -> io::Result<()> {
    let len = prefix.len();
    if !prefix.is_empty() {
        prefix.push('.');
    }
    prefix.push_str(node.name);

    if let Some(value) = format_value(&node.value) {
        writeln!(writer, "{prefix} = {value}")?;
    }
    for (name, value) in &node.attributes {
        writeln!(writer, "{prefix}@{name} = {value}")?;
    }
    for warning in &node.warnings {
        writeln!(writer, "{prefix} ! {warning}")?;
    }
    for child in node.children() {
        write_paths(child, prefix, writer)?;
    }

    prefix.truncate(len);
    Ok(())
}

/// Rendered value of a leaf; `None` for composites.
fn format_value(value: &DecodedValue) -> Option<String> {
    let text = match value {
        DecodedValue::Scalar(v) => format!("{v} (0x{v:x})"),
        DecodedValue::Float(v) => format!("{v}"),
        DecodedValue::Text(s) => format!("{s:?}"),
        DecodedValue::Address(addr) => addr.to_string(),
        DecodedValue::Bitfield(flags) => {
            let set: Vec<_> = flags.iter().filter(|(_, on)| *on).map(|(name, _)| *name).collect();
            format!("[{}]", set.join(", "))
        }
        DecodedValue::Bytes(raw) => hex(raw),
        DecodedValue::Composite(_) => return None,
        DecodedValue::Unknown { type_code, raw } => format!("type {type_code}, {}", hex(raw)),
        DecodedValue::Aborted { error, raw } => format!("<{error}> {}", hex(raw)),
    };
    Some(text)
}

fn hex(raw: &[u8]) -> String {
    if raw.is_empty() {
        return "(empty)".to_string();
    }
    let mut out = String::with_capacity(raw.len() * 2);
    for byte in raw {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
