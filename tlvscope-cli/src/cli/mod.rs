//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Key file loading
//! - Frame input from argv or stdin
//! - Output formatting (tree, paths)

mod args;
mod input;
mod keys;
mod output;

pub use args::{Args, ChecksumMode};
pub use input::{key_context, parse_frame};
pub use keys::{parse_hex, KeyFile, KeyFileError};
pub use output::{OutputFormat, OutputFormatter};
