//! # tlvscope-cli
//!
//! Command-line front end for tlvscope-core: reads hex frames, loads key
//! material and prints the decoded trees.

pub mod cli;
