//! Key file parser.
//!
//! One entry per line; `#` starts a comment. Hex fields take `-` for an
//! empty byte string.
//!
//! ```text
//! thread-master <master-key-hex> [key-sequence]
//! oscore <master-secret> <master-salt> <sender-id> <recipient-id> [id-context]
//! key <raw-key-hex> [key-id]
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;
use tlvscope_core::{CandidateKey, KeyContext, OscoreContext};

/// Errors that can occur when parsing a key file.
#[derive(Debug, Error)]
pub enum KeyFileError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid hex string
    #[error("Invalid hex at line {line}: {message}")]
    InvalidHex { line: usize, message: String },

    /// Wrong field count or an unparsable number
    #[error("Invalid format at line {line}: {message}")]
    InvalidFormat { line: usize, message: String },

    /// Unknown entry keyword
    #[error("Unknown key type at line {line}: {key_type}")]
    UnknownKeyType { line: usize, key_type: String },
}

/// Key material loaded from a file, ready to be merged into a [`KeyContext`].
#[derive(Debug, Clone, Default)]
pub struct KeyFile {
    pub master_keys: Vec<([u8; 16], u32)>,
    pub oscore_contexts: Vec<OscoreContext>,
    pub raw_keys: Vec<CandidateKey>,
}

impl KeyFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyFileError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse(content: &str) -> Result<Self, KeyFileError> {
        Self::from_reader(content.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, KeyFileError> {
        let reader = BufReader::new(reader);
        let mut keys = KeyFile::default();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line_num = line_num + 1;

            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            keys.parse_line(line, line_num)?;
        }

        Ok(keys)
    }

    pub fn entry_count(&self) -> usize {
        self.master_keys.len() + self.oscore_contexts.len() + self.raw_keys.len()
    }

    /// Add every loaded key to `context`.
    pub fn apply(&self, mut context: KeyContext) -> KeyContext {
        for key in &self.raw_keys {
            context = context.with_candidate_key(key.clone());
        }
        for (key, sequence) in &self.master_keys {
            context = context.with_master_key(*key, *sequence);
        }
        for oscore in &self.oscore_contexts {
            context = context.with_oscore_context(oscore.clone());
        }
        context
    }

    fn parse_line(&mut self, line: &str, line_num: usize) -> Result<(), KeyFileError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let arity = |min: usize, max: usize| {
            if parts.len() < min || parts.len() > max {
                Err(KeyFileError::InvalidFormat {
                    line: line_num,
                    message: format!("{} expects {} to {} fields, got {}", parts[0], min - 1, max - 1, parts.len() - 1),
                })
            } else {
                Ok(())
            }
        };

        match parts[0] {
            "thread-master" => {
                arity(2, 3)?;
                let bytes = parse_hex(parts[1], line_num)?;
                let key = <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| KeyFileError::InvalidHex {
                    line: line_num,
                    message: format!("expected 32 hex characters, got {}", parts[1].len()),
                })?;
                let sequence = match parts.get(2) {
                    Some(seq) => parse_number(seq, line_num)?,
                    None => 0,
                };
                self.master_keys.push((key, sequence));
            }
            "oscore" => {
                arity(5, 6)?;
                let mut context = OscoreContext::new(parse_hex(parts[1], line_num)?, parse_hex(parts[2], line_num)?)
                    .with_ids(parse_hex(parts[3], line_num)?, parse_hex(parts[4], line_num)?);
                if let Some(id_context) = parts.get(5) {
                    context = context.with_id_context(parse_hex(id_context, line_num)?);
                }
                self.oscore_contexts.push(context);
            }
            "key" => {
                arity(2, 3)?;
                let key_id = match parts.get(2) {
                    Some(id) => parse_number(id, line_num)?,
                    None => 0,
                };
                self.raw_keys.push(CandidateKey::new(parse_hex(parts[1], line_num)?, key_id));
            }
            other => {
                return Err(KeyFileError::UnknownKeyType {
                    line: line_num,
                    key_type: other.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn parse_number(s: &str, line: usize) -> Result<u32, KeyFileError> {
    s.parse::<u32>().map_err(|e| KeyFileError::InvalidFormat {
        line,
        message: format!("invalid number '{s}': {e}"),
    })
}

/// Parse a hex string; `-` is the empty string.
pub fn parse_hex(hex: &str, line: usize) -> Result<Vec<u8>, KeyFileError> {
    if hex == "-" {
        return Ok(Vec::new());
    }
    if hex.len() % 2 != 0 {
        return Err(KeyFileError::InvalidHex {
            line,
            message: "hex string has odd length".to_string(),
        });
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let mut chars = hex.chars();
    while let (Some(h), Some(l)) = (chars.next(), chars.next()) {
        let digit = |c: char| {
            c.to_digit(16).map(|d| d as u8).ok_or_else(|| KeyFileError::InvalidHex {
                line,
                message: format!("invalid hex character: {c}"),
            })
        };
        bytes.push(digit(h)? << 4 | digit(l)?);
    }

    Ok(bytes)
}
