//! Raw binary program images.
//!
//! A program image is a flat sequence of 32-bit instruction words with no
//! header. Words are little-endian unless stated otherwise. The register
//! output artifact uses the same layout: 32 little-endian words, x0 first.

use crate::cpu::Registers;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default file name for the register output artifact.
pub const DEFAULT_OUTPUT: &str = "out.res";

/// Byte order of the words in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Split `bytes` into 32-bit words.
pub fn parse_words(bytes: &[u8], endianness: Endianness) -> Result<Vec<u32>, ImageError> {
    if bytes.len() % 4 != 0 {
        return Err(ImageError::Truncated { len: bytes.len() });
    }

    let words = bytes
        .chunks_exact(4)
        .map(|c| {
            let b = [c[0], c[1], c[2], c[3]];
            match endianness {
                Endianness::Little => u32::from_le_bytes(b),
                Endianness::Big => u32::from_be_bytes(b),
            }
        })
        .collect();

    Ok(words)
}

/// Serialize words as little-endian bytes.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Reverse the byte order of every 32-bit word in `bytes`.
pub fn convert_endianness(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    if bytes.len() % 4 != 0 {
        return Err(ImageError::Truncated { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(4)
        .flat_map(|c| [c[3], c[2], c[1], c[0]])
        .collect())
}

/// Accept `s` as a program path only if it names a `.bin` file.
pub fn parse_bin_path(s: &str) -> Result<PathBuf, ImageError> {
    if s.ends_with(".bin") {
        Ok(PathBuf::from(s))
    } else {
        Err(ImageError::NotBinary(s.to_string()))
    }
}

/// Load a program image from disk.
pub fn load_program<P: AsRef<Path>>(path: P, endianness: Endianness) -> Result<Vec<u32>, ImageError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| ImageError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
    parse_words(&bytes, endianness)
}

/// Encode the register file as 32 little-endian words.
pub fn encode_registers(regs: &Registers) -> Vec<u8> {
    words_to_bytes(regs.as_array())
}

/// Write the register file to disk.
pub fn save_registers<P: AsRef<Path>>(path: P, regs: &Registers) -> Result<(), ImageError> {
    std::fs::write(path.as_ref(), encode_registers(regs))
        .map_err(|e| ImageError::Io(format!("{}: {}", path.as_ref().display(), e)))
}

/// Render words as decimal numbers joined by `separator`.
pub fn dump_words(words: &[u32], separator: &str) -> String {
    words
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("image is {len} bytes long, not a whole number of 32-bit words")]
    Truncated { len: usize },

    #[error("expected a .bin file, got '{0}'")]
    NotBinary(String),
}
