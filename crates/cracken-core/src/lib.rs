//! cracken-core — shared primitives for the cracken decompiler
//!
//! Provides:
//! - `Location` (file + line of a reconstructed statement)
//! - `ByteReader`, the cursor the pickle decoder reads opcodes and arguments with
//! - `CoreError` + alias `CoreResult<T>`
//! - [`pickle`]: the restricted, allow-listed pickle decoder and a tiny assembler
//!
//! Features:
//! - `serde` (default): derive (de)serialisation on `Location` and `ClassTag`

#![deny(missing_docs)]
#![forbid(unsafe_code)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::fmt;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Public modules ─────────────────────────── */

/// Restricted pickle decoder (value graph, allow-list, opcodes, assembler).
pub mod pickle;

/* ─────────────────────────── Common result ─────────────────────────── */

/// Result alias shared by the byte-level helpers.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/* ─────────────────────────── Locations ─────────────────────────── */

/// Source location carried by compiled statements (`(filename, line)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    /// Script file the statement was compiled from.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

impl Location {
    /// Builds a location.
    pub fn new(file: impl Into<String>, line: u32) -> Self { Self { file: file.into(), line } }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.file, self.line) }
}

/* ─────────────────────────── Byte Reader ─────────────────────────── */

/// Cursor over a pickle stream. Multi-byte integers are little-endian;
/// `BINFLOAT` is the one big-endian field.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> usize { self.off }

    /// Next `n` bytes. Lengths are checked against the buffer before any
    /// allocation happens.
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self.off.checked_add(n).filter(|&end| end <= self.data.len()).ok_or(CoreError::UnexpectedEof {
            needed: n as u64,
            at: self.off as u64,
        })?;
        let bytes = &self.data[self.off..end];
        self.off = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// One byte.
    pub fn read_u8(&mut self) -> CoreResult<u8> { self.array::<1>().map(|[b]| b) }
    /// `BININT2` argument.
    pub fn read_u16_le(&mut self) -> CoreResult<u16> { self.array().map(u16::from_le_bytes) }
    /// Length and memo-id arguments.
    pub fn read_u32_le(&mut self) -> CoreResult<u32> { self.array().map(u32::from_le_bytes) }
    /// `BININT` and `LONG4` arguments.
    pub fn read_i32_le(&mut self) -> CoreResult<i32> { self.array().map(i32::from_le_bytes) }
    /// `FRAME` sizes.
    pub fn read_u64_le(&mut self) -> CoreResult<u64> { self.array().map(u64::from_le_bytes) }
    /// `BINFLOAT` argument.
    pub fn read_f64_be(&mut self) -> CoreResult<f64> { self.array().map(f64::from_be_bytes) }

    /// 8-byte length prefix that must fit in `usize`.
    pub fn read_len_u64_le(&mut self) -> CoreResult<usize> {
        let at = self.off as u64;
        let len = self.read_u64_le()?;
        usize::try_from(len).map_err(|_| CoreError::LengthOverflow { len, at })
    }

    /// Bytes up to the next `\n`, which is consumed but not returned.
    pub fn read_line(&mut self) -> CoreResult<&'a [u8]> {
        let rest = &self.data[self.off..];
        let pos = rest.iter().position(|&b| b == b'\n').ok_or(CoreError::UnexpectedEof { needed: 1, at: self.data.len() as u64 })?;
        self.off += pos + 1;
        Ok(&rest[..pos])
    }
}

/* ─────────────────────────── Errors ─────────────────────────── */

/// Failures of [`ByteReader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The stream ended inside a field.
    #[error("unexpected end of stream: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Bytes that were requested.
        needed: u64,
        /// Offset where the read started.
        at: u64,
    },
    /// A 64-bit length does not fit this platform.
    #[error("length {len} at {at} does not fit in memory")]
    LengthOverflow {
        /// Declared length.
        len: u64,
        /// Offset of the length field.
        at: u64,
    },
}

/* ─────────────────────────── Prelude ─────────────────────────── */

/// Convenience re-exports.
pub mod prelude {
    /// Frequently used items.
    pub use super::{
        pickle::{loads, AllowList, ClassTag, DecodeError, PickleError, PickleResult, SecurityError, Value},
        ByteReader, CoreError, CoreResult, Location,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_pickle_argument_layouts() -> CoreResult<()> {
        let mut data = Vec::new();
        data.extend_from_slice(&0xBEEF_u16.to_le_bytes());
        data.extend_from_slice(&(-42_i32).to_le_bytes());
        data.extend_from_slice(&3.5_f64.to_be_bytes());
        data.extend_from_slice(b"line\nrest");

        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16_le()?, 0xBEEF);
        assert_eq!(r.read_i32_le()?, -42);
        assert_eq!(r.read_f64_be()?, 3.5);
        assert_eq!(r.read_line()?, b"line");
        assert_eq!(r.read_bytes(4)?, b"rest");
        assert_eq!(r.offset(), data.len());
        Ok(())
    }

    #[test]
    fn oversized_length_does_not_wrap() {
        let mut r = ByteReader::new(b"ab");
        assert_eq!(r.read_bytes(usize::MAX), Err(CoreError::UnexpectedEof { needed: usize::MAX as u64, at: 0 }));
        assert_eq!(r.read_u8(), Ok(b'a'));
    }

    #[test]
    fn eof_is_reported_with_offset() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(r.read_u32_le(), Err(CoreError::UnexpectedEof { needed: 4, at: 0 }));
        assert!(r.read_line().is_err());
    }

    #[test]
    fn location_display() {
        assert_eq!(Location::new("game/script.rpy", 12).to_string(), "game/script.rpy:12");
    }
}
