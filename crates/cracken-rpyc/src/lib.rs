//! cracken-rpyc — Ren'Py container formats
//!
//! Formats:
//! ```text
//! Envelope (.rpyc / .rpymc):
//!   "RENPY RPC2" (10 bytes)
//!   [record*]  record = slot u32 LE + start u32 LE + length u32 LE
//!   slot 1 = zlib(pickle(script)), slot 0 = end of table
//!
//! Archive (.rpa):
//!   "RPA-2.0 " + offset (16 hex)                     + "\n"
//!   "RPA-3.0 " + offset (16 hex) + " " + key (8 hex) + "\n"
//!   member data ...
//!   zlib(pickle({name: [(offset, length[, prefix])]})) at offset
//!
//! Split archive (RPA-1.0):
//!   NAME.rpi = zlib(pickle(index)), offsets into NAME.rpa (no header)
//! ```
//!
//! API:
//! - [`Envelope::from_bytes`] / [`Envelope::read_file`], [`is_envelope`]
//! - [`is_archive`], [`is_split_index`], [`Archive::from_bytes`] / [`Archive::from_split`] / [`Archive::read_file`],
//!   [`Archive::member`], [`Archive::extract_to`]
//! - `EnvelopeWriter` / `ArchiveWriter` (feature `writer`) to build fixtures

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod envelope;

pub use archive::{is_archive, is_split_index, split_data_path, Archive, ArchiveError, ArchiveResult, ArchiveVersion, IndexEntry};
pub use envelope::{is_envelope, Envelope, FormatError, FormatResult, SlotRecord, MAGIC};

#[cfg(feature = "writer")]
pub use archive::ArchiveWriter;
#[cfg(feature = "writer")]
pub use envelope::EnvelopeWriter;
