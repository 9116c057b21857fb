//! `RENPY RPC2` envelope: magic, slot table, zlib payload.

use std::{
    fs,
    io::{self, Cursor, Read},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use thiserror::Error;
use tracing::debug;

/// File magic.
pub const MAGIC: &[u8; 10] = b"RENPY RPC2";

/// Slot holding the pickled script.
pub const PAYLOAD_SLOT: u32 = 1;

/// Slot number that ends the table.
pub const END_SLOT: u32 = 0;

/// Bytes per slot record.
pub const RECORD_LEN: usize = 12;

/// Upper bound on an inflated payload or archive index.
pub const MAX_INFLATED: u64 = 512 * 1024 * 1024;

/// Result alias for envelope operations.
pub type FormatResult<T> = std::result::Result<T, FormatError>;

/// Envelope failures. All of them are fatal for the file.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The first 10 bytes are not `RENPY RPC2`.
    #[error("not a compiled Ren'Py script (bad magic)")]
    BadMagic,
    /// The slot table ended (or was truncated) before slot 1.
    #[error("no payload slot in the record table")]
    NoPayloadSlot,
    /// The payload range leaves the file.
    #[error("slot {slot} range {start}+{length} exceeds file size {size}")]
    SlotOutOfBounds {
        /// Slot number.
        slot: u32,
        /// Start offset.
        start: u32,
        /// Declared length.
        length: u32,
        /// Actual file size.
        size: usize,
    },
    /// zlib inflate failed.
    #[error("corrupt payload: {0}")]
    Corrupt(String),
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One `{slot, start, length}` record of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRecord {
    /// Slot number (1 = script payload).
    pub slot: u32,
    /// Absolute start offset.
    pub start: u32,
    /// Compressed length.
    pub length: u32,
}

/// A parsed envelope: the records scanned up to the payload and the inflated payload.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Records read, in file order, ending with the payload record.
    pub slots: Vec<SlotRecord>,
    /// Inflated slot-1 bytes (a pickle stream).
    pub payload: Vec<u8>,
}

/// True when `data` starts with the envelope magic.
pub fn is_envelope(data: &[u8]) -> bool { data.starts_with(MAGIC) }

impl Envelope {
    /// Parses and inflates an in-memory envelope.
    pub fn from_bytes(data: &[u8]) -> FormatResult<Self> {
        if !is_envelope(data) {
            return Err(FormatError::BadMagic);
        }

        let mut cur = Cursor::new(&data[MAGIC.len()..]);
        let mut slots = Vec::new();
        let record = loop {
            let rec = read_record(&mut cur).ok_or(FormatError::NoPayloadSlot)?;
            slots.push(rec);
            match rec.slot {
                PAYLOAD_SLOT => break rec,
                END_SLOT => return Err(FormatError::NoPayloadSlot),
                _ => {}
            }
        };

        let start = record.start as usize;
        let end = start
            .checked_add(record.length as usize)
            .filter(|&end| end <= data.len())
            .ok_or(FormatError::SlotOutOfBounds {
                slot: record.slot,
                start: record.start,
                length: record.length,
                size: data.len(),
            })?;

        let payload = inflate(&data[start..end])?;
        debug!(records = slots.len(), compressed = record.length, inflated = payload.len(), "envelope payload inflated");
        Ok(Self { slots, payload })
    }

    /// Reads and parses an envelope from disk.
    pub fn read_file(path: impl AsRef<Path>) -> FormatResult<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(&data)
    }
}

fn read_record(cur: &mut Cursor<&[u8]>) -> Option<SlotRecord> {
    let slot = cur.read_u32::<LittleEndian>().ok()?;
    let start = cur.read_u32::<LittleEndian>().ok()?;
    let length = cur.read_u32::<LittleEndian>().ok()?;
    Some(SlotRecord { slot, start, length })
}

pub(crate) fn inflate(bytes: &[u8]) -> FormatResult<Vec<u8>> { inflate_limited(bytes, MAX_INFLATED) }

fn inflate_limited(bytes: &[u8], limit: u64) -> FormatResult<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4));
    ZlibDecoder::new(bytes)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| FormatError::Corrupt(e.to_string()))?;
    if out.len() as u64 > limit {
        return Err(FormatError::Corrupt(format!("inflates past {limit} bytes")));
    }
    Ok(out)
}

/* ─────────────────────────── Writer ─────────────────────────── */

#[cfg(feature = "writer")]
pub use writer::EnvelopeWriter;

#[cfg(feature = "writer")]
mod writer {
    use std::io::Write;

    use byteorder::{LittleEndian, WriteBytesExt};
    use flate2::{write::ZlibEncoder, Compression};

    use super::{FormatResult, END_SLOT, MAGIC, PAYLOAD_SLOT, RECORD_LEN};

    /// Builds envelopes; slots are deflated in insertion order.
    #[derive(Debug, Clone, Default)]
    pub struct EnvelopeWriter {
        slots: Vec<(u32, Vec<u8>)>,
    }

    impl EnvelopeWriter {
        /// Empty writer.
        pub fn new() -> Self { Self::default() }

        /// Adds a slot holding `payload` (stored compressed).
        pub fn slot(mut self, slot: u32, payload: &[u8]) -> Self {
            self.slots.push((slot, payload.to_vec()));
            self
        }

        /// Single-payload envelope, the shape Ren'Py writes for scripts.
        pub fn wrap(payload: &[u8]) -> FormatResult<Vec<u8>> { Self::new().slot(PAYLOAD_SLOT, payload).to_bytes() }

        /// Serialises magic, record table (with terminator) and slot data.
        pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
            let mut blobs = Vec::with_capacity(self.slots.len());
            for (slot, payload) in &self.slots {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(payload)?;
                blobs.push((*slot, enc.finish()?));
            }

            let mut out = Vec::new();
            out.extend_from_slice(MAGIC);
            let mut start = MAGIC.len() + RECORD_LEN * (blobs.len() + 1);
            for (slot, blob) in &blobs {
                out.write_u32::<LittleEndian>(*slot)?;
                out.write_u32::<LittleEndian>(start as u32)?;
                out.write_u32::<LittleEndian>(blob.len() as u32)?;
                start += blob.len();
            }
            out.write_u32::<LittleEndian>(END_SLOT)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(0)?;
            for (_, blob) in &blobs {
                out.extend_from_slice(blob);
            }
            Ok(out)
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn raw_envelope(records: &[(u32, u32, u32)], tail: &[u8]) -> Vec<u8> {
        let mut v = MAGIC.to_vec();
        for (s, a, l) in records {
            v.extend_from_slice(&s.to_le_bytes());
            v.extend_from_slice(&a.to_le_bytes());
            v.extend_from_slice(&l.to_le_bytes());
        }
        v.extend_from_slice(tail);
        v
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(Envelope::from_bytes(b"RENPY RPC1...."), Err(FormatError::BadMagic)));
        assert!(matches!(Envelope::from_bytes(b""), Err(FormatError::BadMagic)));
    }

    #[test]
    fn table_without_payload_slot() {
        let data = raw_envelope(&[(2, 0, 0), (0, 0, 0)], b"");
        assert!(matches!(Envelope::from_bytes(&data), Err(FormatError::NoPayloadSlot)));

        // records run out mid-record
        let mut data = raw_envelope(&[(2, 0, 0)], b"");
        data.extend_from_slice(&[1, 0, 0]);
        assert!(matches!(Envelope::from_bytes(&data), Err(FormatError::NoPayloadSlot)));
    }

    #[test]
    fn payload_range_is_checked() {
        let data = raw_envelope(&[(1, 10, 4096)], b"");
        assert!(matches!(Envelope::from_bytes(&data), Err(FormatError::SlotOutOfBounds { slot: 1, .. })));
    }

    #[test]
    fn inflate_stops_at_the_limit() {
        use std::io::Write;

        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        enc.write_all(&[0; 4096]).unwrap_or_else(|e| panic!("{e}"));
        let bomb = enc.finish().unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(inflate_limited(&bomb, 4096).map(|v| v.len()).ok(), Some(4096));
        assert!(matches!(inflate_limited(&bomb, 1024), Err(FormatError::Corrupt(msg)) if msg.contains("1024")));
    }

    #[test]
    fn garbage_payload_is_corrupt() {
        let data = raw_envelope(&[(1, 22, 4)], b"abcd");
        assert!(matches!(Envelope::from_bytes(&data), Err(FormatError::Corrupt(_))));
    }

    #[cfg(feature = "writer")]
    #[test]
    fn writer_output_is_readable() -> FormatResult<()> {
        let bytes = EnvelopeWriter::new().slot(2, b"other").slot(PAYLOAD_SLOT, b"payload").to_bytes()?;
        assert!(is_envelope(&bytes));
        let env = Envelope::from_bytes(&bytes)?;
        assert_eq!(env.payload, b"payload".to_vec());
        assert_eq!(env.slots.iter().map(|s| s.slot).collect::<Vec<_>>(), vec![2, 1]);
        Ok(())
    }
}
