//! RPA archives: header, pickled index, member extraction.
//!
//! RPA-2.0 and RPA-3.0 keep header, data and index in one `.rpa` file.
//! RPA-1.0 splits them: a bare compressed index in `.rpi` and the member data
//! in the `.rpa` file next to it.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Component, Path, PathBuf},
};

use cracken_core::pickle::{loads, AllowList, PickleError, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::{inflate, FormatError};

const V1_HEADER: &[u8] = b"\x78\x9c";
const V2_HEADER: &[u8] = b"RPA-2.0 ";
const V3_HEADER: &[u8] = b"RPA-3.0 ";

/// Result alias for archive operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Archive failures.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Neither `RPA-2.0 ` nor `RPA-3.0 `.
    #[error("unknown archive header")]
    UnknownHeader,
    /// An RPA-1.0 index given without its data file.
    #[error("RPA-1.0 index needs its .rpa data file")]
    DetachedIndex,
    /// The data file of an RPA-1.0 index could not be read.
    #[error("reading archive data {}: {source}", path.display())]
    MissingData {
        /// Expected data file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Recognised header with unparsable fields.
    #[error("bad archive header: {0}")]
    BadHeader(String),
    /// Index failed to inflate.
    #[error("corrupt archive index: {0}")]
    Corrupt(String),
    /// Index pickle rejected by the decoder.
    #[error("archive index: {0}")]
    Index(#[from] PickleError),
    /// Index entry of an unexpected shape.
    #[error("bad index entry for {name:?}: {reason}")]
    BadEntry {
        /// Member name.
        name: String,
        /// What was wrong.
        reason: String,
    },
    /// Member range outside the archive.
    #[error("member {name:?} range {offset}+{length} exceeds archive size {size}")]
    OutOfBounds {
        /// Member name.
        name: String,
        /// Start offset.
        offset: u64,
        /// Length.
        length: u64,
        /// Archive size.
        size: usize,
    },
    /// No such member.
    #[error("no member named {0:?}")]
    NotFound(String),
    /// Member name would escape the extraction directory.
    #[error("refusing unsafe member path {0:?}")]
    UnsafePath(String),
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<FormatError> for ArchiveError {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Io(e) => ArchiveError::Io(e),
            other => ArchiveError::Corrupt(other.to_string()),
        }
    }
}

/// Archive layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveVersion {
    /// `RPA-1.0`: `.rpi` index, data in the sibling `.rpa`.
    V1,
    /// `RPA-2.0`: plain offsets.
    V2,
    /// `RPA-3.0`: offsets and lengths XORed with `key`.
    V3 {
        /// Obfuscation key.
        key: u32,
    },
}

/// One index record of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute data offset.
    pub offset: u64,
    /// Stored length, prefix included.
    pub length: u64,
    /// Leading bytes kept in the index instead of the data area.
    pub prefix: Vec<u8>,
}

/// A parsed archive holding its bytes and decoded index.
#[derive(Debug, Clone)]
pub struct Archive {
    version: ArchiveVersion,
    data: Vec<u8>,
    index: BTreeMap<String, Vec<IndexEntry>>,
}

/// True when `data` starts with a supported archive header.
pub fn is_archive(data: &[u8]) -> bool { data.starts_with(V2_HEADER) || data.starts_with(V3_HEADER) }

/// True when `data` looks like an RPA-1.0 `.rpi` index (a default-level zlib stream).
pub fn is_split_index(data: &[u8]) -> bool { data.starts_with(V1_HEADER) }

/// Data file belonging to the RPA-1.0 index at `index`.
pub fn split_data_path(index: &Path) -> PathBuf { index.with_extension("rpa") }

impl Archive {
    /// Parses the header and decodes the index.
    pub fn from_bytes(data: Vec<u8>) -> ArchiveResult<Self> {
        if is_split_index(&data) {
            return Err(ArchiveError::DetachedIndex);
        }
        let (version, index_offset) = parse_header(&data)?;
        let start = usize::try_from(index_offset)
            .ok()
            .filter(|&s| s <= data.len())
            .ok_or_else(|| ArchiveError::BadHeader(format!("index offset {index_offset} past end of file")))?;

        let index = decode_index(&data[start..], version)?;
        Ok(Self { version, data, index })
    }

    /// RPA-1.0 archive from its `.rpi` index and `.rpa` data bytes.
    pub fn from_split(index: &[u8], data: Vec<u8>) -> ArchiveResult<Self> {
        let index = decode_index(index, ArchiveVersion::V1)?;
        Ok(Self { version: ArchiveVersion::V1, data, index })
    }

    /// Reads an archive from disk. An RPA-1.0 index pulls in its data file.
    pub fn read_file(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        if !is_split_index(&bytes) {
            return Self::from_bytes(bytes);
        }
        let data_path = split_data_path(path);
        let data = fs::read(&data_path).map_err(|source| ArchiveError::MissingData { path: data_path, source })?;
        Self::from_split(&bytes, data)
    }

    /// Layout version.
    pub fn version(&self) -> ArchiveVersion { self.version }
    /// Member names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> { self.index.keys().map(String::as_str) }
    /// Number of members.
    pub fn len(&self) -> usize { self.index.len() }
    /// True for an empty index.
    pub fn is_empty(&self) -> bool { self.index.is_empty() }
    /// Raw index entries.
    pub fn entries(&self, name: &str) -> Option<&[IndexEntry]> { self.index.get(name).map(Vec::as_slice) }

    /// Contents of `name`: prefix bytes followed by the stored range.
    pub fn member(&self, name: &str) -> ArchiveResult<Vec<u8>> {
        let entry = self
            .index
            .get(name)
            .and_then(|v| v.first())
            .ok_or_else(|| ArchiveError::NotFound(name.to_owned()))?;

        let body_len = entry.length.checked_sub(entry.prefix.len() as u64).ok_or_else(|| ArchiveError::BadEntry {
            name: name.to_owned(),
            reason: "prefix longer than member".into(),
        })?;
        let out_of_bounds = || ArchiveError::OutOfBounds {
            name: name.to_owned(),
            offset: entry.offset,
            length: body_len,
            size: self.data.len(),
        };
        let start = usize::try_from(entry.offset).map_err(|_| out_of_bounds())?;
        let end = usize::try_from(body_len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= self.data.len())
            .ok_or_else(out_of_bounds)?;

        let mut out = Vec::with_capacity(entry.prefix.len() + (end - start));
        out.extend_from_slice(&entry.prefix);
        out.extend_from_slice(&self.data[start..end]);
        Ok(out)
    }

    /// Writes every member under `dir` and returns the written paths.
    pub fn extract_to(&self, dir: impl AsRef<Path>) -> ArchiveResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut written = Vec::with_capacity(self.index.len());
        for name in self.index.keys() {
            let rel = safe_relative(name)?;
            let bytes = self.member(name)?;
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)?;
            debug!(member = %name, path = %path.display(), "member extracted");
            written.push(path);
        }
        Ok(written)
    }
}

/// Rejects absolute names and `..` components.
fn safe_relative(name: &str) -> ArchiveResult<PathBuf> {
    let unsafe_path = || ArchiveError::UnsafePath(name.to_owned());
    let normalized = name.replace('\\', "/");
    let mut out = PathBuf::new();
    for comp in Path::new(&normalized).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(unsafe_path()),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(out)
}

fn decode_index(compressed: &[u8], version: ArchiveVersion) -> ArchiveResult<BTreeMap<String, Vec<IndexEntry>>> {
    let raw = inflate(compressed).map_err(ArchiveError::from)?;
    let value = loads(&raw, &AllowList::archive_index())?;
    let index = parse_index(&value, version)?;
    debug!(?version, members = index.len(), "archive index decoded");
    Ok(index)
}

fn parse_header(data: &[u8]) -> ArchiveResult<(ArchiveVersion, u64)> {
    if data.starts_with(V3_HEADER) {
        let offset = hex_field(data, 8, 24, "offset")?;
        let key = hex_field(data, 25, 33, "key")?;
        let key = u32::try_from(key).map_err(|_| ArchiveError::BadHeader("key wider than 32 bits".into()))?;
        Ok((ArchiveVersion::V3 { key }, offset))
    } else if data.starts_with(V2_HEADER) {
        Ok((ArchiveVersion::V2, hex_field(data, 8, 24, "offset")?))
    } else {
        Err(ArchiveError::UnknownHeader)
    }
}

fn hex_field(data: &[u8], from: usize, to: usize, what: &str) -> ArchiveResult<u64> {
    let raw = data.get(from..to).ok_or_else(|| ArchiveError::BadHeader(format!("header too short for {what}")))?;
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| u64::from_str_radix(s.trim(), 16).ok())
        .ok_or_else(|| ArchiveError::BadHeader(format!("{what} is not hexadecimal")))
}

fn parse_index(value: &Value, version: ArchiveVersion) -> ArchiveResult<BTreeMap<String, Vec<IndexEntry>>> {
    let Value::Dict(dict) = value else {
        return Err(ArchiveError::BadEntry { name: String::new(), reason: format!("index is a {}", value.type_name()) });
    };
    let key = match version {
        ArchiveVersion::V1 | ArchiveVersion::V2 => 0,
        ArchiveVersion::V3 { key } => u64::from(key),
    };

    let mut index = BTreeMap::new();
    for (k, v) in dict.borrow().iter() {
        let name = match k {
            Value::Str(s) => s.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => {
                warn!(kind = other.type_name(), "skipping index key that is not text");
                continue;
            }
        };
        let bad = |reason: &str| ArchiveError::BadEntry { name: name.clone(), reason: reason.to_owned() };

        let records = match v {
            Value::List(l) => l.borrow().clone(),
            Value::Tuple(t) => t.to_vec(),
            _ => return Err(bad("entry list is not a sequence")),
        };
        let mut entries = Vec::with_capacity(records.len());
        for rec in records {
            let fields = match &rec {
                Value::Tuple(t) => t.to_vec(),
                Value::List(l) => l.borrow().clone(),
                _ => return Err(bad("entry is not a tuple")),
            };
            if !(2..=3).contains(&fields.len()) {
                return Err(bad("entry must have 2 or 3 fields"));
            }
            let offset = fields[0].as_int().and_then(|i| u64::try_from(i).ok()).ok_or_else(|| bad("offset is not a positive integer"))?;
            let length = fields[1].as_int().and_then(|i| u64::try_from(i).ok()).ok_or_else(|| bad("length is not a positive integer"))?;
            let prefix = match fields.get(2) {
                None | Some(Value::None) => Vec::new(),
                Some(Value::Bytes(b)) => b.to_vec(),
                Some(Value::Str(s)) => latin1_bytes(s).ok_or_else(|| bad("prefix is not latin-1"))?,
                Some(_) => return Err(bad("prefix is neither text nor bytes")),
            };
            entries.push(IndexEntry { offset: offset ^ key, length: length ^ key, prefix });
        }
        index.insert(name, entries);
    }
    Ok(index)
}

fn latin1_bytes(s: &str) -> Option<Vec<u8>> { s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect() }

/* ─────────────────────────── Writer ─────────────────────────── */

#[cfg(feature = "writer")]
pub use writer::ArchiveWriter;

#[cfg(feature = "writer")]
mod writer {
    use std::io::Write;

    use cracken_core::pickle::PickleWriter;
    use flate2::{write::ZlibEncoder, Compression};

    use super::{ArchiveError, ArchiveResult, ArchiveVersion};

    /// Builds archives (one entry per member, empty prefixes).
    #[derive(Debug, Clone)]
    pub struct ArchiveWriter {
        version: ArchiveVersion,
        members: Vec<(String, Vec<u8>)>,
    }

    impl ArchiveWriter {
        /// Empty archive of the given layout.
        pub fn new(version: ArchiveVersion) -> Self { Self { version, members: Vec::new() } }

        /// Adds a member.
        pub fn member(mut self, name: &str, bytes: &[u8]) -> Self {
            self.members.push((name.to_owned(), bytes.to_vec()));
            self
        }

        /// Header, member data, then the compressed index. RPA-1.0 has no
        /// single-file form; use [`ArchiveWriter::to_split`].
        pub fn to_bytes(&self) -> ArchiveResult<Vec<u8>> {
            let header_len = match self.version {
                ArchiveVersion::V1 => return Err(ArchiveError::DetachedIndex),
                ArchiveVersion::V2 => 25,
                ArchiveVersion::V3 { .. } => 34,
            };
            let (body, index) = self.layout(header_len)?;
            let index_offset = header_len + body.len();
            let header = match self.version {
                ArchiveVersion::V3 { key } => format!("RPA-3.0 {index_offset:016x} {key:08x}\n"),
                _ => format!("RPA-2.0 {index_offset:016x}\n"),
            };
            let mut out = header.into_bytes();
            out.extend_from_slice(&body);
            out.extend_from_slice(&index);
            Ok(out)
        }

        /// RPA-1.0 `(index, data)`: the `.rpi` and `.rpa` file contents.
        pub fn to_split(&self) -> ArchiveResult<(Vec<u8>, Vec<u8>)> {
            if self.version != ArchiveVersion::V1 {
                return Err(ArchiveError::BadHeader("only RPA-1.0 is split".into()));
            }
            let (body, index) = self.layout(0)?;
            Ok((index, body))
        }

        /// Member data starting at `base`, and the compressed index over it.
        fn layout(&self, base: usize) -> ArchiveResult<(Vec<u8>, Vec<u8>)> {
            let key = match self.version {
                ArchiveVersion::V3 { key } => u64::from(key),
                _ => 0,
            };
            let mut body = Vec::new();
            let mut spans = Vec::with_capacity(self.members.len());
            for (name, bytes) in &self.members {
                spans.push((name.as_str(), (base + body.len()) as u64, bytes.len() as u64));
                body.extend_from_slice(bytes);
            }

            let mut w = PickleWriter::new();
            w.dict(|w| {
                for (name, offset, length) in &spans {
                    w.str(name).list(|w| {
                        w.tuple(|w| {
                            w.int((offset ^ key) as i64).int((length ^ key) as i64);
                            if key != 0 {
                                w.bytes(b"");
                            }
                        });
                    });
                }
            });
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&w.finish())?;
            Ok((body, enc.finish()?))
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn header_sniffing() {
        assert!(matches!(parse_header(b"RPA-1.0 "), Err(ArchiveError::UnknownHeader)));
        assert!(matches!(parse_header(b"RPA-2.0 zz"), Err(ArchiveError::BadHeader(_))));
        assert_eq!(parse_header(b"RPA-2.0 0000000000000019\n").ok(), Some((ArchiveVersion::V2, 25)));
        assert_eq!(
            parse_header(b"RPA-3.0 0000000000000022 42424242\n").ok(),
            Some((ArchiveVersion::V3 { key: 0x4242_4242 }, 0x22))
        );
    }

    #[cfg(feature = "writer")]
    #[test]
    fn split_index_is_not_a_single_file_archive() -> ArchiveResult<()> {
        let (index, data) = ArchiveWriter::new(ArchiveVersion::V1).member("game/a.txt", b"alpha").to_split()?;
        assert!(is_split_index(&index));
        assert!(!is_archive(&index));
        assert!(matches!(Archive::from_bytes(index.clone()), Err(ArchiveError::DetachedIndex)));
        assert!(matches!(ArchiveWriter::new(ArchiveVersion::V1).to_bytes(), Err(ArchiveError::DetachedIndex)));

        let archive = Archive::from_split(&index, data)?;
        assert_eq!(archive.version(), ArchiveVersion::V1);
        assert_eq!(archive.member("game/a.txt")?, b"alpha".to_vec());
        Ok(())
    }

    #[test]
    fn unsafe_names_are_refused() {
        assert!(safe_relative("game/script.rpyc").is_ok());
        assert!(matches!(safe_relative("../evil"), Err(ArchiveError::UnsafePath(_))));
        assert!(matches!(safe_relative("/etc/passwd"), Err(ArchiveError::UnsafePath(_))));
        assert!(matches!(safe_relative("a\\..\\..\\b"), Err(ArchiveError::UnsafePath(_))));
        assert!(matches!(safe_relative(""), Err(ArchiveError::UnsafePath(_))));
    }

    #[cfg(feature = "writer")]
    #[test]
    fn v3_index_is_deobfuscated() -> ArchiveResult<()> {
        let bytes = ArchiveWriter::new(ArchiveVersion::V3 { key: 0xdead_beef })
            .member("game/a.txt", b"alpha")
            .member("game/b.txt", b"beta")
            .to_bytes()?;
        let archive = Archive::from_bytes(bytes)?;
        assert_eq!(archive.version(), ArchiveVersion::V3 { key: 0xdead_beef });
        assert_eq!(archive.names().collect::<Vec<_>>(), vec!["game/a.txt", "game/b.txt"]);
        assert_eq!(archive.member("game/b.txt")?, b"beta".to_vec());
        assert!(matches!(archive.member("nope"), Err(ArchiveError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn prefix_is_prepended() -> ArchiveResult<()> {
        let mut index = cracken_core::pickle::PickleWriter::new();
        index.dict(|w| {
            w.str("m").list(|w| {
                w.tuple(|w| {
                    w.int(25).int(5).str("he");
                });
            });
        });
        let archive = Archive {
            version: ArchiveVersion::V2,
            data: [b"RPA-2.0 0000000000000000\n".as_slice(), b"llo"].concat(),
            index: parse_index(&loads(&index.finish(), &AllowList::archive_index())?, ArchiveVersion::V2)?,
        };
        assert_eq!(archive.member("m")?, b"hello".to_vec());
        Ok(())
    }
}
