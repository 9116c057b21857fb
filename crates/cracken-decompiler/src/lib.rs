//! cracken-decompiler — `.rpyc`/`.rpymc` bytes → Ren'Py script text.
//!
//! - [`Decompiler`]: envelope → restricted decode → tree → rewrite passes → text
//! - [`passes`]: the fixed rewrite pipeline ([`passes::Pass`])
//! - [`format`]: snippet [`Formatter`] seam and [`WhitespaceFormatter`]
//! - [`printer`]: indentation printer, attribution trailer, output naming
//!
//! Nothing is cached across files; a [`Decompiler`] only holds the read-only
//! registry, allow-list and formatter.
//!
//! # Exemple
//! ```no_run
//! use cracken_decompiler::{Decompiler, DecompileOptions};
//!
//! let d = Decompiler::new(DecompileOptions { prettify: true });
//! let out = d.decompile_file("game/script.rpyc").unwrap();
//! println!("{}", out.text);
//! ```

#![deny(missing_docs)]

pub mod format;
pub mod passes;
pub mod printer;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use cracken_ast::{reconstruct, Diagnostic, Node, Registry, ShapeError};
use cracken_core::pickle::{loads, AllowList, DecodeError, PickleError, SecurityError};
use cracken_rpyc::{Envelope, FormatError};
use log::{debug, info};
use thiserror::Error;

pub use format::{Formatter, FormatterError, WhitespaceFormatter};
pub use passes::{Pass, PassCtx};
pub use printer::{output_path, print, ATTRIBUTION};

/* ─────────────────────────── Errors ─────────────────────────── */

/// Fatal failure for one file, tagged with the stage that raised it.
#[derive(Debug, Error)]
pub enum DecompileError {
    /// Envelope could not be read.
    #[error("envelope: {0}")]
    Format(#[from] FormatError),
    /// Payload is not a well-formed object stream.
    #[error("decode: {0}")]
    Decode(DecodeError),
    /// Payload references a class outside the allow-list.
    #[error("security: {0}")]
    Security(SecurityError),
    /// Decoded value does not have the `(header, statements)` shape.
    #[error("reconstruct: {0}")]
    Shape(#[from] ShapeError),
    /// Output could not be written.
    #[error("write {}: {source}", path.display())]
    Io {
        /// Destination.
        path: PathBuf,
        /// Cause.
        #[source]
        source: io::Error,
    },
}

impl From<PickleError> for DecompileError {
    fn from(e: PickleError) -> Self {
        match e {
            PickleError::Decode(e) => DecompileError::Decode(e),
            PickleError::Security(e) => DecompileError::Security(e),
        }
    }
}

/// Result alias.
pub type DecompileResult<T> = Result<T, DecompileError>;

/* ─────────────────────────── Options ─────────────────────────── */

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecompileOptions {
    /// Run embedded snippets through the formatter.
    pub prettify: bool,
}

/// Text of one decompiled file plus the recoverable problems met on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompiled {
    /// Full script text, attribution included.
    pub text: String,
    /// Reconstruction diagnostics, in encounter order.
    pub diagnostics: Vec<Diagnostic>,
}

/* ─────────────────────────── Decompiler ─────────────────────────── */

/// Orchestrates the stages for one file at a time.
pub struct Decompiler {
    /// Switches.
    pub options: DecompileOptions,
    registry: Registry,
    allow: AllowList,
    formatter: Box<dyn Formatter>,
}

impl Decompiler {
    /// Standard registry, script allow-list, [`WhitespaceFormatter`].
    pub fn new(options: DecompileOptions) -> Self {
        Self { options, registry: Registry::standard(), allow: AllowList::script(), formatter: Box::new(WhitespaceFormatter) }
    }

    /// Replaces the snippet formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Envelope → decoded value → unrewritten tree.
    pub fn tree_from_bytes(&self, data: &[u8]) -> DecompileResult<(Node, Vec<Diagnostic>)> {
        let envelope = Envelope::from_bytes(data)?;
        let value = loads(&envelope.payload, &self.allow)?;
        Ok(reconstruct(&value, &self.registry)?)
    }

    /// Runs the rewrite pipeline over a reconstructed tree.
    pub fn rewrite(&self, root: &mut Node) {
        let ctx = PassCtx { prettify: self.options.prettify, formatter: self.formatter.as_ref() };
        passes::rewrite(&ctx, root);
    }

    /// Full pipeline over an in-memory envelope.
    pub fn decompile_bytes(&self, data: &[u8]) -> DecompileResult<Decompiled> {
        let (mut root, diagnostics) = self.tree_from_bytes(data)?;
        debug!("reconstructed {} nodes, {} diagnostics", root.size(), diagnostics.len());
        self.rewrite(&mut root);
        Ok(Decompiled { text: print(&root), diagnostics })
    }

    /// Full pipeline over a file on disk.
    pub fn decompile_file(&self, path: impl AsRef<Path>) -> DecompileResult<Decompiled> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(FormatError::from)?;
        self.decompile_bytes(&data)
    }

    /// Decompiles `input` and writes the result next to it; returns the output path.
    pub fn decompile_to_file(&self, input: impl AsRef<Path>) -> DecompileResult<(PathBuf, Decompiled)> {
        let input = input.as_ref();
        let out = self.decompile_file(input)?;
        let dest = output_path(input);
        write_atomic(&dest, &out.text)?;
        info!("{} -> {}", input.display(), dest.display());
        Ok((dest, out))
    }
}

impl std::fmt::Debug for Decompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompiler").field("options", &self.options).field("registry", &self.registry.len()).finish_non_exhaustive()
    }
}

/// Writes through a sibling temp file and renames it over `path`.
pub fn write_atomic(path: &Path, text: &str) -> DecompileResult<()> {
    let io_err = |source| DecompileError::Io { path: path.to_path_buf(), source };
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    fs::write(&tmp, text).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(e)
    })
}
