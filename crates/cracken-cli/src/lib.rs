//! cracken-cli — library half of the `cracken` binary
//!
//! `main.rs` parses arguments and sets up logging and colour; everything
//! that touches files lives here so it can be tested:
//! - discovery of compiled scripts and archives under a path ([`collect`])
//! - archive extraction, optionally feeding extracted members back in
//! - per-file decompilation with errors collected in a [`Report`]
//! - [`config`]: `.cracken.toml` defaults

#![forbid(unsafe_code)]

pub mod config;

use std::{
    collections::HashSet,
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use cracken_decompiler::{output_path, DecompileOptions, Decompiler};
use cracken_rpyc::{is_archive, is_envelope, is_split_index, split_data_path, Archive, ArchiveVersion};
use log::{debug, info, warn};
#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Stream};
use walkdir::{DirEntry, WalkDir};

pub use config::Config;

/* ───────────────────────────── Settings ───────────────────────────── */

/// Everything one run needs, config and flags already merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// File or directory to process.
    pub path: PathBuf,
    /// Decompile members extracted from archives.
    pub recursive: bool,
    /// Delete archives once extracted.
    pub clear: bool,
    /// Run snippets through the formatter.
    pub prettify: bool,
    /// Decompile without writing or deleting anything.
    pub dry_run: bool,
    /// Extensions treated as compiled scripts.
    pub extensions: Vec<String>,
    /// Ignore dot-directories while walking.
    pub skip_hidden: bool,
}

impl Settings {
    /// Settings for `path` taken from `config`.
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            recursive: config.recursive,
            clear: config.clear,
            prettify: config.prettify,
            dry_run: false,
            extensions: config.extensions.clone(),
            skip_hidden: config.skip_hidden,
        }
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()).is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

/* ───────────────────────────── Report ───────────────────────────── */

/// A file that could not be processed.
#[derive(Debug)]
pub struct Failure {
    /// Offending input.
    pub path: PathBuf,
    /// Cause, with context.
    pub error: anyhow::Error,
}

/// Outcome of [`run`].
#[derive(Debug, Default)]
pub struct Report {
    /// Written (or, in dry-run, would-be) script paths.
    pub decompiled: Vec<PathBuf>,
    /// Files written out of archives.
    pub extracted: Vec<PathBuf>,
    /// Per-file failures; processing went on after each.
    pub failures: Vec<Failure>,
}

impl Report {
    /// 0 when everything succeeded, 2 when any file failed.
    pub fn exit_code(&self) -> u8 { if self.failures.is_empty() { 0 } else { 2 } }

    fn fail(&mut self, path: &Path, error: anyhow::Error) {
        status_fail(path, &error);
        self.failures.push(Failure { path: path.to_path_buf(), error });
    }
}

/* ───────────────────────────── Discovery ───────────────────────────── */

/// What a file on disk turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Compiled script (by extension).
    Script,
    /// RPA archive (by header, or an `.rpi` index).
    Archive,
    /// Anything else.
    Other,
}

fn head(path: &Path) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(16);
    fs::File::open(path)?.take(16).read_to_end(&mut buf)?;
    Ok(buf)
}

fn archive_at(path: &Path, bytes: &[u8]) -> bool {
    is_archive(bytes) || (is_split_index(bytes) && path.extension().is_some_and(|e| e.eq_ignore_ascii_case("rpi")))
}

/// Classifies `path`: configured extensions first, then the archive header.
pub fn classify(path: &Path, settings: &Settings) -> FileKind {
    if settings.is_script(path) {
        return FileKind::Script;
    }
    match head(path) {
        Ok(bytes) if archive_at(path, &bytes) => FileKind::Archive,
        Ok(_) => FileKind::Other,
        Err(e) => {
            debug!("cannot sniff {}: {e}", path.display());
            FileKind::Other
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'))
}

/// Archives and scripts under `settings.path`, each list in walk order.
pub fn collect(settings: &Settings) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut archives = Vec::new();
    let mut scripts = Vec::new();
    let walker = WalkDir::new(&settings.path).sort_by_file_name().into_iter();
    for entry in walker.filter_entry(|e| !(settings.skip_hidden && is_hidden(e))) {
        let entry = entry.with_context(|| format!("walking {}", settings.path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match classify(entry.path(), settings) {
            FileKind::Script => scripts.push(entry.into_path()),
            FileKind::Archive => archives.push(entry.into_path()),
            FileKind::Other => {}
        }
    }
    Ok((archives, scripts))
}

/* ───────────────────────────── Run ───────────────────────────── */

/// Processes `settings.path`. Only a missing path or an unreadable tree is
/// fatal; per-file problems land in [`Report::failures`].
pub fn run(settings: &Settings) -> Result<Report> {
    if !settings.path.exists() {
        bail!("{} does not exist", settings.path.display());
    }

    let (mut archives, mut scripts) = collect(settings)?;
    if archives.is_empty() && scripts.is_empty() {
        warn!("no files were found under {}", settings.path.display());
    }

    let decompiler = Decompiler::new(DecompileOptions { prettify: settings.prettify });
    let mut report = Report::default();

    while let Some(archive) = archives.pop() {
        match extract(&archive, settings, &decompiler, &mut report) {
            Ok(members) if settings.recursive => {
                for member in members {
                    match head(&member) {
                        Ok(bytes) if archive_at(&member, &bytes) => archives.push(member),
                        Ok(bytes) if is_envelope(&bytes) => scripts.push(member),
                        _ => {}
                    }
                }
            }
            Ok(_) => {}
            Err(e) => report.fail(&archive, e),
        }
    }

    let mut seen = HashSet::new();
    scripts.retain(|s| seen.insert(s.clone()));
    for script in scripts {
        match decompile(&script, settings, &decompiler) {
            Ok(dest) => {
                status_ok("decompiled", &dest);
                report.decompiled.push(dest);
            }
            Err(e) => report.fail(&script, e),
        }
    }

    info!("{} decompiled, {} extracted, {} failed", report.decompiled.len(), report.extracted.len(), report.failures.len());
    Ok(report)
}

/// Extracts `path` next to itself and returns the written members. In
/// dry-run nothing is written; envelope members are decompiled in memory
/// when `recursive` is set.
fn extract(path: &Path, settings: &Settings, decompiler: &Decompiler, report: &mut Report) -> Result<Vec<PathBuf>> {
    let archive = Archive::read_file(path).with_context(|| format!("reading archive {}", path.display()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    debug!("{}: {} members", path.display(), archive.len());

    if settings.dry_run {
        for name in archive.names() {
            let member = dir.join(name);
            if !settings.recursive {
                status_info("member", &member);
                continue;
            }
            let bytes = match archive.member(name) {
                Ok(bytes) => bytes,
                Err(e) => {
                    report.fail(&member, anyhow::Error::new(e).context(format!("reading member {name}")));
                    continue;
                }
            };
            if is_envelope(&bytes) {
                match decompiler.decompile_bytes(&bytes) {
                    Ok(_) => report.decompiled.push(output_path(&member)),
                    Err(e) => report.fail(&member, anyhow::Error::new(e)),
                }
            }
        }
        return Ok(Vec::new());
    }

    let written = archive.extract_to(dir).with_context(|| format!("extracting {}", path.display()))?;
    status_ok("extracted", path);
    report.extracted.extend(written.iter().cloned());
    if settings.clear {
        fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        if archive.version() == ArchiveVersion::V1 {
            let data = split_data_path(path);
            fs::remove_file(&data).with_context(|| format!("removing {}", data.display()))?;
        }
    }
    Ok(written)
}

fn decompile(path: &Path, settings: &Settings, decompiler: &Decompiler) -> Result<PathBuf> {
    let (dest, out) = if settings.dry_run {
        let out = decompiler.decompile_file(path).with_context(|| format!("decompiling {}", path.display()))?;
        (output_path(path), out)
    } else {
        decompiler.decompile_to_file(path).with_context(|| format!("decompiling {}", path.display()))?
    };
    for diagnostic in &out.diagnostics {
        warn!("{}: {diagnostic}", path.display());
    }
    Ok(dest)
}

/* ───────────────────────────── Logging ───────────────────────────── */

/// Installs `env_logger`, honouring `RUST_LOG` (default `info`).
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .try_init();
    }
}

/* ───────────────────────────── Status lines ───────────────────────────── */

fn status_ok(tag: &str, path: &Path) {
    #[cfg(feature = "color")]
    eprintln!("{:>12} {}", tag.if_supports_color(Stream::Stderr, |t| t.green()), path.display());
    #[cfg(not(feature = "color"))]
    eprintln!("{tag:>12} {}", path.display());
}

fn status_info(tag: &str, path: &Path) {
    #[cfg(feature = "color")]
    eprintln!("{:>12} {}", tag.if_supports_color(Stream::Stderr, |t| t.blue()), path.display());
    #[cfg(not(feature = "color"))]
    eprintln!("{tag:>12} {}", path.display());
}

fn status_fail(path: &Path, error: &anyhow::Error) {
    let tag = "failed";
    #[cfg(feature = "color")]
    eprintln!("{:>12} {}: {error:#}", tag.if_supports_color(Stream::Stderr, |t| t.red()), path.display());
    #[cfg(not(feature = "color"))]
    eprintln!("{tag:>12} {}: {error:#}", path.display());
}

/* ───────────────────────────── Tests ───────────────────────────── */
