//! `.cracken.toml` loading.
//!
//! ```toml
//! recursive = false
//! clear     = false
//! prettify  = false
//! extensions = ["rpyc", "rpymc"]
//! skip_hidden = true
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// File name searched for in the working directory and its parents.
pub const CONFIG_FILE: &str = ".cracken.toml";

/// Persistent defaults; CLI flags are OR-ed on top.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Decompile members extracted from archives.
    #[serde(default)]
    pub recursive: bool,
    /// Delete archives once extracted.
    #[serde(default)]
    pub clear: bool,
    /// Run embedded snippets through the formatter.
    #[serde(default)]
    pub prettify: bool,
    /// Extensions treated as compiled scripts.
    #[serde(default = "d_extensions")]
    pub extensions: Vec<String>,
    /// Ignore dot-directories while walking.
    #[serde(default = "d_true")]
    pub skip_hidden: bool,
}

fn d_extensions() -> Vec<String> { vec!["rpyc".into(), "rpymc".into()] }
fn d_true() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Self { recursive: false, clear: false, prettify: false, extensions: d_extensions(), skip_hidden: d_true() }
    }
}

impl Config {
    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self> { toml::from_str(text).context("invalid TOML") }

    /// Reads one config file.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Nearest [`CONFIG_FILE`] from `start` upwards.
pub fn discover(start: &Path) -> Option<PathBuf> {
    let mut cur = start.to_path_buf();
    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !cur.pop() {
            return None;
        }
    }
}

/// `explicit` when given, otherwise the discovered file, otherwise defaults.
pub fn load(explicit: Option<&Path>, start: &Path) -> Result<Config> {
    match explicit.map(Path::to_path_buf).or_else(|| discover(start)) {
        Some(path) => {
            log::debug!("config: {}", path.display());
            Config::read(&path)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = Config::parse("prettify = true\n").unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(cfg, Config { prettify: true, ..Config::default() });
        assert!(Config::parse("recursiv = true").is_err());
    }

    #[test]
    fn discovery_walks_up() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let nested = dir.path().join("game/images");
        fs::create_dir_all(&nested).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(load(None, &nested).ok(), Some(Config::default()));

        fs::write(dir.path().join(CONFIG_FILE), "recursive = true\nextensions = [\"rpyc\"]\n").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(discover(&nested), Some(dir.path().join(CONFIG_FILE)));
        let cfg = load(None, &nested).unwrap_or_else(|e| panic!("{e:#}"));
        assert!(cfg.recursive);
        assert_eq!(cfg.extensions, ["rpyc"]);
    }
}
