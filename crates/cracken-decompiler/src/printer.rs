//! Tree → script text.

use std::path::{Path, PathBuf};

use cracken_ast::{Node, Visit};

/// Trailer appended to every decompiled file.
pub const ATTRIBUTION: &str = "# This file was created using renpy-cracken\n# https://github.com/dododo25/renpy-kracker\n";

const INDENT: &str = "    ";

/// Prints the descendants of `root`, four spaces per level, then [`ATTRIBUTION`].
pub fn print(root: &Node) -> String {
    let mut out = String::new();
    let mut level = 0usize;
    let mut ends_blank = None;

    for visit in root.walk() {
        match visit {
            Visit::Node(node) => {
                let line = node.render();
                if !line.is_empty() {
                    out.push_str(&INDENT.repeat(level));
                    out.push_str(&line);
                }
                out.push('\n');
                ends_blank = Some(line.is_empty());
                level += 1;
            }
            Visit::BlockEnd => level = level.saturating_sub(1),
        }
    }

    if ends_blank == Some(false) {
        out.push('\n');
    }
    out.push_str(ATTRIBUTION);
    out
}

/// `.rpyc` → `.rpy`, `.rpymc` → `.rpym`, anything else loses its extension.
pub fn output_path(input: &Path) -> PathBuf {
    match input.extension().and_then(|e| e.to_str()) {
        Some("rpyc") => input.with_extension("rpy"),
        Some("rpymc") => input.with_extension("rpym"),
        _ => input.with_extension(""),
    }
}
