//! Snippet formatter seam.

use thiserror::Error;

/// Failure of a [`Formatter`]. The caller falls back to the raw snippet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatterError {
    /// The snippet holds something the formatter refuses to touch.
    #[error("unsupported snippet: {0}")]
    Unsupported(String),
    /// The formatter itself failed.
    #[error("formatter failed: {0}")]
    Failed(String),
}

/// Reformats one embedded code snippet (a `python:` body, an image value…).
pub trait Formatter {
    /// Returns the reformatted snippet.
    fn format(&self, snippet: &str) -> Result<String, FormatterError>;
}

/// Whitespace-only normaliser: tabs expanded to 4-column stops, trailing
/// whitespace stripped, runs of blank lines collapsed to one. Idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceFormatter;

const TAB_STOP: usize = 4;

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_STOP - col % TAB_STOP;
            out.extend(std::iter::repeat(' ').take(pad));
            col += pad;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

impl Formatter for WhitespaceFormatter {
    fn format(&self, snippet: &str) -> Result<String, FormatterError> {
        if snippet.contains('\0') {
            return Err(FormatterError::Unsupported("NUL byte in snippet".into()));
        }
        let mut out: Vec<String> = Vec::new();
        for line in snippet.lines() {
            let line = expand_tabs(line).trim_end().to_owned();
            if line.is_empty() && out.last().is_some_and(String::is_empty) {
                continue;
            }
            out.push(line);
        }
        let mut text = out.join("\n");
        if snippet.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}
