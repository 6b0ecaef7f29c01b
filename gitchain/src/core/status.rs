//! Parsers for `git status` output.

use serde::Serialize;

use crate::error::{GitError, Result};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// 2-letter XY code, "??" for untracked, "!!" for ignored.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// True when the index column records a change.
    pub fn is_staged(&self) -> bool {
        let x = self.code.as_bytes().first().copied().unwrap_or(b' ');
        x != b' ' && x != b'?' && x != b'!'
    }
}

/// Parse porcelain v1 output, skipping blank lines.
pub fn parse_porcelain(out: &str) -> Result<Vec<StatusEntry>> {
    let mut entries = Vec::new();
    for line in out.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(parse_status_line(line)?);
    }
    Ok(entries)
}

/// Parse one `XY path` line; renames and copies (`R`/`C`) report the new path.
///
/// Paths git C-quoted (spaces, quotes, control or non-ASCII bytes) are unquoted.
pub fn parse_status_line(line: &str) -> Result<StatusEntry> {
    let malformed = || {
        GitError::unexpected(
            "git status --porcelain",
            format!("unexpected porcelain line: '{line}'"),
        )
    };
    if line.len() < 4 || !line.is_char_boundary(3) || line.as_bytes()[2] != b' ' {
        return Err(malformed());
    }
    let (code, rest) = (&line[..2], &line[3..]);
    let path = if code.bytes().any(|b| b == b'R' || b == b'C') {
        rename_target(rest).ok_or_else(malformed)?
    } else {
        unquote_path(rest)
    };
    Ok(StatusEntry {
        code: code.to_string(),
        path,
    })
}

/// Paths of `!!` lines from `git status --ignored -s`.
pub fn ignored_paths(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| line.strip_prefix("!! "))
        .map(unquote_path)
        .filter(|path| !path.is_empty())
        .collect()
}

/// Undo git's C-style path quoting; unquoted input is returned as is.
pub fn unquote_path(raw: &str) -> String {
    match take_quoted(raw) {
        Some((path, "")) => path,
        _ => raw.to_string(),
    }
}

/// `new` of an `old -> new` pair, either side possibly quoted.
fn rename_target(rest: &str) -> Option<String> {
    let new = match take_quoted(rest) {
        Some((_, after)) => after.strip_prefix(" -> ")?,
        None => rest.split_once(" -> ")?.1,
    };
    Some(unquote_path(new))
}

/// Decode a leading `"..."` token, returning it and the text after the closing quote.
fn take_quoted(raw: &str) -> Option<(String, &str)> {
    let bytes = raw.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return Some((String::from_utf8_lossy(&out).into_owned(), &raw[i + 1..])),
            b'\\' => {
                let esc = *bytes.get(i + 1)?;
                i += 2;
                let byte = match esc {
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b'f' => 0x0c,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'v' => 0x0b,
                    b'0'..=b'3' => {
                        let digits = bytes.get(i - 1..i + 2)?;
                        if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                            return None;
                        }
                        i += 2;
                        digits.iter().fold(0u8, |acc, d| acc * 8 + (d - b'0'))
                    }
                    other => other,
                };
                out.push(byte);
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    None
}
