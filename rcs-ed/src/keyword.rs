//! RCS keyword expansion and collapsing.
//!
//! RCS substitutes a handful of `$Keyword$` markers with per-revision
//! metadata when a file is checked out, according to the `-k` mode recorded
//! in the file's admin section (or passed on the command line). This module
//! implements the same line-wise transform the rest of the crate uses for
//! deltas: given a mode and the metadata for one revision, expand or
//! collapse the keyword markers in a byte slice.

use std::fmt::Write;

/// The RCS `-k` keyword substitution modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// `-kkv`: expand to `$Keyword: value $` (the RCS default).
    Kv,
    /// `-kkvl`: like `Kv`, but includes the locker name (always empty for a
    /// converted, unlocked repository).
    Kvl,
    /// `-kk`: collapse to the bare `$Keyword$` marker.
    K,
    /// `-ko`: preserve the bytes exactly as stored. This is the default
    /// applied during conversion, since the source ",v" file already holds
    /// whatever expansion CVS last wrote and a DVCS should receive the same
    /// bytes.
    O,
    /// `-kb`: binary; never transformed.
    B,
    /// `-kv`: value only, no keyword name or delimiters.
    V,
}

impl ExpansionMode {
    /// Parses an RCS admin `expand` string (e.g. `b"kv"`). Unrecognized or
    /// absent strings fall back to [`ExpansionMode::O`], the project default
    /// documented alongside this module.
    pub fn from_admin(expand: Option<&[u8]>) -> Self {
        match expand {
            Some(b"kv") => Self::Kv,
            Some(b"kvl") => Self::Kvl,
            Some(b"k") => Self::K,
            Some(b"o") => Self::O,
            Some(b"b") => Self::B,
            Some(b"v") => Self::V,
            _ => Self::O,
        }
    }
}

/// The per-revision values substituted into an expanded keyword.
#[derive(Debug, Clone)]
pub struct KeywordValues<'a> {
    pub path: &'a str,
    pub revision: &'a str,
    pub date: &'a str,
    pub author: &'a str,
    pub state: &'a str,
}

const KEYWORDS: &[&str] = &["Id", "Header", "Author", "Date", "Revision", "Source", "State", "Locker", "RCSfile"];

/// Expands or collapses every recognized keyword marker on one line,
/// according to `mode`. A pure function: `O` and `B` are no-ops, matching
/// the expander as a pure line-wise transform.
pub fn transform_line(line: &[u8], mode: ExpansionMode, values: &KeywordValues) -> Vec<u8> {
    if matches!(mode, ExpansionMode::O | ExpansionMode::B) {
        return line.to_vec();
    }

    let mut out = Vec::with_capacity(line.len());
    let mut rest = line;

    while let Some(dollar) = rest.iter().position(|b| *b == b'$') {
        out.extend_from_slice(&rest[..dollar]);
        rest = &rest[dollar + 1..];

        match find_keyword(rest) {
            Some((keyword, after_name)) => {
                // Skip over an already-expanded value (`: ... `) up to the
                // closing `$`, if present, so re-expansion is idempotent.
                let close = after_name
                    .iter()
                    .position(|b| *b == b'$')
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let consumed = &after_name[..close.min(after_name.len())];
                let has_value = consumed.starts_with(b": ");

                out.extend_from_slice(render_keyword(keyword, mode, values).as_bytes());

                rest = if has_value {
                    &after_name[close..]
                } else {
                    after_name
                };
            }
            None => {
                out.push(b'$');
            }
        }
    }

    out.extend_from_slice(rest);
    out
}

fn find_keyword(rest: &[u8]) -> Option<(&'static str, &[u8])> {
    for keyword in KEYWORDS {
        if rest.starts_with(keyword.as_bytes()) {
            return Some((keyword, &rest[keyword.len()..]));
        }
    }
    None
}

fn render_keyword(keyword: &str, mode: ExpansionMode, values: &KeywordValues) -> String {
    let value = match keyword {
        "Id" | "Header" => format!(
            "{} {} {} {} {}",
            values.path, values.revision, values.date, values.author, values.state
        ),
        "Author" => values.author.to_string(),
        "Date" => values.date.to_string(),
        "Revision" => values.revision.to_string(),
        "Source" | "RCSfile" => values.path.to_string(),
        "State" => values.state.to_string(),
        "Locker" => String::new(),
        _ => String::new(),
    };

    let mut out = String::new();
    match mode {
        ExpansionMode::K => {
            write!(out, "${}$", keyword).ok();
        }
        ExpansionMode::V => {
            out.push_str(&value);
        }
        ExpansionMode::Kv | ExpansionMode::Kvl => {
            write!(out, "${}: {} $", keyword, value).ok();
        }
        ExpansionMode::O | ExpansionMode::B => unreachable!("handled by the caller"),
    }
    out
}

/// Expands or collapses keywords across every line of a file's content.
pub fn transform(content: &[u8], mode: ExpansionMode, values: &KeywordValues) -> Vec<u8> {
    if matches!(mode, ExpansionMode::O | ExpansionMode::B) {
        return content.to_vec();
    }

    let mut out = Vec::with_capacity(content.len());
    for (i, line) in content.split(|b| *b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        out.extend(transform_line(line, mode, values));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> KeywordValues<'static> {
        KeywordValues {
            path: "foo.c",
            revision: "1.3",
            date: "2020/01/02 03:04:05",
            author: "alice",
            state: "Exp",
        }
    }

    #[test]
    fn test_preserve_mode_is_a_no_op() {
        let line = b"static const char id[] = \"$Id$\";";
        assert_eq!(transform_line(line, ExpansionMode::O, &values()), line.to_vec());
    }

    #[test]
    fn test_kv_expands_bare_marker() {
        let line = b"$Id$";
        let out = transform_line(line, ExpansionMode::Kv, &values());
        assert_eq!(out, b"$Id: foo.c 1.3 2020/01/02 03:04:05 alice Exp $".to_vec());
    }

    #[test]
    fn test_kv_is_idempotent_on_already_expanded_marker() {
        let already = b"$Id: foo.c 1.2 2019/12/31 00:00:00 bob Exp $";
        let out = transform_line(already, ExpansionMode::Kv, &values());
        assert_eq!(out, b"$Id: foo.c 1.3 2020/01/02 03:04:05 alice Exp $".to_vec());
    }

    #[test]
    fn test_k_mode_collapses_to_bare_marker() {
        let expanded = b"$Id: foo.c 1.2 2019/12/31 00:00:00 bob Exp $";
        assert_eq!(transform_line(expanded, ExpansionMode::K, &values()), b"$Id$".to_vec());
    }

    #[test]
    fn test_from_admin_defaults_to_preserve() {
        assert_eq!(ExpansionMode::from_admin(None), ExpansionMode::O);
        assert_eq!(ExpansionMode::from_admin(Some(b"kv")), ExpansionMode::Kv);
    }
}
