//! Line folding -- joins continuation lines on input and wraps long lines
//! on output.
//!
//! Input is decoded as ISO-8859-1 regardless of platform so that every byte
//! survives into the logical line unchanged.  Output lines always end with a
//! bare `\n`.

use std::io::{self, BufRead, Write};

use crate::codec::latin1_to_string;
use crate::error::{FormatErrorKind, LdifError, Result};

/// Default maximum width of an output line.
pub const DEFAULT_WIDTH: usize = 77;

// ---------------------------------------------------------------------------
// LineReader -- unfolding reader with one line of pushback
// ---------------------------------------------------------------------------

/// Reads logical lines: comments removed, continuation lines joined.
///
/// A blank physical line is returned as an empty logical line; it marks the
/// end of a record.
pub struct LineReader<R> {
    inner: R,
    /// Physical line read ahead of the logical line last returned.
    next: Option<(String, u64)>,
    /// Logical line handed back by the parser.
    unread: Option<(String, u64)>,
    physical: u64,
    line: u64,
    done: bool,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader {
            inner,
            next: None,
            unread: None,
            physical: 0,
            line: 0,
            done: false,
        }
    }

    /// 1-based number of the first physical line of the logical line most
    /// recently returned.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// True once the underlying stream has been exhausted.
    pub fn at_end(&self) -> bool {
        self.done && self.next.is_none() && self.unread.is_none()
    }

    /// Return a logical line so that the next `read_line` yields it again.
    pub fn unread(&mut self, line: String) {
        debug_assert!(self.unread.is_none(), "double unread");
        self.unread = Some((line, self.line));
    }

    fn read_physical(&mut self) -> Result<Option<(String, u64)>> {
        if let Some(pending) = self.next.take() {
            return Ok(Some(pending));
        }
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            self.done = true;
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        self.physical += 1;
        Ok(Some((latin1_to_string(&buf), self.physical)))
    }

    /// Next logical line, `Some("")` for a record separator, `None` at end
    /// of input.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if let Some((text, n)) = self.unread.take() {
            self.line = n;
            return Ok(Some(text));
        }

        let mut result: Option<String> = None;
        let mut in_comment = false;
        while let Some((text, n)) = self.read_physical()? {
            if text.is_empty() {
                if result.is_some() {
                    self.next = Some((text, n));
                } else {
                    self.line = n;
                    result = Some(text);
                }
                break;
            }
            if text.starts_with('#') {
                in_comment = true;
                continue;
            }
            if let Some(rest) = text.strip_prefix(' ') {
                if in_comment {
                    continue;
                }
                match result.as_mut() {
                    Some(acc) => acc.push_str(rest),
                    None => return Err(LdifError::format(n, FormatErrorKind::LineNowhere)),
                }
                continue;
            }
            in_comment = false;
            if result.is_some() {
                self.next = Some((text, n));
                break;
            }
            self.line = n;
            result = Some(text);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Output folding
// ---------------------------------------------------------------------------

fn split_at_boundary(s: &str, max_bytes: usize) -> usize {
    let mut cut = max_bytes.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        // A single character wider than the limit still has to go somewhere.
        cut = s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
    }
    cut
}

fn fold_line_into(out: &mut String, line: &str, width: usize) {
    if width == 0 || line.len() <= width {
        out.push_str(line);
        out.push('\n');
        return;
    }
    let width = width.max(2);
    let mut rest = line;
    let mut limit = width;
    while rest.len() > limit {
        let cut = split_at_boundary(rest, limit);
        out.push_str(&rest[..cut]);
        out.push_str("\n ");
        rest = &rest[cut..];
        limit = width - 1;
    }
    out.push_str(rest);
    out.push('\n');
}

/// Wrap every line of `text` at `width` bytes.  Continuation lines start
/// with one space, which counts toward the width.  `width == 0` disables
/// wrapping.
pub fn fold(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / width.max(1) * 2);
    for line in text.split_terminator('\n') {
        fold_line_into(&mut out, line, width);
    }
    out
}

/// Join continuation lines back into logical lines.
pub fn unfold(text: &str) -> String {
    text.replace("\r\n", "\n").replace("\n ", "")
}

/// Write one logical line, folded and newline-terminated.
pub fn write_folded(w: &mut dyn Write, line: &str, width: usize) -> io::Result<()> {
    let mut out = String::with_capacity(line.len() + 2);
    fold_line_into(&mut out, line, width);
    w.write_all(out.as_bytes())
}
