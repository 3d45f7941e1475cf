//! Value codec -- safe-string test, base64, ISO-8859-1 and URL values.

use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::trace;
use url::Url;

/// Failure while resolving a `name:< URL` value.
#[derive(Debug, thiserror::Error)]
pub enum UrlValueError {
    #[error("malformed URL '{0}'")]
    Malformed(String),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Safe strings and base64
// ---------------------------------------------------------------------------

/// True when `data` cannot be written as an LDIF SAFE-STRING and must be
/// base64-encoded instead.
pub fn needs_encoding(data: &[u8]) -> bool {
    let (first, last) = match (data.first(), data.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return false,
    };
    if matches!(first, 0 | b'\n' | b'\r' | b' ' | b':' | b'<') || first >= 0x80 {
        return true;
    }
    if last == b' ' {
        return true;
    }
    data.iter()
        .any(|&c| c == 0 || c == b'\n' || c == b'\r' || c >= 0x80)
}

/// Standard base64 without line wrapping; folding happens on output.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.trim())
}

// ---------------------------------------------------------------------------
// ISO-8859-1
// ---------------------------------------------------------------------------

/// Decode bytes as ISO-8859-1: every byte maps to the code point of the
/// same value, so this never fails.
pub fn latin1_to_string(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Encode as ISO-8859-1, or `None` if a character lies above U+00FF.
pub fn string_to_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Bytes used to represent a DN or text value on the wire: ISO-8859-1 when
/// possible, UTF-8 otherwise.
pub fn wire_bytes(text: &str) -> Vec<u8> {
    string_to_latin1(text).unwrap_or_else(|| text.as_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// URL-referenced values
// ---------------------------------------------------------------------------

/// Rewrite the legacy `/C|/dir/file` drive form into `C:\dir\file`.
///
/// Returns `None` unless the path splits on `|` into exactly two parts.
pub fn legacy_drive_path(path: &str) -> Option<String> {
    let tokens: Vec<&str> = path.split('|').filter(|t| !t.is_empty()).collect();
    if tokens.len() != 2 {
        return None;
    }
    let drive = tokens[0].rsplit('/').next().unwrap_or(tokens[0]);
    Some(format!("{}:{}", drive, tokens[1].replace('/', "\\")))
}

/// Map a `file:` URL to a local path.
pub fn file_url_path(raw: &str) -> Result<PathBuf, UrlValueError> {
    let url = Url::parse(raw).map_err(|_| UrlValueError::Malformed(raw.to_string()))?;
    if url.scheme() != "file" {
        return Err(UrlValueError::UnsupportedScheme(url.scheme().to_string()));
    }

    // The URL parser normalizes "C|" itself, so look at the raw text.
    let raw_path = raw.get(5..).unwrap_or("").trim_start_matches("//");
    if raw_path.contains('|') {
        if let Some(legacy) = legacy_drive_path(raw_path) {
            return Ok(PathBuf::from(legacy));
        }
    }

    url.to_file_path()
        .map_err(|_| UrlValueError::Malformed(raw.to_string()))
}

/// Read the complete contents of the file a value URL points at.
pub fn resolve_url_value(raw: &str) -> Result<Vec<u8>, UrlValueError> {
    let path = file_url_path(raw)?;
    trace!(url = raw, path = %path.display(), "resolving URL value");
    fs::read(&path).map_err(|source| UrlValueError::Io { path, source })
}

/// `file://` URL for an absolute local path.
pub fn path_to_file_url(path: &std::path::Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}
