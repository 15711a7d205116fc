//! Reading Python source files.
//!
//! The encoding is taken from a UTF-8 byte order mark or a PEP 263 coding
//! cookie in the first two lines, and defaults to UTF-8. A file that does
//! not decode under its declared encoding, or declares one we do not know,
//! is read as Latin-1, which accepts every byte.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decoded source text and the label it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub text: String,
    pub filename: String,
}

impl SourceUnit {
    pub fn new(text: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filename: filename.into(),
        }
    }

    /// Read and decode a file. Line endings are kept as they are.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| Error::io(path, source))?;
        let (text, encoding) = decode(&bytes);
        debug!(path = %path.display(), encoding = encoding.name(), bytes = bytes.len(), "read source");
        Ok(Self::new(text, path.display().to_string()))
    }
}

/// Encodings the reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// UTF-8 with a leading byte order mark, which is dropped
    Utf8Sig,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Sig => "utf-8-sig",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "iso-8859-1",
        }
    }

    /// Look up a coding cookie name the way Python normalizes it.
    fn from_cookie(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase().replace('_', "-");
        let base = name.get(..12).unwrap_or(&name);
        if base == "utf-8" || base.starts_with("utf-8-") || name == "utf8" {
            return Some(Encoding::Utf8);
        }
        if ["latin-1", "iso-8859-1", "iso-latin-1"]
            .iter()
            .any(|latin| base == *latin || base.starts_with(&format!("{latin}-")))
            || matches!(name.as_str(), "latin1" | "l1" | "iso8859-1" | "cp819")
        {
            return Some(Encoding::Latin1);
        }
        if matches!(name.as_str(), "ascii" | "us-ascii" | "646") {
            return Some(Encoding::Ascii);
        }
        None
    }

    fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Encoding::Utf8Sig => {
                String::from_utf8(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes).to_vec()).ok()
            }
            Encoding::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            Encoding::Latin1 => Some(latin1(bytes)),
        }
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode source bytes, returning the text and the encoding used.
pub fn decode(bytes: &[u8]) -> (String, Encoding) {
    let encoding = match detect_encoding(bytes) {
        Some(encoding) => encoding,
        None => {
            warn!("unusable source encoding, reading as latin-1");
            return (latin1(bytes), Encoding::Latin1);
        }
    };
    match encoding.decode(bytes) {
        Some(text) => (text, encoding),
        None => {
            warn!(encoding = encoding.name(), "source does not decode, reading as latin-1");
            (latin1(bytes), Encoding::Latin1)
        }
    }
}

/// The declared encoding, or `None` for an unknown name or a cookie that
/// contradicts a byte order mark.
pub fn detect_encoding(bytes: &[u8]) -> Option<Encoding> {
    let bom = bytes.starts_with(UTF8_BOM);
    let body = if bom { &bytes[UTF8_BOM.len()..] } else { bytes };

    let mut lines = body.split_inclusive(|&b| b == b'\n');
    let mut cookie = None;
    if let Some(first) = lines.next() {
        cookie = find_cookie(first);
        if cookie.is_none()
            && is_blank_or_comment(first)
            && let Some(second) = lines.next()
        {
            cookie = find_cookie(second);
        }
    }

    match (cookie, bom) {
        (None, false) => Some(Encoding::Utf8),
        (None, true) => Some(Encoding::Utf8Sig),
        (Some(name), bom) => {
            let encoding = Encoding::from_cookie(&name)?;
            match (encoding, bom) {
                (Encoding::Utf8, true) => Some(Encoding::Utf8Sig),
                (_, true) => None,
                (encoding, false) => Some(encoding),
            }
        }
    }
}

/// Match `^[ \t\f]*#.*?coding[:=][ \t]*([-\w.]+)` on one line.
fn find_cookie(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let rest = line.trim_start_matches([' ', '\t', '\x0c']);
    let comment = rest.strip_prefix('#')?;
    let mut search = comment;
    while let Some(at) = search.find("coding") {
        let after = &search[at + "coding".len()..];
        if let Some(value) = after.strip_prefix([':', '=']) {
            let value = value.trim_start_matches([' ', '\t']);
            let name: String = value
                .chars()
                .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
                .collect();
            if !name.is_empty() {
                return Some(name);
            }
        }
        search = after;
    }
    None
}

fn is_blank_or_comment(line: &[u8]) -> bool {
    let trimmed = line
        .iter()
        .skip_while(|b| matches!(b, b' ' | b'\t' | b'\x0c'))
        .copied()
        .next();
    matches!(trimmed, None | Some(b'#' | b'\r' | b'\n'))
}
