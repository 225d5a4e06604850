//! Name components and naming conventions.

use crate::error::{NameError, NameResult};
use std::cmp::Ordering;
use std::fmt;

/// Marker octet of a segment-number component.
const SEGMENT_MARKER: u8 = 0x00;
/// Marker octet of a version component.
const VERSION_MARKER: u8 = 0xFD;

/// One opaque component of a [`crate::Name`].
///
/// Components are ordered canonically: shorter components sort first, and
/// components of equal length compare byte-wise. This is the order used by
/// every name-keyed structure in the catalog.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Component(Vec<u8>);

impl Component {
    /// Creates a component from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Creates a segment-number component (marker `0x00`).
    pub fn segment(segment_no: u64) -> Self {
        Self::with_marker(SEGMENT_MARKER, segment_no)
    }

    /// Creates a version component (marker `0xFD`).
    pub fn version(version: u64) -> Self {
        Self::with_marker(VERSION_MARKER, version)
    }

    fn with_marker(marker: u8, number: u64) -> Self {
        let mut bytes = vec![marker];
        bytes.extend_from_slice(&encode_non_negative(number));
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the component as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Returns the component length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty component.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if this is a well-formed segment component.
    pub fn is_segment(&self) -> bool {
        self.to_segment().is_ok()
    }

    /// Decodes a segment-number component.
    pub fn to_segment(&self) -> NameResult<u64> {
        self.decode_marked(SEGMENT_MARKER, "segment")
    }

    /// Decodes a version component.
    pub fn to_version(&self) -> NameResult<u64> {
        self.decode_marked(VERSION_MARKER, "version")
    }

    fn decode_marked(&self, marker: u8, kind: &'static str) -> NameResult<u64> {
        match self.0.split_first() {
            Some((&m, rest)) if m == marker && matches!(rest.len(), 1 | 2 | 4 | 8) => {
                Ok(rest.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
            }
            _ => Err(NameError::WrongMarker(kind)),
        }
    }

    /// Writes the URI form of this component.
    ///
    /// Unreserved characters are written verbatim, everything else is
    /// percent-encoded. Period-only components gain three extra periods.
    pub(crate) fn write_uri(&self, out: &mut String) {
        if self.0.iter().all(|b| *b == b'.') {
            out.push_str("...");
            for _ in 0..self.0.len() {
                out.push('.');
            }
            return;
        }
        for &b in &self.0 {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
                out.push(char::from(b));
            } else {
                out.push_str(&format!("%{b:02X}"));
            }
        }
    }

    /// Parses the URI form of a component.
    pub fn from_uri(text: &str) -> NameResult<Self> {
        if !text.is_empty() && text.bytes().all(|b| b == b'.') {
            if text.len() < 3 {
                return Err(NameError::IllegalPeriods(text.to_string()));
            }
            return Ok(Self(vec![b'.'; text.len() - 3]));
        }

        let bytes = text.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| NameError::InvalidEscape {
                        component: text.to_string(),
                    })?;
                out.push(hex);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        Ok(Self(out))
    }

    /// Returns the URI form of this component.
    pub fn to_uri(&self) -> String {
        let mut out = String::new();
        self.write_uri(&mut out);
        out
    }
}

/// Encodes a non-negative integer in 1, 2, 4 or 8 big-endian bytes.
fn encode_non_negative(number: u64) -> Vec<u8> {
    if number <= u64::from(u8::MAX) {
        vec![number as u8]
    } else if number <= u64::from(u16::MAX) {
        (number as u16).to_be_bytes().to_vec()
    } else if number <= u64::from(u32::MAX) {
        (number as u32).to_be_bytes().to_vec()
    } else {
        number.to_be_bytes().to_vec()
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Component {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Component {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_encoding_matches_convention() {
        assert_eq!(Component::segment(1).to_uri(), "%00%01");
        assert_eq!(Component::segment(2).to_uri(), "%00%02");
        assert_eq!(Component::segment(256).as_bytes(), &[0x00, 0x01, 0x00]);
        assert_eq!(Component::segment(70_000).len(), 5);
    }

    #[test]
    fn segment_roundtrip_and_marker_check() {
        for n in [0u64, 1, 255, 256, 65_535, 65_536, u64::from(u32::MAX) + 1] {
            assert_eq!(Component::segment(n).to_segment().unwrap(), n);
        }
        assert!(Component::from("OK").to_segment().is_err());
        assert!(Component::version(3).to_segment().is_err());
        assert_eq!(Component::version(3).to_version().unwrap(), 3);
    }

    #[test]
    fn uri_escaping() {
        let json = Component::from("{\"activity\":\"X\"}");
        assert_eq!(json.to_uri(), "%7B%22activity%22%3A%22X%22%7D");
        assert_eq!(Component::from_uri(&json.to_uri()).unwrap(), json);
    }

    #[test]
    fn period_components() {
        assert_eq!(Component::new(Vec::new()).to_uri(), "...");
        assert_eq!(Component::from_uri("...").unwrap(), Component::new(Vec::new()));
        assert_eq!(Component::from_uri("....").unwrap(), Component::from("."));
        assert!(Component::from_uri("..").is_err());
    }

    #[test]
    fn bad_escape_rejected() {
        assert!(Component::from_uri("%G1").is_err());
        assert!(Component::from_uri("abc%4").is_err());
    }

    #[test]
    fn canonical_order() {
        assert!(Component::from("z") < Component::from("aa"));
        assert!(Component::from("ab") < Component::from("ac"));
        assert!(Component::segment(2) < Component::segment(10));
    }
}
