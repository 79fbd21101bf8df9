//! Byte-range framing: the `Content-Range` header sent with every chunk and
//! the `Range` header the server returns with `308 Resume Incomplete`.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// Framing header for a chunk request.
///
/// Offsets are inclusive, as on the wire: a chunk starting at `start` with
/// `len` bytes renders as `bytes start-(start+len-1)/total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// A non-empty byte range of the object.
    Bytes { start: u64, end: u64, total: u64 },
    /// No bytes in this request (`bytes */total`): status query or the
    /// finalize request of a zero-length object.
    Unknown { total: u64 },
}

impl ContentRange {
    /// Framing for a chunk of `len` bytes at `start`. An empty chunk has no
    /// inclusive end offset and renders as `bytes */total`.
    pub fn for_chunk(start: u64, len: u64, total: u64) -> Self {
        if len == 0 {
            Self::Unknown { total }
        } else {
            Self::Bytes {
                start,
                end: start + len - 1,
                total,
            }
        }
    }

    /// Framing for an empty request that asks the server how many bytes it has.
    pub fn status_query(total: u64) -> Self {
        Self::Unknown { total }
    }

    /// Number of body bytes this header declares.
    pub fn body_len(&self) -> u64 {
        match *self {
            Self::Bytes { start, end, .. } => end - start + 1,
            Self::Unknown { .. } => 0,
        }
    }

    pub fn total(&self) -> u64 {
        match *self {
            Self::Bytes { total, .. } | Self::Unknown { total } => total,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { start, end, total } => write!(f, "bytes {start}-{end}/{total}"),
            Self::Unknown { total } => write!(f, "bytes */{total}"),
        }
    }
}

impl FromStr for ContentRange {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ProtocolError::MalformedContentRange(s.to_string());

        let spec = s.trim().strip_prefix("bytes ").ok_or_else(malformed)?;
        let (range, total) = spec.split_once('/').ok_or_else(malformed)?;
        let total: u64 = total.parse().map_err(|_| malformed())?;

        if range == "*" {
            return Ok(Self::Unknown { total });
        }

        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        let start: u64 = start.parse().map_err(|_| malformed())?;
        let end: u64 = end.parse().map_err(|_| malformed())?;
        if end < start || end >= total {
            return Err(malformed());
        }
        Ok(Self::Bytes { start, end, total })
    }
}

/// Parses the server's `Range: bytes=0-<n>` header and returns the next
/// offset the server expects (`n + 1`).
///
/// The server always reports a prefix of the object, so a range that does not
/// start at zero is rejected.
pub fn parse_acknowledged_range(value: &str) -> Result<u64, ProtocolError> {
    let malformed = || ProtocolError::MalformedRange(value.to_string());

    let spec = value.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    if start != "0" {
        return Err(malformed());
    }
    let end: u64 = end.parse().map_err(|_| malformed())?;
    end.checked_add(1).ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_starts_at_zero() {
        let r = ContentRange::for_chunk(0, 262_144, 300_000);
        assert_eq!(r.to_string(), "bytes 0-262143/300000");
        assert_eq!(r.body_len(), 262_144);
    }

    #[test]
    fn last_chunk_ends_at_total_minus_one() {
        let r = ContentRange::for_chunk(262_144, 37_856, 300_000);
        assert_eq!(r.to_string(), "bytes 262144-299999/300000");
        assert_eq!(r.body_len(), 37_856);
    }

    #[test]
    fn single_byte_chunk() {
        let r = ContentRange::for_chunk(9, 1, 10);
        assert_eq!(r.to_string(), "bytes 9-9/10");
        assert_eq!(r.body_len(), 1);
    }

    #[test]
    fn empty_chunk_renders_unknown_range() {
        let r = ContentRange::for_chunk(0, 0, 0);
        assert_eq!(r, ContentRange::Unknown { total: 0 });
        assert_eq!(r.to_string(), "bytes */0");
        assert_eq!(r.body_len(), 0);
    }

    #[test]
    fn status_query_renders_unknown_range() {
        assert_eq!(ContentRange::status_query(1234).to_string(), "bytes */1234");
    }

    #[test]
    fn parse_content_range() {
        let r: ContentRange = "bytes 262144-299999/300000".parse().unwrap();
        assert_eq!(
            r,
            ContentRange::Bytes {
                start: 262_144,
                end: 299_999,
                total: 300_000
            }
        );
        let r: ContentRange = "bytes */42".parse().unwrap();
        assert_eq!(r, ContentRange::Unknown { total: 42 });
        assert_eq!(r.total(), 42);
    }

    #[test]
    fn parse_content_range_rejects_garbage() {
        for bad in [
            "",
            "bytes",
            "bytes 0-9",
            "bytes 5-4/10",
            "bytes 0-10/10",
            "items 0-9/10",
            "bytes a-b/c",
        ] {
            assert!(bad.parse::<ContentRange>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn acknowledged_range_returns_next_offset() {
        assert_eq!(parse_acknowledged_range("bytes=0-262143").unwrap(), 262_144);
        assert_eq!(parse_acknowledged_range("bytes=0-0").unwrap(), 1);
        assert_eq!(parse_acknowledged_range(" bytes=0-99 ").unwrap(), 100);
    }

    #[test]
    fn acknowledged_range_must_be_a_prefix() {
        assert!(matches!(
            parse_acknowledged_range("bytes=10-99"),
            Err(ProtocolError::MalformedRange(_))
        ));
        assert!(parse_acknowledged_range("bytes 0-99").is_err());
        assert!(parse_acknowledged_range("bytes=0-").is_err());
        assert!(parse_acknowledged_range(&format!("bytes=0-{}", u64::MAX)).is_err());
    }
}
