//! Parsing and validation of multishot upload range parameters.
//!
//! Ranged uploads carry `Content-Range: bytes <start>-<end>/*` plus a
//! `Content-Length` that caps how many bytes one call may write. This module
//! is a pure parser; it never touches the filesystem.

/// Inclusive byte window of one ranged upload call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes the window covers.
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RangeError {
    MalformedContentRange,
    MalformedLength,
    InvalidRange,
}

/// Range invariant: both bounds non-negative and `start <= end`.
pub fn validate_range(start: i64, end: i64) -> bool {
    end >= start && end >= 0 && start >= 0
}

/// Parses a `Content-Range` value of the shape `bytes <start>-<end>/*`.
/// The total after the `/` is ignored (the protocol always sends `*`).
pub fn parse_content_range(value: &str) -> Result<ByteRange, RangeError> {
    let rest = value
        .trim()
        .strip_prefix("bytes ")
        .ok_or(RangeError::MalformedContentRange)?;
    let window = rest.split('/').next().unwrap_or(rest);
    let (start_part, end_part) = window
        .split_once('-')
        .ok_or(RangeError::MalformedContentRange)?;
    let start: i64 = start_part
        .trim()
        .parse()
        .map_err(|_| RangeError::MalformedContentRange)?;
    let end: i64 = end_part
        .trim()
        .parse()
        .map_err(|_| RangeError::MalformedContentRange)?;

    if !validate_range(start, end) {
        return Err(RangeError::InvalidRange);
    }
    Ok(ByteRange {
        start: start as u64,
        end: end as u64,
    })
}

/// Parses the declared body length; negative values are rejected.
pub fn parse_transfer_length(value: &str) -> Result<u64, RangeError> {
    let length: i64 = value
        .trim()
        .parse()
        .map_err(|_| RangeError::MalformedLength)?;
    if length < 0 {
        return Err(RangeError::MalformedLength);
    }
    Ok(length as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_range_accepts_ordered_pairs() {
        assert!(validate_range(0, 0));
        assert!(validate_range(0, 9));
        assert!(validate_range(10, 19));
    }

    #[test]
    fn validate_range_rejects_inverted_and_negative() {
        assert!(!validate_range(5, 4));
        assert!(!validate_range(-1, 3));
        assert!(!validate_range(0, -1));
        assert!(!validate_range(-7, -2));
    }

    #[test]
    fn parses_literal_syntax() {
        let range = parse_content_range("bytes 0-9/*").expect("parse");
        assert_eq!(range, ByteRange { start: 0, end: 9 });
        assert_eq!(range.span(), 10);
    }

    #[test]
    fn parses_without_caring_about_the_total() {
        let range = parse_content_range("bytes 10-19/1234").expect("parse");
        assert_eq!(range, ByteRange { start: 10, end: 19 });
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(
            parse_content_range("0-9/*"),
            Err(RangeError::MalformedContentRange)
        );
    }

    #[test]
    fn rejects_non_numeric_bounds() {
        assert_eq!(
            parse_content_range("bytes a-9/*"),
            Err(RangeError::MalformedContentRange)
        );
        assert_eq!(
            parse_content_range("bytes 0-b/*"),
            Err(RangeError::MalformedContentRange)
        );
    }

    #[test]
    fn rejects_inverted_window() {
        assert_eq!(
            parse_content_range("bytes 9-0/*"),
            Err(RangeError::InvalidRange)
        );
    }

    #[test]
    fn transfer_length_parses_and_rejects_negatives() {
        assert_eq!(parse_transfer_length("10"), Ok(10));
        assert_eq!(parse_transfer_length(" 0 "), Ok(0));
        assert_eq!(
            parse_transfer_length("-3"),
            Err(RangeError::MalformedLength)
        );
        assert_eq!(
            parse_transfer_length("ten"),
            Err(RangeError::MalformedLength)
        );
    }
}
