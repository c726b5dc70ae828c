//! Envelope framing and completeness detection.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{WireError, WireResult};

/// Tag of the outer application envelope.
pub const ENVELOPE_TAG: &str = "ds";

/// Maximum number of decimal digits in a length field.
///
/// Caps a single envelope below 10 GB; anything longer is malformed.
pub const MAX_LENGTH_DIGITS: usize = 10;

const DELIMITER: u8 = b':';

/// Outcome of [`try_detect_length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The header is well formed so far but not yet complete.
    NeedMore,
    /// The bytes can never form a valid envelope with this tag.
    Malformed,
    /// Total envelope length in bytes, header included.
    Length(usize),
}

/// Outcome of [`is_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// More bytes are needed.
    Incomplete,
    /// Bad header, or bytes past the end of the envelope.
    Malformed,
    /// The buffer holds exactly one envelope.
    Exact,
}

/// A payload borrowed from a framed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unframed<'a> {
    /// Payload bytes.
    pub payload: &'a [u8],
    /// Bytes consumed from the buffer (header plus payload).
    pub consumed: usize,
}

enum Header {
    NeedMore,
    Malformed,
    Parsed {
        header_len: usize,
        payload_len: usize,
    },
}

/// Parses `<tag>:<digits>:` at the start of `buf`.
fn parse_header(tag: &[u8], buf: &[u8]) -> Header {
    let prefix_len = buf.len().min(tag.len());
    if buf[..prefix_len] != tag[..prefix_len] {
        return Header::Malformed;
    }
    if buf.len() <= tag.len() {
        return Header::NeedMore;
    }
    if buf[tag.len()] != DELIMITER {
        return Header::Malformed;
    }

    let digits_start = tag.len() + 1;
    let rest = &buf[digits_start..];
    // One extra byte so an 11th digit is seen instead of waiting for more.
    let window = &rest[..rest.len().min(MAX_LENGTH_DIGITS + 1)];

    let Some(digits_len) = window.iter().position(|&b| b == DELIMITER) else {
        if window.len() > MAX_LENGTH_DIGITS || !window.iter().all(u8::is_ascii_digit) {
            return Header::Malformed;
        }
        return Header::NeedMore;
    };

    let digits = &window[..digits_len];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Header::Malformed;
    }

    let payload_len = digits
        .iter()
        .fold(0u64, |acc, &d| acc * 10 + u64::from(d - b'0'));
    let header_len = digits_start + digits_len + 1;

    match usize::try_from(payload_len) {
        Ok(payload_len) if header_len.checked_add(payload_len).is_some() => Header::Parsed {
            header_len,
            payload_len,
        },
        _ => Header::Malformed,
    }
}

/// Frames `payload` under `tag`: `tag ":" len ":" payload`.
pub fn frame(tag: &str, payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(tag.len() + MAX_LENGTH_DIGITS + 2 + payload.len());
    frame_into(tag, payload, &mut dst);
    dst.freeze()
}

/// Appends the framed `payload` to `dst`.
pub fn frame_into(tag: &str, payload: &[u8], dst: &mut BytesMut) {
    let length = payload.len().to_string();
    dst.reserve(tag.len() + length.len() + 2 + payload.len());
    dst.put_slice(tag.as_bytes());
    dst.put_u8(DELIMITER);
    dst.put_slice(length.as_bytes());
    dst.put_u8(DELIMITER);
    dst.put_slice(payload);
}

/// Determines the total length of the envelope starting at `buf`.
///
/// Only the header is inspected, so this can be called on a partially
/// received envelope.
pub fn try_detect_length(tag: &str, buf: &[u8]) -> Detection {
    match parse_header(tag.as_bytes(), buf) {
        Header::NeedMore => Detection::NeedMore,
        Header::Malformed => {
            trace!(tag, buffered = buf.len(), "malformed envelope header");
            Detection::Malformed
        }
        Header::Parsed {
            header_len,
            payload_len,
        } => Detection::Length(header_len + payload_len),
    }
}

/// Compares the buffered byte count with the detected envelope length.
pub fn is_complete(tag: &str, buf: &[u8]) -> Completeness {
    match try_detect_length(tag, buf) {
        Detection::NeedMore => Completeness::Incomplete,
        Detection::Malformed => Completeness::Malformed,
        Detection::Length(total) if buf.len() < total => Completeness::Incomplete,
        Detection::Length(total) if buf.len() > total => {
            trace!(tag, total, buffered = buf.len(), "trailing bytes after envelope");
            Completeness::Malformed
        }
        Detection::Length(_) => Completeness::Exact,
    }
}

/// Extracts the payload of the envelope at the start of `buf`.
///
/// Bytes after the envelope are left alone and reported through
/// [`Unframed::consumed`].
pub fn unframe<'a>(tag: &str, buf: &'a [u8]) -> WireResult<Unframed<'a>> {
    let tag_bytes = tag.as_bytes();
    if !buf.starts_with(tag_bytes) {
        if tag_bytes.starts_with(buf) {
            return Err(WireError::IncompleteHeader);
        }
        return Err(WireError::TagMismatch {
            expected: tag.to_string(),
        });
    }

    match parse_header(tag_bytes, buf) {
        Header::NeedMore => Err(WireError::IncompleteHeader),
        Header::Malformed => Err(WireError::MalformedHeader),
        Header::Parsed {
            header_len,
            payload_len,
        } => {
            let available = buf.len() - header_len;
            if payload_len > available {
                return Err(WireError::Truncated {
                    declared: payload_len,
                    available,
                });
            }
            Ok(Unframed {
                payload: &buf[header_len..header_len + payload_len],
                consumed: header_len + payload_len,
            })
        }
    }
}

/// Like [`unframe`], but the envelope must span the whole buffer.
pub fn unframe_exact<'a>(tag: &str, buf: &'a [u8]) -> WireResult<&'a [u8]> {
    let unframed = unframe(tag, buf)?;
    if unframed.consumed != buf.len() {
        return Err(WireError::TrailingBytes(buf.len() - unframed.consumed));
    }
    Ok(unframed.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn frame_layout() {
        assert_eq!(&frame("ds", b"PING\0")[..], b"ds:5:PING\0");
        assert_eq!(&frame("redis", b"")[..], b"redis:0:");
    }

    #[test]
    fn frame_into_appends() {
        let mut dst = BytesMut::from(&b"redis:3:OK\0"[..]);
        frame_into("mem", b"1", &mut dst);
        assert_eq!(&dst[..], b"redis:3:OK\0mem:1:1");
    }

    #[test_case(b"" ; "empty buffer")]
    #[test_case(b"d" ; "partial tag")]
    #[test_case(b"ds" ; "tag only")]
    #[test_case(b"ds:" ; "first delimiter")]
    #[test_case(b"ds:12" ; "partial length")]
    #[test_case(b"ds:1234567890" ; "ten digits without delimiter")]
    fn detect_needs_more(buf: &[u8]) {
        assert_eq!(try_detect_length("ds", buf), Detection::NeedMore);
    }

    #[test_case(b"x" ; "wrong first byte")]
    #[test_case(b"dx:5:" ; "wrong tag")]
    #[test_case(b"dsx:5:" ; "longer tag")]
    #[test_case(b"ds::" ; "empty length")]
    #[test_case(b"ds:5a:" ; "non digit length")]
    #[test_case(b"ds:-5:" ; "negative length")]
    #[test_case(b"ds:12345678901" ; "eleven digits")]
    #[test_case(b"ds:12345678901:" ; "eleven digits terminated")]
    fn detect_malformed(buf: &[u8]) {
        assert_eq!(try_detect_length("ds", buf), Detection::Malformed);
    }

    #[test]
    fn detect_length_counts_header() {
        assert_eq!(try_detect_length("ds", b"ds:5:"), Detection::Length(10));
        assert_eq!(try_detect_length("ds", b"ds:0:"), Detection::Length(5));
        assert_eq!(
            try_detect_length("ds", b"ds:9999999999:"),
            Detection::Length(14 + 9_999_999_999)
        );
    }

    #[test]
    fn payload_may_contain_delimiters() {
        let framed = frame("ds", b"a:b:c");
        assert_eq!(is_complete("ds", &framed), Completeness::Exact);
        assert_eq!(unframe_exact("ds", &framed).unwrap(), b"a:b:c");
    }

    #[test]
    fn completeness_by_size() {
        assert_eq!(is_complete("ds", b"ds:5:PI"), Completeness::Incomplete);
        assert_eq!(is_complete("ds", b"ds:5:PING\0"), Completeness::Exact);
        assert_eq!(is_complete("ds", b"ds:5:PING\0x"), Completeness::Malformed);
    }

    #[test]
    fn every_prefix_of_an_envelope_is_incomplete() {
        let framed = frame("ds", b"SET key value\0");
        for end in 0..framed.len() {
            assert_eq!(
                is_complete("ds", &framed[..end]),
                Completeness::Incomplete,
                "prefix of length {end}"
            );
        }
    }

    #[test]
    fn unframe_reports_consumed() {
        let buf = b"ds:2:okTRAILER";
        let unframed = unframe("ds", buf).unwrap();
        assert_eq!(unframed.payload, b"ok");
        assert_eq!(unframed.consumed, 7);
    }

    #[test]
    fn unframe_rejects_truncated_payload() {
        assert!(matches!(
            unframe("ds", b"ds:10:short"),
            Err(WireError::Truncated {
                declared: 10,
                available: 5
            })
        ));
    }

    #[test]
    fn unframe_rejects_wrong_tag() {
        assert!(matches!(
            unframe("ds", b"xx:1:a"),
            Err(WireError::TagMismatch { .. })
        ));
        assert!(matches!(
            unframe("ds", b"d"),
            Err(WireError::IncompleteHeader)
        ));
    }

    #[test]
    fn unframe_exact_rejects_trailing_bytes() {
        assert!(matches!(
            unframe_exact("ds", b"ds:1:ab"),
            Err(WireError::TrailingBytes(1))
        ));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn tag_strategy() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_unframe_inverts_frame(
            tag in tag_strategy(),
            payload in prop::collection::vec(any::<u8>(), 0..2048)
        ) {
            let framed = frame(&tag, &payload);
            prop_assert_eq!(unframe_exact(&tag, &framed).unwrap(), &payload[..]);
            prop_assert_eq!(try_detect_length(&tag, &framed), Detection::Length(framed.len()));
        }

        #[test]
        fn prop_short_buffers_are_incomplete(
            payload in prop::collection::vec(any::<u8>(), 0..512),
            cut in any::<prop::sample::Index>()
        ) {
            let framed = frame(ENVELOPE_TAG, &payload);
            let end = cut.index(framed.len());
            prop_assert_eq!(is_complete(ENVELOPE_TAG, &framed[..end]), Completeness::Incomplete);
        }

        #[test]
        fn prop_foreign_tags_are_malformed(
            tag in tag_strategy(),
            payload in prop::collection::vec(any::<u8>(), 0..64)
        ) {
            prop_assume!(tag != ENVELOPE_TAG);
            let framed = frame(&tag, &payload);
            prop_assert_eq!(is_complete(ENVELOPE_TAG, &framed), Completeness::Malformed);
        }

        #[test]
        fn prop_overlong_length_is_malformed(digits in "[0-9]{11,16}") {
            let header = format!("ds:{digits}:");
            prop_assert_eq!(is_complete(ENVELOPE_TAG, header.as_bytes()), Completeness::Malformed);
        }
    }
}
