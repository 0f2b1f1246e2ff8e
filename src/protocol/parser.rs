//! Bounded RESP decoder.
//!
//! Decoding is recursive descent on the tag byte. Every decode step reports
//! how many bytes it consumed, so array decoding can walk its children with a
//! cursor instead of re-scanning the input.
//!
//! The parser never indexes past the end of its input. Callers get one of
//! three outcomes:
//!
//! - `Ok(Some((value, consumed)))`: a complete value was decoded
//! - `Ok(None)`: the input is a valid prefix, more bytes are needed
//! - `Err(ParseError)`: the input can never become valid; drop the client
//!
//! Length and count fields are attacker controlled, so they are range checked
//! before anything is allocated.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors produced while decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame is a valid prefix but is not complete yet
    #[error("incomplete frame")]
    Incomplete,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Integer or length field is not `[+|-]digits` or overflows i64
    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Negative bulk length other than -1
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array count other than -1
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Framing violation (missing CRLF, nesting too deep, ...)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A length field exceeds the configured maximum
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The value decoded fine but is not a command
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
}

impl ParseError {
    /// True when waiting for more bytes could still produce a valid frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MiB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Smallest encoding of any value (`+\r\n`). Bounds array pre-allocation by
/// what the buffer can actually hold.
const MIN_VALUE_LEN: usize = 3;

/// A stateless-between-calls RESP decoder.
///
/// # Example
///
/// ```
/// use emberkv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser
///     .parse(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(consumed, 22);
/// assert!(value.as_bytes().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decodes the first value in `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        match tag {
            prefix::SIMPLE_STRING => {
                parse_text(buf, "simple string").map(|o| o.map(|(s, n)| (RespValue::SimpleString(s), n)))
            }
            prefix::ERROR => {
                parse_text(buf, "error").map(|o| o.map(|(s, n)| (RespValue::Error(s), n)))
            }
            prefix::INTEGER => {
                parse_number_line(buf).map(|o| o.map(|(n, used)| (RespValue::Integer(n), used)))
            }
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header) = match parse_number_line(buf)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = usize::try_from(length).map_err(|_| ParseError::InvalidBulkLength(length))?;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let end = header + length;
        let total = end + CRLF.len();
        if buf.len() < total {
            return Ok(None);
        }
        if &buf[end..total] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..end]);
        Ok(Some((RespValue::BulkString(data), total)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, header) = match parse_number_line(buf)? {
            Some(v) => v,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = usize::try_from(count).map_err(|_| ParseError::InvalidArrayLength(count))?;
        if count > MAX_ARRAY_LEN {
            return Err(ParseError::MessageTooLarge {
                size: count,
                max: MAX_ARRAY_LEN,
            });
        }

        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        let available = buf.len().saturating_sub(header) / MIN_VALUE_LEN;
        let mut elements = Vec::with_capacity(count.min(available));
        let mut consumed = header;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Finds the first CRLF in `buf`, returning the index of `\r`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while let Some(i) = memchr::memchr(b'\r', &buf[offset..]) {
        let pos = offset + i;
        match buf.get(pos + 1) {
            Some(b'\n') => return Some(pos),
            Some(_) => offset = pos + 1,
            None => return None,
        }
    }
    None
}

/// Decodes the `<text>\r\n` body shared by `+` and `-`.
fn parse_text(buf: &[u8], what: &'static str) -> ParseResult<Option<(String, usize)>> {
    let Some(pos) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + pos]).map_err(|_| ParseError::InvalidUtf8(what))?;
    Ok(Some((text.to_string(), 1 + pos + CRLF.len())))
}

/// Decodes the `<tag>[+|-]<digits>\r\n` line shared by `:`, `$` and `*`.
fn parse_number_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let body = &buf[1..];
    match find_crlf(body) {
        Some(pos) => Ok(Some((parse_i64(&body[..pos])?, 1 + pos + CRLF.len()))),
        None => {
            // Reject garbage early instead of waiting for a CRLF that may never come.
            let digits = body.strip_prefix(b"-").or_else(|| body.strip_prefix(b"+")).unwrap_or(body);
            let digits = digits.strip_suffix(b"\r").unwrap_or(digits);
            if digits.iter().all(u8::is_ascii_digit) && digits.len() <= 19 {
                Ok(None)
            } else {
                Err(ParseError::InvalidInteger(String::from_utf8_lossy(body).into_owned()))
            }
        }
    }
}

/// Parses `[+|-]<digits>` with overflow checking.
fn parse_i64(raw: &[u8]) -> ParseResult<i64> {
    let invalid = || ParseError::InvalidInteger(String::from_utf8_lossy(raw).into_owned());

    let (negative, digits) = match raw.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, raw),
    };
    if digits.is_empty() {
        return Err(invalid());
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(invalid());
        }
        let digit = i64::from(b - b'0');
        // Accumulate towards the sign so i64::MIN is representable.
        value = value.checked_mul(10).ok_or_else(invalid)?;
        value = if negative {
            value.checked_sub(digit)
        } else {
            value.checked_add(digit)
        }
        .ok_or_else(invalid)?;
    }
    Ok(value)
}

/// Decodes one value, reporting a short buffer as [`ParseError::Incomplete`].
///
/// Returns the value and the number of bytes it occupied.
pub fn decode(buf: &[u8]) -> ParseResult<(RespValue, usize)> {
    RespParser::new().parse(buf)?.ok_or(ParseError::Incomplete)
}

/// Decodes one value, with incomplete input reported as `Ok(None)`.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
