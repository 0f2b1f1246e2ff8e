//! Reply and request values of the wire protocol.
//!
//! Every value on the wire starts with a one-byte tag:
//!
//! | Tag | Shape                          | Variant          |
//! |-----|--------------------------------|------------------|
//! | `+` | `+<text>\r\n`                  | `SimpleString`   |
//! | `-` | `-<text>\r\n`                  | `Error`          |
//! | `:` | `:[+\|-]<digits>\r\n`          | `Integer`        |
//! | `$` | `$<len>\r\n<len bytes>\r\n`    | `BulkString`     |
//! | `*` | `*<count>\r\n<count values>`   | `Array`          |
//!
//! `$-1\r\n` (and `*-1\r\n` on input) is the nil reply, modelled as `Null`.

use bytes::Bytes;
use std::fmt;

/// Line terminator for every non-bulk frame.
pub const CRLF: &[u8] = b"\r\n";

/// The nil reply as it appears on the wire.
pub const NIL: &[u8] = b"$-1\r\n";

/// Tag bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single protocol value.
///
/// Replies built by command handlers and requests decoded from clients share
/// this type. Arrays nest arbitrarily, so an array of string arrays or a mixed
/// array are both plain `Array`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply. Must not contain CR or LF.
    SimpleString(String),

    /// Error reply, conventionally `ERR <message>` or `<KIND> <message>`.
    Error(String),

    /// Signed 64-bit integer.
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    BulkString(Bytes),

    /// The nil bulk string.
    Null,

    /// Ordered, possibly heterogeneous, possibly nested values.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a bulk string reply.
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let reply = RespValue::bulk_string(Bytes::from("hello"));
    /// assert_eq!(reply.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Creates a string reply, choosing the wire form with `simple`.
    ///
    /// `simple = true` yields a status reply (`+OK\r\n`), otherwise a
    /// length-prefixed bulk string (`$2\r\nOK\r\n`).
    ///
    /// # Example
    /// ```
    /// use emberkv::protocol::types::RespValue;
    /// assert_eq!(RespValue::string("OK", true).serialize(), b"+OK\r\n");
    /// assert_eq!(RespValue::string("OK", false).serialize(), b"$2\r\nOK\r\n");
    /// ```
    pub fn string(s: impl Into<String>, simple: bool) -> Self {
        if simple {
            RespValue::SimpleString(s.into())
        } else {
            RespValue::BulkString(Bytes::from(s.into()))
        }
    }

    /// Creates an array of bulk strings.
    pub fn string_array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(items.into_iter().map(|item| RespValue::BulkString(item.into())).collect())
    }

    /// Creates an array whose elements are arrays of bulk strings.
    pub fn nested_string_array<I, J, T>(rows: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(rows.into_iter().map(RespValue::string_array).collect())
    }

    /// Encodes the value into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        self.serialize_into(&mut buf);
        buf
    }

    /// Appends the encoded value to `buf`.
    ///
    /// The reactor reuses one output buffer per connection, so this is the
    /// variant on the hot path.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_text_line(buf, prefix::SIMPLE_STRING, s),
            RespValue::Error(s) => write_text_line(buf, prefix::ERROR, s),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => buf.extend_from_slice(NIL),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => s.len() + 3,
            RespValue::Integer(_) => 24,
            RespValue::BulkString(data) => data.len() + 16,
            RespValue::Null => NIL.len(),
            RespValue::Array(values) => 16 + values.len() * 16,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Borrows the payload of a bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }
}

#[inline]
fn write_line(buf: &mut Vec<u8>, tag: u8, body: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

/// Like `write_line`, but a CR or LF in `text` becomes a space so the
/// reply stays a single frame.
fn write_text_line(buf: &mut Vec<u8>, tag: u8, text: &str) {
    buf.push(tag);
    buf.extend(
        text.bytes()
            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
    );
    buf.extend_from_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
