//! Client requests.
//!
//! A request on the wire is an array of bulk strings. The first element names
//! the command and is upper-cased; the rest are passed to the handler as
//! binary-safe arguments.

use crate::protocol::parser::{ParseError, ParseResult, RespParser};
use crate::protocol::types::RespValue;
use bytes::Bytes;

/// A decoded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-cased command name, e.g. `GET`
    pub command: String,
    /// Arguments in wire order
    pub args: Vec<Bytes>,
}

impl Request {
    pub fn new(command: impl Into<String>, args: Vec<Bytes>) -> Self {
        let mut command = command.into();
        command.make_ascii_uppercase();
        Self { command, args }
    }

    /// Converts a decoded value into a request.
    ///
    /// Fails unless `value` is a non-empty array of bulk strings whose first
    /// element is valid UTF-8.
    pub fn from_value(value: RespValue) -> ParseResult<Self> {
        let RespValue::Array(items) = value else {
            return Err(ParseError::InvalidRequest("request must be an array"));
        };

        let mut parts = items.into_iter();
        let name = match parts.next() {
            Some(RespValue::BulkString(b)) => b,
            Some(_) => return Err(ParseError::InvalidRequest("request elements must be bulk strings")),
            None => return Err(ParseError::InvalidRequest("empty request")),
        };
        let name = std::str::from_utf8(&name).map_err(|_| ParseError::InvalidUtf8("command name"))?;

        let args = parts
            .map(|part| match part {
                RespValue::BulkString(b) => Ok(b),
                _ => Err(ParseError::InvalidRequest("request elements must be bulk strings")),
            })
            .collect::<ParseResult<Vec<_>>>()?;

        Ok(Request::new(name, args))
    }

    /// Encodes the request the way a client would send it.
    pub fn to_value(&self) -> RespValue {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(RespValue::bulk_string(Bytes::from(self.command.clone())));
        items.extend(self.args.iter().cloned().map(RespValue::BulkString));
        RespValue::Array(items)
    }
}

/// Decodes one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied. A short buffer is
/// reported as [`ParseError::Incomplete`].
///
/// # Example
///
/// ```
/// use emberkv::protocol::parse_request;
///
/// let (req, consumed) = parse_request(b"*2\r\n$3\r\nget\r\n$1\r\nx\r\n").unwrap();
/// assert_eq!(req.command, "GET");
/// assert_eq!(req.args, vec![bytes::Bytes::from("x")]);
/// assert_eq!(consumed, 20);
/// ```
pub fn parse_request(buf: &[u8]) -> ParseResult<(Request, usize)> {
    let (value, consumed) = RespParser::new().parse(buf)?.ok_or(ParseError::Incomplete)?;
    Ok((Request::from_value(value)?, consumed))
}
