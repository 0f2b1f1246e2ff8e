//! RESP wire codec.
//!
//! - `types`: the `RespValue` sum type and its encoder
//! - `parser`: the bounded, recursive-descent decoder
//! - `request`: turning a decoded array into a `Request`
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{parse_request, RespValue};
//!
//! let (request, consumed) = parse_request(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(request.command, "GET");
//! assert_eq!(consumed, 23);
//!
//! let reply = RespValue::bulk_string("ember");
//! assert_eq!(reply.serialize(), b"$5\r\nember\r\n");
//! ```

pub mod parser;
pub mod request;
pub mod types;

pub use parser::{decode, parse_message, ParseError, ParseResult, RespParser};
pub use request::{parse_request, Request};
pub use types::RespValue;
