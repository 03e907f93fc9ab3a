//! Stockroom Line Protocol
//!
//! This module implements the wire format spoken between clients and the
//! Stockroom server.
//!
//! ## Overview
//!
//! The protocol is a small, line-oriented text protocol: one request line in,
//! one response line out. There is no general RPC envelope; each command has
//! its own payload shape, validated by the command dispatcher.
//!
//! ## Modules
//!
//! - `types`: Defines `Request`, `Response`, `Status` and the delimiters
//! - `parser`: Pure decoding functions for request lines and payloads
//!
//! ## Example
//!
//! ```
//! use stockroom::protocol::{parse_request, split_fields, Response};
//!
//! // Decoding an incoming line
//! let request = parse_request("LOGIN::alice@example.com|s3cret").unwrap();
//! let fields = split_fields(request.data, 2).unwrap();
//! assert_eq!(fields, vec!["alice@example.com", "s3cret"]);
//!
//! // Creating a response
//! let response = Response::success("Alice|admin");
//! assert_eq!(response.serialize(), "SUCCESS|Alice|admin");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{
    find_line_end, join_batch, join_records, parse_request, split_fields, split_keys,
    split_records, ParseError, ParseResult,
};
pub use types::{
    Request, Response, Status, COMMAND_SEPARATOR, FIELD_DELIMITER, KEY_SEPARATOR,
    LINE_TERMINATOR, LIST_SEPARATOR, RECORD_SEPARATOR,
};
