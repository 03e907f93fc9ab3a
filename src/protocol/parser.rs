//! Request Line Parser
//!
//! Pure functions that decode the Stockroom line protocol. Nothing in this
//! module performs I/O; the session handler feeds it complete lines.
//!
//! ## Design
//!
//! 1. **Borrowing**: decoded pieces are `&str` slices of the received line,
//!    so parsing never copies request data.
//! 2. **Bounded splits**: record fields are split into at most the arity a
//!    command expects, so the *last* field of a record may itself contain `|`.
//! 3. **Reserved record separator**: bulk records are separated by ASCII RS
//!    (0x1E) rather than `;`, which is common in free text.

use crate::protocol::types::{
    Request, COMMAND_SEPARATOR, FIELD_DELIMITER, KEY_SEPARATOR, LINE_TERMINATOR, LIST_SEPARATOR,
    RECORD_SEPARATOR,
};
use thiserror::Error;

/// Errors that can occur while decoding protocol data.
///
/// The `Display` text of every variant is written for the client: it is
/// sent back verbatim inside a `FAILURE` response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The request line was empty
    #[error("Empty request.")]
    EmptyRequest,

    /// The request line had data but no command verb (`::DATA`)
    #[error("Missing command name.")]
    MissingCommand,

    /// A record did not have the number of fields the command expects
    #[error("Expected {expected} fields but received {found}.")]
    FieldCount { expected: usize, found: usize },

    /// A remove command carried no keys
    #[error("No keys supplied.")]
    EmptyKeyList,

    /// A bulk command carried no records
    #[error("No records supplied.")]
    EmptyBatch,

    /// The request was not valid UTF-8
    #[error("Request is not valid UTF-8.")]
    InvalidUtf8,

    /// A response line started with an unrecognised status token
    #[error("Unknown response status: {0}")]
    UnknownStatus(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Decodes one request line into its command and data parts.
///
/// The line is split on the *first* `::` only, so the data may itself
/// contain `::`. A line without `::` is a command with empty data. A
/// trailing `\r` (from CRLF clients) is ignored.
///
/// # Example
///
/// ```
/// use stockroom::protocol::parse_request;
///
/// let request = parse_request("LOGIN::alice@example.com|s3cret").unwrap();
/// assert_eq!(request.command, "LOGIN");
/// assert_eq!(request.data, "alice@example.com|s3cret");
/// ```
pub fn parse_request(line: &str) -> ParseResult<Request<'_>> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() {
        return Err(ParseError::EmptyRequest);
    }

    let (command, data) = line.split_once(COMMAND_SEPARATOR).unwrap_or((line, ""));
    let command = command.trim();

    if command.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    Ok(Request { command, data })
}

/// Splits a record into exactly `arity` `|`-delimited fields.
///
/// The split is bounded: once `arity - 1` delimiters have been consumed, the
/// remainder (delimiters included) is the last field.
///
/// # Example
///
/// ```
/// use stockroom::protocol::split_fields;
///
/// let fields = split_fields("a|b|c|d", 3).unwrap();
/// assert_eq!(fields, vec!["a", "b", "c|d"]);
/// ```
pub fn split_fields(record: &str, arity: usize) -> ParseResult<Vec<&str>> {
    let fields: Vec<&str> = record.splitn(arity, FIELD_DELIMITER).collect();

    if fields.len() != arity {
        return Err(ParseError::FieldCount {
            expected: arity,
            found: fields.len(),
        });
    }

    Ok(fields)
}

/// Splits a bulk payload into its RS-separated records.
///
/// Empty records (e.g. from a trailing separator) are skipped. A payload
/// with no records at all is an error.
pub fn split_records(data: &str) -> ParseResult<Vec<&str>> {
    let records: Vec<&str> = data
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .collect();

    if records.is_empty() {
        return Err(ParseError::EmptyBatch);
    }

    Ok(records)
}

/// Splits a comma-joined key list, trimming whitespace and skipping blanks.
pub fn split_keys(data: &str) -> ParseResult<Vec<&str>> {
    let keys: Vec<&str> = data
        .split(KEY_SEPARATOR)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .collect();

    if keys.is_empty() {
        return Err(ParseError::EmptyKeyList);
    }

    Ok(keys)
}

/// Joins serialized records with the list separator for a read-all payload.
pub fn join_records<I>(records: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut payload = String::new();
    for (i, record) in records.into_iter().enumerate() {
        if i > 0 {
            payload.push(LIST_SEPARATOR);
        }
        payload.push_str(&record);
    }
    payload
}

/// Joins records with the record separator to build a bulk payload.
pub fn join_batch<I, S>(records: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut payload = String::new();
    for (i, record) in records.into_iter().enumerate() {
        if i > 0 {
            payload.push(RECORD_SEPARATOR);
        }
        payload.push_str(record.as_ref());
    }
    payload
}

/// Finds the position of the line terminator in the buffer.
#[inline]
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == LINE_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request = parse_request("ADD_PRODUCT::SKU1|Acme").unwrap();
        assert_eq!(request.command, "ADD_PRODUCT");
        assert_eq!(request.data, "SKU1|Acme");
    }

    #[test]
    fn test_parse_request_zero_arguments() {
        let request = parse_request("GET_ALL_PRODUCTS::").unwrap();
        assert_eq!(request.command, "GET_ALL_PRODUCTS");
        assert_eq!(request.data, "");

        let request = parse_request("GET_ALL_PRODUCTS").unwrap();
        assert_eq!(request.command, "GET_ALL_PRODUCTS");
        assert_eq!(request.data, "");
    }

    #[test]
    fn test_parse_request_splits_once() {
        let request = parse_request("ADD_PRODUCT::a::b|c").unwrap();
        assert_eq!(request.command, "ADD_PRODUCT");
        assert_eq!(request.data, "a::b|c");
    }

    #[test]
    fn test_parse_request_strips_carriage_return() {
        let request = parse_request("LOGIN::a@b.c|pw\r").unwrap();
        assert_eq!(request.data, "a@b.c|pw");
    }

    #[test]
    fn test_parse_request_empty() {
        assert_eq!(parse_request(""), Err(ParseError::EmptyRequest));
        assert_eq!(parse_request("   \r"), Err(ParseError::EmptyRequest));
        assert_eq!(parse_request("::data"), Err(ParseError::MissingCommand));
    }

    #[test]
    fn test_split_fields_exact() {
        let fields = split_fields("a|b|c", 3).unwrap();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_fields_last_field_keeps_delimiters() {
        let fields = split_fields("SKU1|Acme|Widget|desc|1|2.00|/img/a|b.png", 7).unwrap();
        assert_eq!(fields[6], "/img/a|b.png");
    }

    #[test]
    fn test_split_fields_too_few() {
        assert_eq!(
            split_fields("a|b", 3),
            Err(ParseError::FieldCount {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_split_fields_keeps_empty_fields() {
        let fields = split_fields("|company|||", 5).unwrap();
        assert_eq!(fields, vec!["", "company", "", "", ""]);
    }

    #[test]
    fn test_split_records() {
        let data = "a|1\u{1E}b|2; with semicolon\u{1E}";
        let records = split_records(data).unwrap();
        assert_eq!(records, vec!["a|1", "b|2; with semicolon"]);
    }

    #[test]
    fn test_split_records_empty() {
        assert_eq!(split_records(""), Err(ParseError::EmptyBatch));
        assert_eq!(split_records("\u{1E}\u{1E}"), Err(ParseError::EmptyBatch));
    }

    #[test]
    fn test_split_keys() {
        assert_eq!(split_keys(" SKU1, SKU2 ,,SKU3").unwrap(), vec!["SKU1", "SKU2", "SKU3"]);
        assert_eq!(split_keys(" , "), Err(ParseError::EmptyKeyList));
    }

    #[test]
    fn test_join_records() {
        let payload = join_records(vec!["a|1".to_string(), "b|2".to_string()]);
        assert_eq!(payload, "a|1;b|2");
        assert_eq!(join_records(Vec::<String>::new()), "");
    }

    #[test]
    fn test_join_batch_splits_back() {
        let payload = join_batch(["x|1", "y|2"]);
        assert_eq!(split_records(&payload).unwrap(), vec!["x|1", "y|2"]);
    }

    #[test]
    fn test_find_line_end() {
        assert_eq!(find_line_end(b"PING\nrest"), Some(4));
        assert_eq!(find_line_end(b"partial"), None);
    }
}
