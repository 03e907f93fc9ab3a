//! Wire Protocol Data Types
//!
//! This module defines the request and response types of the Stockroom
//! line protocol, together with the delimiters that frame them.
//!
//! ## Protocol Format
//!
//! Every message is exactly one UTF-8 line terminated by `\n`.
//!
//! Request: `COMMAND::DATA`
//! - `::` separates the command verb from its data (first occurrence only)
//! - `|` separates the fields of one record
//! - `0x1E` (ASCII record separator) separates whole records in bulk payloads
//! - `,` separates keys in remove commands
//!
//! Response: `STATUS|PAYLOAD`
//! - `SUCCESS|<payload>` - the command succeeded
//! - `LOCKED|<message>` - the account is locked out
//! - `FAILURE: <message>` - the command failed
//!
//! Read-all payloads join records with `;`.
//!
//! ## Examples
//!
//! Request: `ADD_PRODUCT::SKU1|Acme|Widget|A test widget|10|19.99|/img/widget.png`
//! Success: `SUCCESS|`
//! Login success: `SUCCESS|Alice|admin`
//! Failure: `FAILURE: Unknown command: FOO`

use crate::protocol::parser::ParseError;
use std::fmt;

/// Separates the command verb from its data.
pub const COMMAND_SEPARATOR: &str = "::";

/// Separates fields inside a record.
pub const FIELD_DELIMITER: char = '|';

/// Separates whole records in bulk payloads (ASCII RS, 0x1E).
///
/// Free-text fields may legitimately contain `;`, so bulk requests cannot
/// use the list separator.
pub const RECORD_SEPARATOR: char = '\u{1E}';

/// Separates records in read-all response payloads.
pub const LIST_SEPARATOR: char = ';';

/// Separates keys in remove commands.
pub const KEY_SEPARATOR: char = ',';

/// Terminates every request and response line.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Status token that prefixes every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The command completed.
    Success,
    /// The command was rejected or could not be completed.
    Failure,
    /// The account is locked after too many failed logins.
    Locked,
}

impl Status {
    /// Returns the wire token for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::Locked => "LOCKED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request line, borrowing from the received line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    /// The command verb exactly as sent (e.g. `ADD_PRODUCT`)
    pub command: &'a str,
    /// Everything after the first `::`, empty for zero-argument commands
    pub data: &'a str,
}

/// A response to exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Status,
    payload: String,
}

impl Response {
    /// Creates a success response carrying `payload`.
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            payload: payload.into(),
        }
    }

    /// Creates a success response with an empty payload.
    pub fn ok() -> Self {
        Self::success(String::new())
    }

    /// Creates a failure response carrying a human-readable message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            payload: message.into(),
        }
    }

    /// Creates a locked-account response.
    pub fn locked(message: impl Into<String>) -> Self {
        Self {
            status: Status::Locked,
            payload: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Splits the payload into `|`-delimited fields.
    pub fn fields(&self) -> Vec<&str> {
        self.payload.split(FIELD_DELIMITER).collect()
    }

    /// Splits a read-all payload into its `;`-joined records.
    ///
    /// An empty payload yields no records.
    pub fn records(&self) -> Vec<&str> {
        if self.payload.is_empty() {
            return Vec::new();
        }
        self.payload.split(LIST_SEPARATOR).collect()
    }

    /// Serializes the response to its wire form, without the line terminator.
    ///
    /// Line breaks inside the payload are replaced by spaces so that a
    /// response is always exactly one line.
    pub fn serialize(&self) -> String {
        let payload = self.payload.replace(['\r', '\n'], " ");
        match self.status {
            Status::Failure => format!("{}: {}", self.status, payload),
            _ => format!("{}{}{}", self.status, FIELD_DELIMITER, payload),
        }
    }

    /// Serializes the response including the trailing newline.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = self.serialize().into_bytes();
        line.push(LINE_TERMINATOR);
        line
    }

    /// Parses a response line as written by [`Response::serialize`].
    ///
    /// A trailing `\r\n` or `\n` is ignored. `FAILURE|message` is accepted as
    /// well as the canonical `FAILURE: message`.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(message) = line.strip_prefix("FAILURE: ") {
            return Ok(Self::failure(message));
        }

        let (token, payload) = line.split_once(FIELD_DELIMITER).unwrap_or((line, ""));
        let status = match token {
            "SUCCESS" => Status::Success,
            "FAILURE" => Status::Failure,
            "LOCKED" => Status::Locked,
            other => return Err(ParseError::UnknownStatus(other.to_string())),
        };

        Ok(Self {
            status,
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
