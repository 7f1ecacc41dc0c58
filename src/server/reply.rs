//! Reply encoding for the line protocol.
//!
//! - `+<value>` success (booleans are `+1` / `+0`)
//! - `-<code> <message>` failure
//! - `*<n>` followed by `n` success lines

use std::fmt;

/// Numeric error codes sent after `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    WrongArgs = 1,
    ConnRequired = 2,
    UnknownCommand = 3,
    AlreadyConnected = 4,
    Terminating = 5,
    LineTooLong = 6,
    Invalid = 7,
    Internal = 8,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::WrongArgs => "wrong arguments",
            ErrorCode::ConnRequired => "CONN required first",
            ErrorCode::UnknownCommand => "unknown command",
            ErrorCode::AlreadyConnected => "connection already has a client id",
            ErrorCode::Terminating => "server terminating",
            ErrorCode::LineTooLong => "line too long",
            ErrorCode::Invalid => "invalid request",
            ErrorCode::Internal => "internal error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Value(String),
    Bool(bool),
    List(Vec<String>),
    Error { code: ErrorCode, message: String },
}

impl Reply {
    pub fn value(value: impl Into<String>) -> Self {
        Reply::Value(value.into())
    }

    pub fn error(code: ErrorCode) -> Self {
        Reply::Error {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn error_with(code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }

    /// Wire bytes, CRLF-terminated.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(value) => write!(f, "+{}\r\n", value),
            Reply::Bool(flag) => write!(f, "+{}\r\n", if *flag { 1 } else { 0 }),
            Reply::List(items) => {
                write!(f, "*{}\r\n", items.len())?;
                for item in items {
                    write!(f, "+{}\r\n", item)?;
                }
                Ok(())
            }
            Reply::Error { code, message } => {
                // Messages must stay on one line.
                let message = message.replace(['\r', '\n'], " ");
                write!(f, "-{} {}\r\n", code.code(), message)
            }
        }
    }
}
