use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result code the backend uses for success inside its response envelope.
pub const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request never produced a response (network, DNS, connection reset).
    Transport,
    /// The response body was not the expected JSON.
    Decode,
    /// A required field was missing before the request was sent.
    Validation,
    /// The backend answered with a non-success `code` in its envelope.
    Application(i64),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Decode => f.write_str("decode"),
            Self::Validation => f.write_str("validation"),
            Self::Application(code) => write!(f, "application code {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn application(code: i64, message: Option<String>) -> Self {
        Self::new(
            ErrorCode::Application(code),
            message.unwrap_or_else(|| format!("request failed with code {code}")),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn is_application(&self) -> bool {
        matches!(self.code, ErrorCode::Application(_))
    }
}
