use std::fmt;

use snafu::Snafu;

/// Machine-distinguishable failure class reported to the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidRole,
    TooLong,
    ModelError,
    /// Only raised by the client when the server could not be reached or answered garbage.
    NetworkError,
}

impl ErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidRole => "invalid_role",
            Self::TooLong => "too_long",
            Self::ModelError => "model_error",
            Self::NetworkError => "network_error",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "invalid_request" => Some(Self::InvalidRequest),
            "invalid_role" => Some(Self::InvalidRole),
            "too_long" => Some(Self::TooLong),
            "model_error" => Some(Self::ModelError),
            "network_error" => Some(Self::NetworkError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.code())
    }
}

/// Reason a candidate history was refused before any model call.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    #[snafu(display("message list is missing or not an array"))]
    MissingMessages { stage: &'static str },
    #[snafu(display("message list is empty"))]
    EmptyHistory { stage: &'static str },
    #[snafu(display("entry {index} is not a [role, text] pair"))]
    MalformedEntry { stage: &'static str, index: usize },
    #[snafu(display("entry {index} has unsupported role {role}"))]
    InvalidRole {
        stage: &'static str,
        index: usize,
        role: String,
    },
    #[snafu(display("history has {count} turns, limit is {limit}"))]
    TooManyTurns {
        stage: &'static str,
        count: usize,
        limit: usize,
    },
    #[snafu(display("entry {index} has {chars} characters, limit is {limit}"))]
    MessageTooLong {
        stage: &'static str,
        index: usize,
        chars: usize,
        limit: usize,
    },
    #[snafu(display("serialized history is {bytes} bytes, limit is {limit}"))]
    HistoryTooLarge {
        stage: &'static str,
        bytes: usize,
        limit: usize,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingMessages { .. }
            | Self::EmptyHistory { .. }
            | Self::MalformedEntry { .. } => ErrorKind::InvalidRequest,
            Self::InvalidRole { .. } => ErrorKind::InvalidRole,
            Self::TooManyTurns { .. }
            | Self::MessageTooLong { .. }
            | Self::HistoryTooLarge { .. } => ErrorKind::TooLong,
        }
    }

    /// Human-readable text safe to show in the widget.
    pub fn client_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidRequest => "Message is required",
            ErrorKind::InvalidRole => "Invalid message",
            _ => "Message is too long",
        }
    }
}
