use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::message::History;

pub const CHAT_PATH: &str = "/api/chat";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Body of `POST /api/chat`: the full client history, oldest turn first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: History,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Body of every non-2xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: kind.code().to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(&self.error)
    }
}
