use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use concierge_core::{ErrorBody, ErrorKind, ValidationError};
use concierge_llm::ProviderError;
use snafu::Snafu;

use crate::settings::SettingsError;

/// Generic text shown to the widget when the model fails; details stay in the log.
pub const MODEL_FAILURE_MESSAGE: &str = "The assistant could not generate a reply";

/// Startup and serving failures of the server process.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServerError {
    #[snafu(display("failed to load settings on `{stage}`"))]
    LoadSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to open log directory {dir:?} on `{stage}`"))]
    CreateLogFile {
        stage: &'static str,
        dir: PathBuf,
        source: tracing_appender::rolling::InitError,
    },
    #[snafu(display("invalid log level '{level}' on `{stage}`"))]
    InvalidLogLevel {
        stage: &'static str,
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[snafu(display("UTC offset of {hours} hours is out of range on `{stage}`"))]
    InvalidUtcOffset { stage: &'static str, hours: i32 },
    #[snafu(display("failed to install tracing subscriber on `{stage}`"))]
    InstallSubscriber {
        stage: &'static str,
        source: tracing_subscriber::util::TryInitError,
    },
    #[snafu(display("failed to create model adapter on `{stage}`"))]
    CreateInvoker {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("failed to bind {addr} on `{stage}`"))]
    Bind {
        stage: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("server stopped unexpectedly on `{stage}`"))]
    Serve {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Failure of one `/api/*` request, rendered as `{ error, message }`.
#[derive(Debug)]
pub enum ApiError {
    Rejected(ValidationError),
    Model(ProviderError),
    Csrf,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Csrf => StatusCode::FORBIDDEN,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::Rejected(error) => ErrorBody::new(error.kind(), error.client_message()),
            Self::Model(_) => ErrorBody::new(ErrorKind::ModelError, MODEL_FAILURE_MESSAGE),
            Self::Csrf => ErrorBody {
                error: "invalid_csrf_token".to_string(),
                message: "Missing or mismatched CSRF token".to_string(),
            },
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::Rejected(error)
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        Self::Model(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
