#![deny(unsafe_code)]

//! HTTP surface of the support chatbot: static widget assets plus the
//! stateless `POST /api/chat` exchange endpoint.

pub mod app;
pub mod chat;
pub mod csrf;
pub mod error;
pub mod logging;
pub mod settings;

pub use app::{AppState, build_router};
pub use error::{ApiError, MODEL_FAILURE_MESSAGE, ServerError};
pub use settings::Settings;
