#![deny(unsafe_code)]

//! Conversation exchange pipeline shared by the chat server and the chat widget.
//!
//! The server admits a client-held [`History`] through the [`ValidationGate`] and
//! hands the [`PersonaPrefix`]-assembled prompt to a model; the client applies the
//! same [`HistoryLimits`] before it ever sends a request.

/// Error taxonomy and gate rejections.
pub mod error;
/// Server-side acceptance filter for incoming histories.
pub mod gate;
/// Size caps shared by the gate and the client pre-check.
pub mod limits;
/// Message and history model.
pub mod message;
/// Persona prefix and prompt assembly.
pub mod prompt;
/// Markup stripping for untrusted text.
pub mod sanitize;
/// Request and response bodies of the chat endpoint.
pub mod wire;

pub use error::{ErrorKind, ValidationError};
pub use gate::ValidationGate;
pub use limits::HistoryLimits;
pub use message::{History, Message, Role};
pub use prompt::{DEFAULT_GREETING, PersonaPrefix, PromptMessage, PromptRole};
pub use sanitize::{sanitize_markup, sanitize_text};
pub use wire::{CSRF_COOKIE, CSRF_HEADER, CHAT_PATH, ChatReply, ChatRequest, ErrorBody};
