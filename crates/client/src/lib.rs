#![deny(unsafe_code)]

//! Chat widget side of the exchange pipeline: the optimistic coordinator, its
//! HTTP transport and one-time reply rendering.

pub mod coordinator;
pub mod render;
pub mod state;
pub mod transport;

pub use coordinator::{
    ExchangeCoordinator, ExchangeOutcome, ExchangeRejection, OutboundRequest, SubmitRejection,
    TranscriptEntry,
};
pub use render::markdown_to_html;
pub use state::{ExchangeId, ExchangeState, ExchangeTransition, TransitionRejection};
pub use transport::{ChatTransport, ExchangeError, HttpTransport};
