use std::path::Path;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::post;
use axum::{Router, middleware};
use concierge_core::{PersonaPrefix, ValidationGate};
use concierge_llm::ModelInvoker;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::chat::post_chat;
use crate::csrf::{issue_csrf_cookie, require_csrf_token};

pub const ROBOTS_HEADER: &str = "x-robots-tag";
pub const ROBOTS_DIRECTIVE: &str = "noindex, nofollow";

/// Read-only context shared by every request; no conversation state lives here.
#[derive(Clone)]
pub struct AppState {
    pub gate: ValidationGate,
    pub persona: Arc<PersonaPrefix>,
    pub invoker: Arc<dyn ModelInvoker>,
}

impl AppState {
    pub fn new(gate: ValidationGate, persona: PersonaPrefix, invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            gate,
            persona: Arc::new(persona),
            invoker,
        }
    }
}

/// `/api/chat` behind the CSRF gate, static files for everything else.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    let api = Router::new()
        .route("/chat", post(post_chat))
        .route_layer(middleware::from_fn(require_csrf_token))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new(public_dir))
        .layer(middleware::from_fn(issue_csrf_cookie))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(ROBOTS_HEADER),
            HeaderValue::from_static(ROBOTS_DIRECTIVE),
        ))
        .layer(TraceLayer::new_for_http())
}
