use std::net::SocketAddr;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap};
use concierge_core::ChatReply;
use concierge_core::error::MissingMessagesSnafu;
use serde_json::Value;

use crate::app::AppState;
use crate::error::ApiError;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// `POST /api/chat`: gate, assemble, invoke once, relay.
pub async fn post_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Result<Json<ChatReply>, ApiError> {
    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::error!(
                error = %error,
                payload = %String::from_utf8_lossy(&body),
                "rejected undecodable chat request"
            );
            return Err(MissingMessagesSnafu {
                stage: "decode-request-body",
            }
            .build()
            .into());
        }
    };

    let candidate = payload.get("messages").unwrap_or(&Value::Null);
    tracing::debug!(messages = %candidate, "received messages");

    let history = state.gate.admit(candidate).map_err(|error| {
        tracing::error!(
            kind = %error.kind(),
            error = %error,
            messages = %candidate,
            "rejected chat request"
        );
        ApiError::from(error)
    })?;

    tracing::info!(
        client_ip = %client_ip(&headers, &extensions),
        messages = %candidate,
        "accepted chat request"
    );

    let prompt = state.persona.assemble(&history);
    let reply = state.invoker.invoke(&prompt).await.map_err(|error| {
        tracing::error!(
            provider_id = %state.invoker.provider_id(),
            model_id = %state.invoker.model_id(),
            error = ?error,
            "model invocation failed"
        );
        ApiError::from(error)
    })?;

    let response = reply.text.trim().to_string();
    tracing::info!(
        response = %response,
        total_tokens = reply.total_tokens,
        "generated response"
    );

    Ok(Json(ChatReply { response }))
}

/// First `X-Forwarded-For` hop, else the socket peer, else `unknown`.
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            4000,
        )));

        assert_eq!(client_ip(&headers, &extensions), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), &extensions), "127.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), "unknown");
    }
}
