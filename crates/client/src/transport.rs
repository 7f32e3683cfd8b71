use concierge_core::{CHAT_PATH, CSRF_COOKIE, CSRF_HEADER, ChatReply, ErrorBody, ErrorKind};
use futures::future::BoxFuture;
use reqwest::header::{COOKIE, SET_COOKIE};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::coordinator::OutboundRequest;

/// Why an exchange did not produce a reply.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExchangeError {
    #[snafu(display("request failed on `{stage}`, {source}"))]
    Network {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("server answered {status} on `{stage}`: {message}"))]
    ServerRejected {
        stage: &'static str,
        status: u16,
        code: Option<ErrorKind>,
        message: String,
    },
    #[snafu(display("unreadable response body on `{stage}`, {source}"))]
    MalformedResponse {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("server at {url} did not issue a CSRF token"))]
    MissingCsrfToken { stage: &'static str, url: String },
    #[snafu(display("server returned an empty reply"))]
    EmptyReply { stage: &'static str },
}

impl ExchangeError {
    /// Server rejections keep the server's code; everything else is a network error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServerRejected { code, .. } => code.unwrap_or(ErrorKind::NetworkError),
            Self::Network { .. }
            | Self::MalformedResponse { .. }
            | Self::MissingCsrfToken { .. }
            | Self::EmptyReply { .. } => ErrorKind::NetworkError,
        }
    }
}

/// Carries one outbound history to the chat endpoint and yields the reply text.
pub trait ChatTransport: Send + Sync {
    fn send<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, Result<String, ExchangeError>>;
}

/// `POST {base}/api/chat` over reqwest with the double-submit CSRF token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    csrf_token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, csrf_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, csrf_token)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, csrf_token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
            csrf_token: csrf_token.into(),
        }
    }

    /// Loads the widget page once, like a browser would, and keeps the issued token.
    pub async fn connect(base_url: &str) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::new();
        let response = client
            .get(base_url)
            .send()
            .await
            .context(NetworkSnafu {
                stage: "load-widget-page",
            })?;

        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|raw| {
                let (name, value) = raw.split(';').next()?.trim().split_once('=')?;
                (name == CSRF_COOKIE && !value.is_empty()).then(|| value.to_string())
            })
            .context(MissingCsrfTokenSnafu {
                stage: "read-csrf-cookie",
                url: base_url.to_string(),
            })?;
        tracing::debug!(url = %base_url, "received CSRF token");

        Ok(Self::with_client(client, base_url, token))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &OutboundRequest) -> Result<String, ExchangeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CSRF_HEADER, &self.csrf_token)
            .header(COOKIE, format!("{CSRF_COOKIE}={}", self.csrf_token))
            .json(&request.body)
            .send()
            .await
            .context(NetworkSnafu {
                stage: "send-chat-request",
            })?;

        let status = response.status();
        let bytes = response.bytes().await.context(NetworkSnafu {
            stage: "read-chat-response",
        })?;

        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorBody>(&bytes).ok();
            return ServerRejectedSnafu {
                stage: "check-response-status",
                status: status.as_u16(),
                code: body.as_ref().and_then(ErrorBody::kind),
                message: body
                    .map(|body| body.message)
                    .unwrap_or_else(|| status.to_string()),
            }
            .fail();
        }

        let reply = serde_json::from_slice::<ChatReply>(&bytes).context(MalformedResponseSnafu {
            stage: "decode-chat-reply",
        })?;
        Ok(reply.response)
    }
}

impl ChatTransport for HttpTransport {
    fn send<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, Result<String, ExchangeError>> {
        Box::pin(async move {
            tracing::debug!(
                exchange = request.id.0,
                turns = request.body.messages.len(),
                endpoint = %self.endpoint,
                "sending chat request"
            );
            self.post(request).await
        })
    }
}
