use concierge_core::PromptMessage;
use futures::future::BoxFuture;
use snafu::Snafu;

pub type ProviderResult<T> = Result<T, ProviderError>;

pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider_id: String,
    pub api_key: String,
    /// Base URL override; empty means the provider default.
    pub endpoint: String,
    pub model_id: String,
    pub temperature: f64,
    /// Extra attempts after the first failed call.
    pub max_retries: u32,
}

impl ModelConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            model_id: model_id.into().trim().to_string(),
            temperature: 0.0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Generated reply plus the usage figure reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub total_tokens: u64,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("prompt has no user or ai turns"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("model '{model_id}' returned no text"))]
    EmptyReply {
        stage: &'static str,
        model_id: String,
    },
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HttpClient { .. } | Self::CompletionsFailed { .. } | Self::EmptyReply { .. }
        )
    }
}

/// Narrow capability the exchange pipeline needs from a language model.
pub trait ModelInvoker: Send + Sync {
    fn provider_id(&self) -> &str;
    fn model_id(&self) -> &str;
    fn invoke<'a>(&'a self, prompt: &'a [PromptMessage]) -> BoxFuture<'a, ProviderResult<ModelReply>>;
}
