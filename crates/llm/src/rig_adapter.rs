use std::time::Duration;

use concierge_core::{PromptMessage, PromptRole};
use futures::future::BoxFuture;
use rig::completion::message::AssistantContent;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::{gemini, openai};
use snafu::{ResultExt, ensure};

use super::provider::{
    CompletionsFailedSnafu, EmptyPromptSnafu, EmptyReplySnafu, HttpClientSnafu,
    MissingApiKeySnafu, ModelConfig, ModelInvoker, ModelReply, ProviderResult,
};

pub const GEMINI_PROVIDER_ID: &str = "gemini";
pub const OPENAI_PROVIDER_ID: &str = "openai";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-002";

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

enum RigBackend {
    Gemini(gemini::Client),
    OpenAi(openai::Client),
}

/// Model adapter backed by a Rig provider client, built once at startup.
pub struct RigModelInvoker {
    config: ModelConfig,
    backend: RigBackend,
}

impl RigModelInvoker {
    pub fn gemini(config: ModelConfig) -> ProviderResult<Self> {
        Self::ensure_api_key(&config, "rig-gemini-new")?;

        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        let client = builder.build().context(HttpClientSnafu {
            stage: "build-gemini-client",
        })?;

        Ok(Self {
            config,
            backend: RigBackend::Gemini(client),
        })
    }

    pub fn openai(config: ModelConfig) -> ProviderResult<Self> {
        Self::ensure_api_key(&config, "rig-openai-new")?;

        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        let client = builder.build().context(HttpClientSnafu {
            stage: "build-openai-client",
        })?;

        Ok(Self {
            config,
            backend: RigBackend::OpenAi(client),
        })
    }

    fn ensure_api_key(config: &ModelConfig, stage: &'static str) -> ProviderResult<()> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage,
                provider_id: config.provider_id.clone(),
            }
        );
        Ok(())
    }

    fn to_rig_message(message: &PromptMessage) -> Option<RigMessage> {
        match message.role {
            PromptRole::System => None,
            PromptRole::User => Some(RigMessage::user(message.content.clone())),
            PromptRole::Ai => Some(RigMessage::assistant(message.content.clone())),
        }
    }

    /// Rig exposes a single preamble field, so every system entry is folded into it.
    fn merged_preamble(prompt: &[PromptMessage]) -> Option<String> {
        let parts = prompt
            .iter()
            .filter(|message| {
                matches!(message.role, PromptRole::System) && !message.content.trim().is_empty()
            })
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    async fn complete<M>(
        model: M,
        model_id: &str,
        temperature: f64,
        prompt: &[PromptMessage],
    ) -> ProviderResult<ModelReply>
    where
        M: CompletionModel,
    {
        let mut turns = prompt
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        // The newest turn is the prompt; everything before it is chat history.
        let Some(last_turn) = turns.pop() else {
            tracing::warn!(
                model_id,
                prompt_len = prompt.len(),
                "no user/ai turns remain after folding system entries"
            );
            return EmptyPromptSnafu {
                stage: "complete-pop-prompt",
            }
            .fail();
        };

        let mut builder = model
            .completion_request(last_turn)
            .messages(turns)
            .temperature(temperature);
        if let Some(preamble) = Self::merged_preamble(prompt) {
            builder = builder.preamble(preamble);
        }

        let response = builder.send().await.context(CompletionsFailedSnafu {
            stage: "send-completion",
        })?;

        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<String>();
        ensure!(
            !text.trim().is_empty(),
            EmptyReplySnafu {
                stage: "collect-reply-text",
                model_id: model_id.to_string(),
            }
        );

        Ok(ModelReply {
            text,
            total_tokens: response.usage.total_tokens,
        })
    }

    async fn invoke_once(&self, prompt: &[PromptMessage]) -> ProviderResult<ModelReply> {
        let model_id = self.config.model_id.as_str();
        let temperature = self.config.temperature;
        match &self.backend {
            RigBackend::Gemini(client) => {
                Self::complete(client.completion_model(model_id), model_id, temperature, prompt)
                    .await
            }
            RigBackend::OpenAi(client) => {
                Self::complete(client.completion_model(model_id), model_id, temperature, prompt)
                    .await
            }
        }
    }
}

impl ModelInvoker for RigModelInvoker {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn invoke<'a>(
        &'a self,
        prompt: &'a [PromptMessage],
    ) -> BoxFuture<'a, ProviderResult<ModelReply>> {
        Box::pin(async move {
            let attempts = self.config.max_retries.saturating_add(1);
            let mut attempt = 1;
            loop {
                match self.invoke_once(prompt).await {
                    Ok(reply) => return Ok(reply),
                    Err(error) if attempt < attempts && error.is_transient() => {
                        tracing::warn!(
                            provider_id = %self.config.provider_id,
                            model_id = %self.config.model_id,
                            attempt,
                            error = %error,
                            "model call failed; retrying"
                        );
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                        attempt += 1;
                    }
                    Err(error) => return Err(error),
                }
            }
        })
    }
}
