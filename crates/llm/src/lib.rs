use std::sync::Arc;

mod provider;
mod rig_adapter;

pub use provider::{
    DEFAULT_MAX_RETRIES, ModelConfig, ModelInvoker, ModelReply, ProviderError, ProviderResult,
};
pub use rig_adapter::{
    DEFAULT_GEMINI_MODEL, GEMINI_PROVIDER_ID, OPENAI_PROVIDER_ID, RigModelInvoker,
};

/// Builds the configured model adapter; a blank provider id means Gemini.
pub fn create_invoker(mut config: ModelConfig) -> ProviderResult<Arc<dyn ModelInvoker>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigModelInvoker::gemini(config)?))
        }
        "openai" | "rig-openai" => {
            config.provider_id = OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigModelInvoker::openai(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-invoker",
            provider_id: config.provider_id,
        }),
    }
}
