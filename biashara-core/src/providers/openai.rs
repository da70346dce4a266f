// biashara-core/src/providers/openai.rs
use super::Provider;
use crate::api;
use crate::config::ModelConfig;
use crate::models::chat::{ApiResponse, ChatMessage};
use crate::models::tools::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

/// OpenAI-compatible chat completions (GitHub Models, Azure inference, OpenAI).
#[derive(Clone)]
pub struct OpenAIProvider {
    config: ModelConfig,
    http_client: Client,
    api_key: String,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: ModelConfig, http_client: Client, api_key: String, max_retries: u32) -> Self {
        if api_key.is_empty() {
            warn!(
                model = %config.model_name,
                "API key is empty for chat model. The API call will likely fail."
            );
        }
        Self {
            config,
            http_client,
            api_key,
            max_retries,
        }
    }

    /// Builds the provider with the key named in `config.api_key_env_var`.
    pub fn from_config(config: ModelConfig, http_client: Client, max_retries: u32) -> Self {
        let api_key = config.api_key();
        Self::new(config, http_client, api_key, max_retries)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn get_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ApiResponse> {
        api::get_chat_completion(
            &self.http_client,
            &self.config,
            &self.api_key,
            self.max_retries,
            messages,
            tools,
        )
        .await
    }
}
