// biashara-core/src/providers/mod.rs
use crate::models::chat::{ApiResponse, ChatMessage};
use crate::models::tools::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;

/// A chat model the agent can talk to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// `tools = None` asks for a plain answer; no tool call can come back.
    async fn get_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ApiResponse>;
    fn name(&self) -> &str;
}

pub mod openai;
