// biashara-core/src/lib.rs

#![doc = include_str!("../../README.md")]

pub mod agent;
pub mod api;
pub mod config;
pub mod errors;
pub mod history;
pub mod index;
pub mod providers;
pub mod tools;
pub mod utils;


pub use agent::{Agent, DEFAULT_SYSTEM_PROMPT, StepOutput, ToolExecutionResult, ToolExecutionStatus};
pub use config::{AgentConfig, LoopConfig, ModelConfig};
pub use errors::{AgentError, ToolError};
pub use history::HistoryCompressor;
pub use index::{SearchHit, SearchSource, SemanticIndex};
pub use models::chat::{ApiResponse, ChatMessage, Choice, Role};
pub use models::tools::{
    ToolCall, ToolDefinition, ToolFunction, ToolInput, ToolParameter, ToolParameterType,
    ToolParametersDefinition,
};
pub use providers::Provider;
pub use providers::openai::OpenAIProvider;
pub use tools::{Tool, ToolName, ToolRegistry};

pub use async_trait::async_trait;

pub mod models {
    pub mod chat;
    pub mod tools;
}
