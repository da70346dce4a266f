// biashara-core/src/agent.rs

//! The conversation step: compact the history, ask the model, run whatever
//! tools it requests and feed the results back until it answers in plain text.

use crate::config::{AgentConfig, LoopConfig};
use crate::errors::{AgentError, ToolError};
use crate::history::HistoryCompressor;
use crate::index::{EmbeddedIndex, OpenAIEmbedder, SemanticIndex};
use crate::models::chat::{ChatMessage, Role};
use crate::models::tools::{ToolCall, ToolDefinition, ToolInput};
use crate::providers::Provider;
use crate::providers::openai::OpenAIProvider;
use crate::tools::{ToolRegistry, render_output};
use crate::utils::preview;
use anyhow::anyhow;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a business advisor for young entrepreneurs in Kenya. You have access to four tools:
1) semantic_search: search internal reports for insight into Kenya's entrepreneurial landscape.
2) wb_api_query_with_semantic_search: find the World Bank indicator and dataset identifiers that match the user's question.
3) query_data: fetch data points from the World Bank API using the identifiers from the previous tool.
4) web_search: fall-back internet search for general knowledge.

When answering, prefer internal data (semantic_search or query_data) over web_search.
When searching for indicators, do not put a country in the query; the API defaults to Kenya.";

const OUTPUT_PREVIEW_CHARS: usize = 200;

/// Details the execution result of a single tool call within a [`StepOutput`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionResult {
    /// The ID the model gave the call; the tool-result message echoes it.
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments, or the raw argument string if it was not a JSON object.
    pub input: JsonValue,
    /// What the model was shown: the tool's output or the error text.
    pub output: String,
    pub status: ToolExecutionStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolExecutionStatus {
    Success,
    Failure,
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The (possibly compacted) history with the reply appended.
    pub history: Vec<ChatMessage>,
    /// The model's plain-content answer, exactly as returned.
    pub reply: ChatMessage,
    /// Every tool call serviced on the way, in order.
    pub tool_results: Vec<ToolExecutionResult>,
}

pub struct Agent {
    provider: Arc<dyn Provider>,
    compressor: HistoryCompressor,
    tools: ToolRegistry,
    system_prompt: String,
    max_tool_hops: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        summarizer: Arc<dyn Provider>,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
        loop_config: &LoopConfig,
    ) -> Self {
        Self {
            provider,
            compressor: HistoryCompressor::from_loop_config(summarizer, loop_config),
            tools,
            system_prompt: system_prompt.into(),
            max_tool_hops: loop_config.max_tool_hops,
        }
    }

    /// Wires the production agent: OpenAI-compatible model and summarizer,
    /// the index snapshot, and the four standard tools. Relative paths in
    /// `config` resolve against `config_dir`. An unusable setup (missing or
    /// malformed index snapshot, HTTP client failure) is a config error.
    pub fn from_config(config: &AgentConfig, config_dir: &Path) -> Result<Self, AgentError> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| AgentError::config(format!("Failed to build HTTP client for Agent: {}", e)))?;

        let index_path = if config.index.path.is_absolute() {
            config.index.path.clone()
        } else {
            config_dir.join(&config.index.path)
        };
        let embedder = Arc::new(OpenAIEmbedder::from_config(&config.embeddings, http_client.clone()));
        let index = EmbeddedIndex::load(&index_path, embedder)
            .map_err(|e| AgentError::config(format!("{:#}", e)))?;
        let index: Arc<dyn SemanticIndex> = Arc::new(index);

        let tools = ToolRegistry::standard(config, index, http_client.clone());
        let provider = Arc::new(OpenAIProvider::from_config(
            config.model.clone(),
            http_client.clone(),
            config.agent.max_retries,
        ));
        let summarizer = Arc::new(OpenAIProvider::from_config(
            config.summarizer_config().clone(),
            http_client,
            config.agent.max_retries,
        ));
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        info!(
            model = %config.model.model_name,
            num_tools = tools.len(),
            index = ?index_path,
            "Agent initialized"
        );
        Ok(Self::new(provider, summarizer, tools, system_prompt, &config.agent))
    }

    /// Runs one turn over `history` and returns the extended history plus
    /// the model's reply.
    ///
    /// Tool exchanges live only in the view sent to the model and in
    /// [`StepOutput::tool_results`]; the returned history gains exactly the reply.
    pub async fn step(&self, history: Vec<ChatMessage>) -> Result<StepOutput, AgentError> {
        info!(num_messages = history.len(), "Starting conversation step");
        if history.is_empty() {
            error!("Conversation step started with empty message history");
            return Err(AgentError::EmptyHistory);
        }

        let mut history = self.compressor.compact(history).await?;

        let mut outgoing = Vec::with_capacity(history.len() + 1);
        outgoing.push(ChatMessage::system(self.system_prompt.clone()));
        outgoing.extend(history.iter().filter(|m| m.role != Role::Tool).cloned());

        let definitions = self.tools.definitions();
        let mut tool_results = Vec::new();
        let mut hops = 0;

        loop {
            let reply = self.invoke_model(&outgoing, &definitions).await?;

            let calls = match reply.tool_calls.as_ref() {
                Some(calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    info!(hops, "Received final response (no further tool calls requested)");
                    history.push(reply.clone());
                    return Ok(StepOutput {
                        history,
                        reply,
                        tool_results,
                    });
                }
            };

            if hops >= self.max_tool_hops {
                error!(limit = self.max_tool_hops, "Model kept requesting tools past the hop limit");
                return Err(AgentError::HopLimit(self.max_tool_hops));
            }
            hops += 1;
            info!(hop = hops, count = calls.len(), "Model requested {} tool call(s)", calls.len());

            outgoing.push(ChatMessage::tool_request(calls.clone()));
            for call in &calls {
                let (message, result) = self.execute_tool_call(call).await?;
                outgoing.push(message);
                tool_results.push(result);
            }
        }
    }

    async fn invoke_model(
        &self,
        messages: &[ChatMessage],
        definitions: &[ToolDefinition],
    ) -> Result<ChatMessage, AgentError> {
        debug!(
            provider = self.provider.name(),
            num_messages = messages.len(),
            "Sending request to model"
        );
        trace!(
            payload = %serde_json::to_string_pretty(messages).unwrap_or_else(|e| format!("Serialization error: {}", e)),
            "Messages sent to model"
        );

        let response = self
            .provider
            .get_completion(messages.to_vec(), Some(definitions))
            .await
            .map_err(|e| {
                error!(error = ?e, "Model call failed during conversation step");
                AgentError::Api(e)
            })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Api(anyhow!("API response contained no choices")))?;
        trace!(
            message = %serde_json::to_string_pretty(&choice.message).unwrap_or_default(),
            "Assistant message"
        );
        Ok(choice.message)
    }

    /// Runs one requested call. Recoverable tool failures become the result
    /// text the model sees; anything else ends the step.
    async fn execute_tool_call(
        &self,
        call: &ToolCall,
    ) -> Result<(ChatMessage, ToolExecutionResult), AgentError> {
        let (tool_name, tool) = self.tools.resolve(&call.function.name).inspect_err(|_| {
            error!(tool_call_id = %call.id, tool_name = %call.function.name, "Model requested an unregistered tool");
        })?;
        debug!(tool_call_id = %call.id, tool_name = %tool_name, "Executing tool");
        trace!(arguments = %call.function.arguments, "Raw tool arguments");

        let (input, outcome) = match ToolInput::from_json_str(&call.function.arguments) {
            Ok(parsed) => {
                let input = JsonValue::Object(parsed.arguments.clone());
                (input, tool.call(parsed).await)
            }
            Err(e) => (
                JsonValue::String(call.function.arguments.clone()),
                Err(ToolError::InvalidArguments(format!(
                    "arguments must be a JSON object: {}",
                    e
                ))),
            ),
        };

        let (output, status) = match outcome {
            Ok(value) => {
                let output = render_output(&value);
                info!(tool_call_id = %call.id, tool_name = %tool_name, "Tool executed successfully");
                debug!(output = %preview(&output, OUTPUT_PREVIEW_CHARS), "Tool output");
                (output, ToolExecutionStatus::Success)
            }
            Err(e) if e.is_recoverable() => {
                warn!(tool_call_id = %call.id, tool_name = %tool_name, error = %e, "Tool failed, handing error back to model");
                (
                    format!("Error executing tool '{}': {}", tool_name, e),
                    ToolExecutionStatus::Failure,
                )
            }
            Err(e) => {
                error!(tool_call_id = %call.id, tool_name = %tool_name, error = ?e, "Tool failed, ending step");
                return Err(AgentError::Tool {
                    tool: tool_name.to_string(),
                    source: e,
                });
            }
        };

        let message = ChatMessage::tool_result(call.id.clone(), tool_name.as_str(), output.clone());
        let result = ToolExecutionResult {
            tool_call_id: call.id.clone(),
            tool_name: tool_name.to_string(),
            input,
            output,
            status,
        };
        Ok((message, result))
    }
}
