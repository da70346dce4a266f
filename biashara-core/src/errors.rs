// biashara-core/src/errors.rs
use thiserror::Error;

/// Errors that end a conversation step.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Error related to configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// The history handed to the step had nothing to answer.
    #[error("Cannot run a conversation step on an empty history")]
    EmptyHistory,

    /// Error during interaction with the model API.
    #[error("API Error: {0}")]
    Api(#[source] anyhow::Error),

    /// The condensation sub-call failed; the history was left untouched.
    #[error("Summarization Error: {0}")]
    Summarization(#[source] anyhow::Error),

    /// The model asked for a tool the registry does not know.
    #[error("Unknown tool requested by the model: '{0}'")]
    UnknownTool(String),

    /// A tool failed in a way the model cannot recover from.
    #[error("Tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    /// The model kept requesting tools past the configured hop limit.
    #[error("Agent stopped after {0} tool hops without a final answer")]
    HopLimit(usize),
}

impl AgentError {
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Config(msg.into())
    }
}

/// Errors raised inside a single tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The model supplied arguments the tool cannot use.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The indicator resolver found no indicator identifiers.
    #[error("No relevant indicator found in the Knowledge Base.")]
    NoIndicator,

    /// An upstream HTTP service answered with a non-success status.
    #[error("API call failed with status {status}: {body}")]
    Transport { status: u16, body: String },

    /// The semantic index could not answer the query.
    #[error("Semantic search failed: {0}")]
    Search(#[source] anyhow::Error),

    /// The request never produced a usable response (connect, decode, ...).
    #[error("Request failed: {0}")]
    Request(#[source] anyhow::Error),
}

impl ToolError {
    /// Recoverable failures are handed back to the model as a tool result.
    /// The rest end the step.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ToolError::InvalidArguments(_) | ToolError::NoIndicator | ToolError::Search(_) => true,
            ToolError::Transport { .. } | ToolError::Request(_) => false,
        }
    }
}
