// biashara-core/src/tools/mod.rs

//! The four capabilities the model can route a question to, and the registry
//! that maps the model's textual tool name onto them.
//!
//! Tool names exist as strings only at the model boundary: [`ToolRegistry::resolve`]
//! turns them into a [`ToolName`] and everything past that point uses the enum.

pub mod indicators;
pub mod query_data;
pub mod semantic_search;
pub mod web_search;

use crate::config::AgentConfig;
use crate::errors::{AgentError, ToolError};
use crate::index::SemanticIndex;
use crate::models::tools::{ToolDefinition, ToolInput, ToolParametersDefinition};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use indicators::{IndicatorResolver, IndicatorSearchTool, ResolvedIndicators};
pub use query_data::{DataFetcher, DataQuery, QueryDataTool};
pub use semantic_search::SemanticSearchTool;
pub use web_search::{WebSearchClient, WebSearchTool};

/// Every tool the advisor knows about. Declaration order is the order the
/// tools are presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    SemanticSearch,
    IndicatorSearch,
    QueryData,
    WebSearch,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::SemanticSearch,
        ToolName::IndicatorSearch,
        ToolName::QueryData,
        ToolName::WebSearch,
    ];

    /// The name the model sees and calls.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SemanticSearch => "semantic_search",
            ToolName::IndicatorSearch => "wb_api_query_with_semantic_search",
            ToolName::QueryData => "query_data",
            ToolName::WebSearch => "web_search",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        ToolName::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability the model can invoke.
///
/// Implementations validate their own arguments; the conversation step passes
/// the model's arguments through untouched.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tells the model when the tool applies.
    fn description(&self) -> String;
    fn parameters(&self) -> ToolParametersDefinition;
    async fn call(&self, input: ToolInput) -> Result<Value, ToolError>;
}

/// Fixed mapping from tool name to implementation, built once at start-up.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: ToolName, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(name, tool);
        self
    }

    /// The production set: semantic search, indicator resolution, data fetch
    /// and web search.
    pub fn standard(config: &AgentConfig, index: Arc<dyn SemanticIndex>, http_client: Client) -> Self {
        let fetcher = DataFetcher::from_config(&config.data_api, http_client.clone());
        let resolver = IndicatorResolver::new(index.clone(), config.data_api.default_country.clone());
        let web = WebSearchClient::from_config(&config.web_search, http_client);

        Self::new()
            .with_tool(ToolName::SemanticSearch, Arc::new(SemanticSearchTool::new(index)))
            .with_tool(ToolName::IndicatorSearch, Arc::new(IndicatorSearchTool::new(resolver)))
            .with_tool(ToolName::QueryData, Arc::new(QueryDataTool::new(fetcher)))
            .with_tool(ToolName::WebSearch, Arc::new(WebSearchTool::new(web)))
    }

    /// Translates the model's tool name. Unregistered names are a fatal mismatch.
    pub fn resolve(&self, name: &str) -> Result<(ToolName, Arc<dyn Tool>), AgentError> {
        ToolName::parse(name)
            .and_then(|tool_name| self.tools.get(&tool_name).map(|t| (tool_name, t.clone())))
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDefinition {
                name: name.as_str().to_string(),
                description: tool.description(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Renders a tool's return value as the text of a tool-result message.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "<no output>".to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

// --- Argument helpers shared by the tool implementations ---

pub(crate) fn required_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str, ToolError> {
    input
        .get_str(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required string argument '{}'", key)))
}

pub(crate) fn optional_count(input: &ToolInput, key: &str, default: usize) -> Result<usize, ToolError> {
    match input.get(key) {
        None => Ok(default),
        Some(_) => input
            .get_u64(key)
            .map(|v| v as usize)
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{}' must be a non-negative integer", key))),
    }
}

/// Accepts a string (comma-separated values allowed), a number, or an array of either.
pub(crate) fn string_list(input: &ToolInput, key: &str) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = input.get(key) else {
        return Ok(None);
    };
    let scalar = |v: &Value| -> Option<Vec<String>> {
        match v {
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            Value::Number(n) => Some(vec![n.to_string()]),
            _ => None,
        }
    };
    let values = match value {
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(scalar(item).ok_or_else(|| {
                    ToolError::InvalidArguments(format!("'{}' must hold strings or numbers", key))
                })?);
            }
            out
        }
        other => scalar(other).ok_or_else(|| {
            ToolError::InvalidArguments(format!("'{}' must be a string, number or list", key))
        })?,
    };
    Ok(Some(values).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn description(&self) -> String {
            "Echoes its input".into()
        }
        fn parameters(&self) -> ToolParametersDefinition {
            ToolParametersDefinition::object()
        }
        async fn call(&self, input: ToolInput) -> Result<Value, ToolError> {
            Ok(Value::Object(input.arguments))
        }
    }

    fn input(value: Value) -> ToolInput {
        ToolInput {
            arguments: value.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_tool_names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("rm_rf"), None);
    }

    #[tokio::test]
    async fn test_registry_resolves_registered_tool() {
        let registry = ToolRegistry::new().with_tool(ToolName::WebSearch, Arc::new(EchoTool));
        let (name, tool) = registry.resolve("web_search").unwrap();
        assert_eq!(name, ToolName::WebSearch);
        let out = tool.call(input(json!({ "query": "x" }))).await.unwrap();
        assert_eq!(out, json!({ "query": "x" }));
    }

    #[test]
    fn test_registry_unknown_tool() {
        let registry = ToolRegistry::new().with_tool(ToolName::WebSearch, Arc::new(EchoTool));
        // Known name, but not registered here.
        assert!(matches!(
            registry.resolve("query_data"),
            Err(AgentError::UnknownTool(name)) if name == "query_data"
        ));
        assert!(matches!(registry.resolve("bogus"), Err(AgentError::UnknownTool(_))));
    }

    #[test]
    fn test_definitions_follow_declaration_order() {
        let registry = ToolRegistry::new()
            .with_tool(ToolName::WebSearch, Arc::new(EchoTool))
            .with_tool(ToolName::SemanticSearch, Arc::new(EchoTool));
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["semantic_search", "web_search"]);
    }

    #[test]
    fn test_render_output() {
        assert_eq!(render_output(&json!("plain")), "plain");
        assert_eq!(render_output(&json!({ "a": 1 })), r#"{"a":1}"#);
        assert_eq!(render_output(&Value::Null), "<no output>");
    }

    #[test]
    fn test_string_list_shapes() {
        let args = input(json!({
            "a": "X.1, X.2",
            "b": ["X.1", "X.2"],
            "c": 2020,
            "d": [2019, "2020"],
            "e": "",
            "f": { "bad": true }
        }));
        assert_eq!(string_list(&args, "a").unwrap().unwrap(), vec!["X.1", "X.2"]);
        assert_eq!(string_list(&args, "b").unwrap().unwrap(), vec!["X.1", "X.2"]);
        assert_eq!(string_list(&args, "c").unwrap().unwrap(), vec!["2020"]);
        assert_eq!(string_list(&args, "d").unwrap().unwrap(), vec!["2019", "2020"]);
        assert_eq!(string_list(&args, "e").unwrap(), None);
        assert_eq!(string_list(&args, "missing").unwrap(), None);
        assert!(string_list(&args, "f").is_err());
    }

    #[test]
    fn test_optional_count() {
        let args = input(json!({ "k": 4, "bad": "many" }));
        assert_eq!(optional_count(&args, "k", 3).unwrap(), 4);
        assert_eq!(optional_count(&args, "missing", 3).unwrap(), 3);
        assert!(optional_count(&args, "bad", 3).is_err());
    }
}
