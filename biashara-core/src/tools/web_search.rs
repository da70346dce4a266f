// biashara-core/src/tools/web_search.rs
use super::{Tool, required_str};
use crate::config::{MAX_WEB_RESULTS, WebSearchConfig, read_api_key};
use crate::errors::ToolError;
use crate::models::tools::{ToolInput, ToolParameter, ToolParameterType, ToolParametersDefinition};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

/// Client for a Tavily-compatible search endpoint.
pub struct WebSearchClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

impl WebSearchClient {
    pub fn new(http_client: Client, endpoint: String, api_key: String, max_results: usize) -> Self {
        if api_key.is_empty() {
            warn!("Web search API key is empty; searches will likely be rejected");
        }
        Self {
            http_client,
            endpoint,
            api_key,
            max_results: max_results.clamp(1, MAX_WEB_RESULTS),
        }
    }

    pub fn from_config(config: &WebSearchConfig, http_client: Client) -> Self {
        let api_key = read_api_key(config.api_key_env_var.as_deref());
        Self::new(http_client, config.endpoint.clone(), api_key, config.max_results)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<WebResult>, ToolError> {
        debug!(query, max_results = self.max_results, "Running web search");
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "topic": "general",
        });

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await.map_err(|e| ToolError::Request(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            return Err(ToolError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| ToolError::Request(e.into()))?;
        let mut results = parsed.results;
        results.truncate(self.max_results);
        debug!(num_results = results.len(), "Web search complete");
        Ok(results)
    }
}

/// `web_search`: the fallback when the internal sources have nothing.
pub struct WebSearchTool {
    client: WebSearchClient,
}

impl WebSearchTool {
    pub fn new(client: WebSearchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn description(&self) -> String {
        "Searches the public web. Use only for recent events or topics the internal knowledge \
         base and statistics API do not cover."
            .to_string()
    }

    fn parameters(&self) -> ToolParametersDefinition {
        ToolParametersDefinition::object().with_param(
            "query",
            ToolParameter::new(ToolParameterType::String, "The search query."),
            true,
        )
    }

    async fn call(&self, input: ToolInput) -> Result<Value, ToolError> {
        let query = required_str(&input, "query")?;
        let results = self.client.search(query).await?;
        serde_json::to_value(results).map_err(|e| ToolError::Request(e.into()))
    }
}
