// biashara-core/src/config.rs

//! Configuration structures and parsing for the advisor agent.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://models.github.ai/inference/chat/completions";
pub const DEFAULT_EMBEDDINGS_ENDPOINT: &str = "https://models.inference.ai.azure.com/embeddings";
pub const DEFAULT_WEB_SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";
pub const DEFAULT_DATA_API_URL: &str = "https://datacatalogapi.worldbank.org/dexapps/efi/data";
pub const DEFAULT_COUNTRY_CODE: &str = "KEN";

/// Hard cap on web results handed to the model.
pub const MAX_WEB_RESULTS: usize = 3;

#[derive(Deserialize, Debug, Clone)]
pub struct AgentConfig {
    /// Replaces the built-in tool-routing instruction when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub model: ModelConfig,
    /// Falls back to `model` when absent.
    #[serde(default)]
    pub summarizer: Option<ModelConfig>,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub data_api: DataApiConfig,
    #[serde(default)]
    pub agent: LoopConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelConfig {
    pub model_name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    /// Extra request fields (temperature, max_completion_tokens, ...).
    #[serde(default)]
    pub parameters: Option<toml::Value>,
}

impl ModelConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_CHAT_ENDPOINT)
    }

    pub fn api_key(&self) -> String {
        read_api_key(self.api_key_env_var.as_deref())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model_name: String,
    #[serde(default = "default_embeddings_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_github_token_var")]
    pub api_key_env_var: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model_name: default_embedding_model(),
            endpoint: default_embeddings_endpoint(),
            api_key_env_var: default_github_token_var(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct IndexConfig {
    /// Snapshot written by the offline index build. Relative paths resolve
    /// against the directory holding the config file.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct WebSearchConfig {
    #[serde(default = "default_web_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tavily_key_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_max_web_results")]
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_web_search_endpoint(),
            api_key_env_var: default_tavily_key_var(),
            max_results: default_max_web_results(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataApiConfig {
    #[serde(default = "default_data_api_url")]
    pub base_url: String,
    #[serde(default = "default_country")]
    pub default_country: String,
    #[serde(default = "default_top")]
    pub default_top: u64,
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_api_url(),
            default_country: default_country(),
            default_top: default_top(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoopConfig {
    #[serde(default = "default_max_tool_hops")]
    pub max_tool_hops: usize,
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,
    #[serde(default = "default_summarize_chunk")]
    pub summarize_chunk: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_hops: default_max_tool_hops(),
            summarize_threshold: default_summarize_threshold(),
            summarize_chunk: default_summarize_chunk(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}
fn default_embeddings_endpoint() -> String {
    DEFAULT_EMBEDDINGS_ENDPOINT.to_string()
}
fn default_github_token_var() -> Option<String> {
    Some("GITHUB_TOKEN".to_string())
}
fn default_index_path() -> PathBuf {
    PathBuf::from("data/vectorstore/index.json")
}
fn default_web_search_endpoint() -> String {
    DEFAULT_WEB_SEARCH_ENDPOINT.to_string()
}
fn default_tavily_key_var() -> Option<String> {
    Some("TAVILY_API_KEY".to_string())
}
fn default_max_web_results() -> usize {
    MAX_WEB_RESULTS
}
fn default_data_api_url() -> String {
    DEFAULT_DATA_API_URL.to_string()
}
fn default_country() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}
fn default_top() -> u64 {
    15
}
fn default_max_tool_hops() -> usize {
    5
}
fn default_summarize_threshold() -> usize {
    20
}
fn default_summarize_chunk() -> usize {
    10
}
fn default_max_retries() -> u32 {
    5
}

/// Reads an API key from the named environment variable. A missing key is
/// logged and yields an empty string; the upstream call will reject it.
pub fn read_api_key(env_var: Option<&str>) -> String {
    let Some(var) = env_var.filter(|v| !v.trim().is_empty()) else {
        return String::new();
    };
    match std::env::var(var) {
        Ok(key) => key,
        Err(e) => {
            warn!(env_var = %var, error = %e, "API key environment variable not set or invalid");
            String::new()
        }
    }
}

impl AgentConfig {
    pub fn from_toml_str(config_toml_content: &str) -> Result<AgentConfig> {
        let config: AgentConfig = match toml::from_str(config_toml_content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to parse TOML content");
                return Err(anyhow!(e))
                    .context("Failed to parse configuration TOML content. Check TOML syntax.");
            }
        };
        config.validate()?;
        tracing::info!("Successfully parsed and validated agent configuration.");
        Ok(config)
    }

    /// The model used for history condensation.
    pub fn summarizer_config(&self) -> &ModelConfig {
        self.summarizer.as_ref().unwrap_or(&self.model)
    }

    fn validate(&self) -> Result<()> {
        if let Some(prompt) = &self.system_prompt {
            if prompt.trim().is_empty() {
                return Err(anyhow!("'system_prompt' is set but empty."));
            }
        }

        validate_model("model", &self.model)?;
        if let Some(summarizer) = &self.summarizer {
            validate_model("summarizer", summarizer)?;
        }

        if self.embeddings.model_name.trim().is_empty() {
            return Err(anyhow!("'embeddings.model_name' is empty."));
        }
        validate_url("embeddings.endpoint", &self.embeddings.endpoint)?;
        validate_url("web_search.endpoint", &self.web_search.endpoint)?;
        validate_url("data_api.base_url", &self.data_api.base_url)?;

        if self.web_search.max_results == 0 || self.web_search.max_results > MAX_WEB_RESULTS {
            return Err(anyhow!(
                "'web_search.max_results' must be between 1 and {}.",
                MAX_WEB_RESULTS
            ));
        }
        if self.data_api.default_country.trim().is_empty() {
            return Err(anyhow!("'data_api.default_country' is empty."));
        }

        let agent = &self.agent;
        if agent.max_tool_hops == 0 {
            return Err(anyhow!("'agent.max_tool_hops' must be at least 1."));
        }
        if agent.summarize_chunk == 0 {
            return Err(anyhow!("'agent.summarize_chunk' must be at least 1."));
        }
        if agent.summarize_chunk >= agent.summarize_threshold {
            return Err(anyhow!(
                "'agent.summarize_chunk' ({}) must be smaller than 'agent.summarize_threshold' ({}).",
                agent.summarize_chunk,
                agent.summarize_threshold
            ));
        }
        Ok(())
    }
}

fn validate_model(section: &str, model: &ModelConfig) -> Result<()> {
    if model.model_name.trim().is_empty() {
        return Err(anyhow!("'{}.model_name' is empty.", section));
    }
    if let Some(endpoint) = &model.endpoint {
        validate_url(&format!("{}.endpoint", section), endpoint)?;
    }
    if let Some(params) = &model.parameters {
        if !params.is_table() {
            return Err(anyhow!(
                "'{}.parameters' must be a TOML table.",
                section
            ));
        }
    }
    Ok(())
}

fn validate_url(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("'{}' is empty.", key));
    }
    Url::parse(value).with_context(|| format!("Invalid URL format for '{}' ('{}').", key, value))?;
    Ok(())
}
