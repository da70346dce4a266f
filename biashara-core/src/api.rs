// biashara-core/src/api.rs

//! HTTP plumbing for OpenAI-compatible chat completion and embedding endpoints.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json, to_value};
use tokio::time::Duration;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::models::chat::{ApiResponse, ChatMessage, Role};
use crate::models::tools::ToolDefinition;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: f64 = 2.0;

/// Sends `messages` to the chat completion endpoint of `model_config`.
///
/// `tools = None` leaves the `tools` field out of the request, so the model
/// cannot answer with a tool call. Network errors, 429 and 5xx responses are
/// retried with exponential backoff up to `max_retries` times.
pub async fn get_chat_completion(
    client: &Client,
    model_config: &ModelConfig,
    api_key: &str,
    max_retries: u32,
    messages: Vec<ChatMessage>,
    tools: Option<&[ToolDefinition]>,
) -> Result<ApiResponse> {
    let url_str = model_config.endpoint();
    let request_body = build_openai_request(&model_config.model_name, messages, model_config, tools)?;

    trace!(
        url = %url_str,
        body = %serde_json::to_string_pretty(&request_body).unwrap_or_default(),
        "Chat completion request"
    );

    let response_value = send_with_retries(client, url_str, api_key, &request_body, max_retries).await?;

    let mut response_json_obj = match response_value {
        Value::Object(map) => map,
        other => return Err(anyhow!("API response was not a JSON object: {:?}", other)),
    };

    if !response_json_obj.contains_key("id") {
        let new_id = format!("chatcmpl-{}", Uuid::new_v4());
        debug!("Added missing 'id' field to API response with value: {}", new_id);
        response_json_obj.insert("id".to_string(), json!(new_id));
    }

    let api_response: ApiResponse = serde_json::from_value(Value::Object(response_json_obj))
        .context("Failed to deserialize API response")?;

    match api_response.choices.first() {
        Some(choice) if choice.message.requests_tools() => {
            debug!(tool_calls = ?choice.message.tool_calls, "Model requested tool calls")
        }
        Some(_) => debug!("Model replied with content"),
        None => debug!("Response has empty 'choices' array"),
    }

    Ok(api_response)
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embeds `inputs` with an OpenAI-compatible `/embeddings` endpoint, in input order.
pub async fn get_embeddings(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    model_name: &str,
    inputs: &[String],
) -> Result<Vec<Vec<f32>>> {
    let body = json!({ "model": model_name, "input": inputs });
    let value = send_with_retries(client, endpoint, api_key, &body, 0).await?;
    let mut parsed: EmbeddingsResponse =
        serde_json::from_value(value).context("Failed to deserialize embeddings response")?;
    if parsed.data.len() != inputs.len() {
        return Err(anyhow!(
            "Embeddings response has {} vectors for {} inputs",
            parsed.data.len(),
            inputs.len()
        ));
    }
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

async fn send_with_retries(
    client: &Client,
    url_str: &str,
    api_key: &str,
    body: &Value,
    max_retries: u32,
) -> Result<Value> {
    let mut retries = 0;
    let mut current_delay = INITIAL_DELAY;

    loop {
        let mut request = client
            .post(url_str)
            .header("Content-Type", "application/json");
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = match request.json(body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if retries < max_retries {
                    retries += 1;
                    warn!(
                        "Network error sending request: {}. Retrying in {:?} (attempt {}/{})",
                        e, current_delay, retries, max_retries
                    );
                    tokio::time::sleep(current_delay).await;
                    current_delay = next_delay(current_delay);
                    continue;
                }
                return Err(anyhow!("Network error after {} retries: {}", max_retries, e));
            }
        };

        let status = response.status();

        if (status.as_u16() == 429 || status.is_server_error()) && retries < max_retries {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            let wait_time = retry_after.unwrap_or(current_delay);
            retries += 1;
            warn!(
                "API request failed with status {}. Retrying in {:?} (attempt {}/{})",
                status, wait_time, retries, max_retries
            );
            tokio::time::sleep(wait_time).await;
            current_delay = next_delay(current_delay);
            continue;
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .context("Failed to read API error response body")?;
            debug!(status = %status, body = %error_text, "API request failed");
            return Err(anyhow!("API error: {} - {}", status, error_text));
        }

        return response
            .json()
            .await
            .context("Failed to read API response body as JSON");
    }
}

fn next_delay(current: Duration) -> Duration {
    std::cmp::min(
        Duration::from_secs_f64(current.as_secs_f64() * BACKOFF_FACTOR),
        MAX_DELAY,
    )
}

fn build_openai_request(
    model_name: &str,
    messages: Vec<ChatMessage>,
    model_config: &ModelConfig,
    tools: Option<&[ToolDefinition]>,
) -> Result<Value> {
    let mut request_map = serde_json::Map::new();
    request_map.insert("model".to_string(), json!(model_name));

    let wire_messages = messages
        .into_iter()
        .map(to_wire_message)
        .collect::<Result<Vec<_>>>()?;
    request_map.insert("messages".to_string(), Value::Array(wire_messages));

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|tool_def| {
                json!({
                    "type": "function",
                    "function": tool_def
                })
            })
            .collect();
        request_map.insert("tools".to_string(), Value::Array(tools_json));
    }

    if let Some(parameters) = model_config.parameters.as_ref().and_then(|p| p.as_table()) {
        for (key, value) in parameters {
            let json_value = to_value(value.clone())
                .with_context(|| format!("Failed to convert TOML parameter '{}' to JSON", key))?;
            request_map.insert(key.clone(), json_value);
        }
    }
    Ok(Value::Object(request_map))
}

// Chat completion endpoints reject `name` on tool messages; it is only
// tracked locally.
fn to_wire_message(message: ChatMessage) -> Result<Value> {
    let is_tool = message.role == Role::Tool;
    let mut value = to_value(message)?;
    if is_tool {
        if let Value::Object(map) = &mut value {
            map.remove("name");
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use crate::models::tools::{
        ToolDefinition, ToolParameter, ToolParameterType, ToolParametersDefinition,
    };
    use serde_json::json;

    use httpmock::prelude::*;

    // --- Test Helpers ---
    fn create_mock_tool_definitions() -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "mock_tool".to_string(),
            description: "A mock tool".to_string(),
            parameters: ToolParametersDefinition::object().with_param(
                "arg1",
                ToolParameter::new(ToolParameterType::String, "Arg 1"),
                true,
            ),
        }]
    }

    fn create_test_model_config(endpoint: &str, params: Option<toml::value::Table>) -> ModelConfig {
        ModelConfig {
            model_name: "test-model-name".to_string(),
            endpoint: Some(endpoint.to_string()),
            api_key_env_var: None,
            parameters: params.map(toml::Value::Table),
        }
    }

    // --- Tests for build_openai_request ---
    #[test]
    fn test_build_openai_request_basic() {
        let messages = vec![ChatMessage::user("Hello")];
        let model_config = create_test_model_config("http://fake.endpoint/v1", None);
        let tool_definitions = create_mock_tool_definitions();
        let value = build_openai_request(
            "gpt-basic",
            messages.clone(),
            &model_config,
            Some(&tool_definitions),
        )
        .unwrap();
        assert_eq!(value["model"], "gpt-basic");
        assert_eq!(value["messages"], json!(messages));
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "mock_tool");
    }

    #[test]
    fn test_build_openai_request_without_tools_omits_field() {
        let messages = vec![ChatMessage::user("Hi")];
        let model_config = create_test_model_config("http://fake.endpoint/v1", None);
        let value = build_openai_request("gpt-no-tools", messages, &model_config, None).unwrap();
        assert!(value.get("tools").is_none());

        let empty: Vec<ToolDefinition> = vec![];
        let value = build_openai_request(
            "gpt-no-tools",
            vec![ChatMessage::user("Hi")],
            &model_config,
            Some(&empty),
        )
        .unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_build_openai_request_with_parameters() {
        let mut params = toml::value::Table::new();
        params.insert("temperature".to_string(), toml::Value::Float(0.0));
        params.insert("max_completion_tokens".to_string(), toml::Value::Integer(4000));
        let model_config = create_test_model_config("http://fake.endpoint/v1", Some(params));
        let value = build_openai_request(
            "gpt-params",
            vec![ChatMessage::user("Test")],
            &model_config,
            None,
        )
        .unwrap();
        assert_eq!(value["temperature"], json!(0.0));
        assert_eq!(value["max_completion_tokens"], json!(4000));
    }

    #[test]
    fn test_tool_message_name_not_sent() {
        let messages = vec![ChatMessage::tool_result("call_1", "query_data", "{}")];
        let model_config = create_test_model_config("http://fake.endpoint/v1", None);
        let value = build_openai_request("m", messages, &model_config, None).unwrap();
        let wire = &value["messages"][0];
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
        assert!(wire.get("name").is_none());
    }

    // --- Tests for get_chat_completion ---
    #[tokio::test]
    async fn test_get_chat_completion_success() {
        let server = MockServer::start_async().await;
        let endpoint_path = "/v1/chat/completions";
        let model_config = create_test_model_config(&server.url(endpoint_path), None);
        let messages = vec![ChatMessage::user("Ping")];
        let tool_definitions = create_mock_tool_definitions();
        let expected_body = build_openai_request(
            &model_config.model_name,
            messages.clone(),
            &model_config,
            Some(&tool_definitions),
        )
        .unwrap();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(endpoint_path)
                    .header("Authorization", "Bearer test-key")
                    .json_body(expected_body);
                then.status(200).json_body(json!({
                    "id": "chatcmpl-123",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "Pong"}, "finish_reason": "stop"}]
                }));
            })
            .await;

        let client = Client::new();
        let result = get_chat_completion(
            &client,
            &model_config,
            "test-key",
            0,
            messages,
            Some(&tool_definitions),
        )
        .await;
        mock.assert_async().await;
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result.err());
        let response = result.unwrap();
        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Pong"));
    }

    #[tokio::test]
    async fn test_get_chat_completion_fills_missing_id() {
        let server = MockServer::start_async().await;
        let model_config = create_test_model_config(&server.url("/chat"), None);
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(200).json_body(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}}]
                }));
            })
            .await;

        let response = get_chat_completion(
            &Client::new(),
            &model_config,
            "",
            0,
            vec![ChatMessage::user("hi")],
            None,
        )
        .await
        .unwrap();
        assert!(response.id.starts_with("chatcmpl-"));
    }

    #[tokio::test]
    async fn test_get_chat_completion_client_error_not_retried() {
        let server = MockServer::start_async().await;
        let model_config = create_test_model_config(&server.url("/chat"), None);
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(401).body("bad credentials");
            })
            .await;

        let result = get_chat_completion(
            &Client::new(),
            &model_config,
            "k",
            3,
            vec![ChatMessage::user("hi")],
            None,
        )
        .await;
        assert_eq!(mock.hits(), 1);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("401"), "{}", err);
        assert!(err.contains("bad credentials"), "{}", err);
    }

    #[tokio::test]
    async fn test_get_chat_completion_retry_and_fail() {
        let server = MockServer::start_async().await;
        let model_config = create_test_model_config(&server.url("/chat"), None);
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(500)
                    .header("retry-after", "0")
                    .body("Server error");
            })
            .await;

        let result = get_chat_completion(
            &Client::new(),
            &model_config,
            "k",
            2,
            vec![ChatMessage::user("Retry")],
            None,
        )
        .await;
        assert_eq!(mock.hits(), 3);
        assert!(result.unwrap_err().to_string().contains("API error: 500"));
    }

    #[tokio::test]
    async fn test_get_embeddings_orders_by_index() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body(json!({ "model": "embed", "input": ["a", "b"] }));
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = get_embeddings(
            &Client::new(),
            &server.url("/embeddings"),
            "",
            "embed",
            &["a".to_string(), "b".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
