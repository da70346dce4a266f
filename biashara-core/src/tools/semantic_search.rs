// biashara-core/src/tools/semantic_search.rs
use super::{Tool, optional_count, required_str};
use crate::errors::ToolError;
use crate::index::{SearchSource, SemanticIndex};
use crate::models::tools::{ToolInput, ToolParameter, ToolParameterType, ToolParametersDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_K: usize = 5;

/// Free-text retrieval over the internal knowledge base.
pub struct SemanticSearchTool {
    index: Arc<dyn SemanticIndex>,
}

impl SemanticSearchTool {
    pub fn new(index: Arc<dyn SemanticIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for SemanticSearchTool {
    fn description(&self) -> String {
        "Searches the internal knowledge base of Kenyan business reports, indicator metadata and \
         data rows. Use this first for questions about business environment, regulation, \
         finance access or sector conditions."
            .to_string()
    }

    fn parameters(&self) -> ToolParametersDefinition {
        let sources: Vec<&str> = SearchSource::ALL.iter().map(|s| s.as_str()).collect();
        ToolParametersDefinition::object()
            .with_param(
                "query",
                ToolParameter::new(ToolParameterType::String, "What to look for, in plain language."),
                true,
            )
            .with_param(
                "k",
                ToolParameter::new(ToolParameterType::Integer, "How many snippets to return.")
                    .with_default(Value::from(DEFAULT_K)),
                false,
            )
            .with_param(
                "source",
                ToolParameter::new(
                    ToolParameterType::String,
                    "Restrict the search to one kind of document. Omit to search everything.",
                )
                .with_enum(&sources),
                false,
            )
    }

    async fn call(&self, input: ToolInput) -> Result<Value, ToolError> {
        let query = required_str(&input, "query")?;
        let k = optional_count(&input, "k", DEFAULT_K)?;
        let source = input
            .get_str("source")
            .map(|s| s.parse::<SearchSource>().map_err(ToolError::InvalidArguments))
            .transpose()?;

        debug!(query, k, ?source, "Running semantic search");
        let hits = self
            .index
            .similarity_search(query, k, source)
            .await
            .map_err(ToolError::Search)?;

        serde_json::to_value(hits).map_err(|e| ToolError::Search(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchHit;
    use anyhow::{Result, anyhow};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<(String, usize, Option<SearchSource>)>>,
        fail: bool,
    }

    #[async_trait]
    impl SemanticIndex for RecordingIndex {
        async fn similarity_search(
            &self,
            query: &str,
            k: usize,
            source: Option<SearchSource>,
        ) -> Result<Vec<SearchHit>> {
            self.calls.lock().unwrap().push((query.to_string(), k, source));
            if self.fail {
                return Err(anyhow!("index offline"));
            }
            Ok(vec![SearchHit {
                content: "Tea exports grew".into(),
                metadata: json!({ "source": "entrepreneurship_pdf", "page": 4 })
                    .as_object()
                    .cloned()
                    .unwrap(),
            }])
        }
    }

    fn input(value: Value) -> ToolInput {
        ToolInput {
            arguments: value.as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_defaults_and_hit_shape() {
        let index = Arc::new(RecordingIndex::default());
        let tool = SemanticSearchTool::new(index.clone());

        let out = tool.call(input(json!({ "query": "tea exports" }))).await.unwrap();

        assert_eq!(
            out,
            json!([{ "content": "Tea exports grew", "source": "entrepreneurship_pdf", "page": 4 }])
        );
        assert_eq!(
            index.calls.lock().unwrap().as_slice(),
            &[("tea exports".to_string(), DEFAULT_K, None)]
        );
    }

    #[tokio::test]
    async fn test_source_filter_passed_through() {
        let index = Arc::new(RecordingIndex::default());
        let tool = SemanticSearchTool::new(index.clone());

        tool.call(input(json!({ "query": "q", "k": 2, "source": "indicator_meta" })))
            .await
            .unwrap();

        assert_eq!(
            index.calls.lock().unwrap()[0],
            ("q".to_string(), 2, Some(SearchSource::IndicatorMeta))
        );
    }

    #[tokio::test]
    async fn test_bad_arguments_are_recoverable() {
        let tool = SemanticSearchTool::new(Arc::new(RecordingIndex::default()));

        let missing = tool.call(input(json!({}))).await.unwrap_err();
        assert!(matches!(missing, ToolError::InvalidArguments(_)));

        let bad_source = tool
            .call(input(json!({ "query": "q", "source": "tweets" })))
            .await
            .unwrap_err();
        assert!(matches!(bad_source, ToolError::InvalidArguments(_)));
        assert!(bad_source.is_recoverable());
    }

    #[tokio::test]
    async fn test_index_failure_maps_to_search_error() {
        let index = Arc::new(RecordingIndex {
            fail: true,
            ..Default::default()
        });
        let err = SemanticSearchTool::new(index)
            .call(input(json!({ "query": "q" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Search(_)));
    }
}
