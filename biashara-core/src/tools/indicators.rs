// biashara-core/src/tools/indicators.rs

//! Maps a free-text topic onto the exact dataset and indicator identifiers the
//! statistics API needs.
//!
//! The indicator metadata rows of the knowledge base carry their identifiers
//! as labelled fields (`INDICATOR_ID: ... | DATASET_ID: ...`). Resolution is a
//! semantic search over those rows followed by label extraction.

use super::{Tool, optional_count, required_str};
use crate::errors::ToolError;
use crate::index::{SearchSource, SemanticIndex};
use crate::models::tools::{ToolInput, ToolParameter, ToolParameterType, ToolParametersDefinition};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_K: usize = 3;

/// Metadata rows live in the tabular slice of the index.
const METADATA_SOURCE: SearchSource = SearchSource::CsvRow;

lazy_static! {
    static ref INDICATOR_ID: Regex =
        Regex::new(r"INDICATOR_ID:[ \t]*([^|\n]+)").expect("indicator pattern is valid");
    static ref DATASET_ID: Regex =
        Regex::new(r"DATASET_ID:[ \t]*([^|\n]+)").expect("dataset pattern is valid");
}

/// Identifiers ready to hand to `query_data`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIndicators {
    #[serde(rename = "datasetId")]
    pub dataset_ids: Vec<String>,
    #[serde(rename = "indicatorIds")]
    pub indicator_ids: Vec<String>,
    #[serde(rename = "countryCodes")]
    pub country_codes: String,
}

/// Pulls at most one indicator and one dataset identifier out of each
/// snippet. The two labels are matched independently, so a snippet with only
/// one of them still counts. Both lists come back deduplicated in first-seen
/// order.
pub fn extract_identifiers<'a>(
    snippets: impl IntoIterator<Item = &'a str>,
) -> (Vec<String>, Vec<String>) {
    let mut indicators = Vec::new();
    let mut datasets = Vec::new();
    for snippet in snippets {
        indicators.extend(labelled_value(&INDICATOR_ID, snippet));
        datasets.extend(labelled_value(&DATASET_ID, snippet));
    }
    (dedup_in_order(indicators), dedup_in_order(datasets))
}

/// The value of the first `pattern` label in `snippet`, up to the next field
/// delimiter or line end.
fn labelled_value(pattern: &Regex, snippet: &str) -> Option<String> {
    pattern
        .captures(snippet)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn dedup_in_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

pub struct IndicatorResolver {
    index: Arc<dyn SemanticIndex>,
    country_code: String,
}

impl IndicatorResolver {
    pub fn new(index: Arc<dyn SemanticIndex>, country_code: String) -> Self {
        Self { index, country_code }
    }

    /// Resolves `query` to identifiers. A `dataset_hint` from the model is
    /// trusted and placed ahead of anything the search turns up.
    pub async fn resolve(
        &self,
        query: &str,
        dataset_hint: Option<&str>,
        k: usize,
    ) -> Result<ResolvedIndicators, ToolError> {
        let hits = self
            .index
            .similarity_search(query, k, Some(METADATA_SOURCE))
            .await
            .map_err(ToolError::Search)?;
        debug!(query, k, num_hits = hits.len(), "Indicator metadata search complete");

        let (indicator_ids, found_datasets) =
            extract_identifiers(hits.iter().map(|hit| hit.content.as_str()));
        if indicator_ids.is_empty() {
            info!(query, "No indicator identifiers in metadata hits");
            return Err(ToolError::NoIndicator);
        }

        let hint = dataset_hint.map(str::trim).filter(|h| !h.is_empty());
        let dataset_ids = dedup_in_order(hint.map(String::from).into_iter().chain(found_datasets).collect());

        info!(
            query,
            indicators = ?indicator_ids,
            datasets = ?dataset_ids,
            "Resolved indicator identifiers"
        );
        Ok(ResolvedIndicators {
            dataset_ids,
            indicator_ids,
            country_codes: self.country_code.clone(),
        })
    }
}

/// `wb_api_query_with_semantic_search`: the model-facing wrapper around
/// [`IndicatorResolver`].
pub struct IndicatorSearchTool {
    resolver: IndicatorResolver,
}

impl IndicatorSearchTool {
    pub fn new(resolver: IndicatorResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Tool for IndicatorSearchTool {
    fn description(&self) -> String {
        "Finds the statistics API dataset and indicator identifiers for an economic topic \
         (for example 'GDP growth' or 'inflation'). Call this before query_data whenever the \
         exact identifiers are unknown. Do not put a country name in the query; the country \
         is fixed."
            .to_string()
    }

    fn parameters(&self) -> ToolParametersDefinition {
        ToolParametersDefinition::object()
            .with_param(
                "query",
                ToolParameter::new(
                    ToolParameterType::String,
                    "The economic topic to look up, without any country name.",
                ),
                true,
            )
            .with_param(
                "dataset_id",
                ToolParameter::new(
                    ToolParameterType::String,
                    "A dataset identifier, if already known.",
                ),
                false,
            )
            .with_param(
                "k",
                ToolParameter::new(ToolParameterType::Integer, "How many metadata rows to consider.")
                    .with_default(Value::from(DEFAULT_K)),
                false,
            )
    }

    async fn call(&self, input: ToolInput) -> Result<Value, ToolError> {
        let query = required_str(&input, "query")?;
        let k = optional_count(&input, "k", DEFAULT_K)?;
        let resolved = self
            .resolver
            .resolve(query, input.get_str("dataset_id"), k)
            .await?;
        serde_json::to_value(resolved).map_err(|e| ToolError::Request(e.into()))
    }
}
