// biashara-core/src/tools/query_data.rs
use super::{Tool, optional_count, string_list};
use crate::config::DataApiConfig;
use crate::errors::ToolError;
use crate::models::tools::{ToolInput, ToolParameter, ToolParameterType, ToolParametersDefinition};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

/// A fully specified statistics API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQuery {
    pub dataset_id: String,
    pub indicator_ids: Vec<String>,
    pub country_codes: Vec<String>,
    pub years: Vec<String>,
    pub top: u64,
    pub skip: u64,
}

impl DataQuery {
    /// Builds a query from the model's arguments, filling the country and page
    /// size from configuration when absent.
    pub fn from_input(input: &ToolInput, default_country: &str, default_top: u64) -> Result<Self, ToolError> {
        let dataset_id = match string_list(input, "datasetId")?.as_deref() {
            Some([single]) => single.clone(),
            Some(many) => {
                return Err(ToolError::InvalidArguments(format!(
                    "query one datasetId at a time, got {}",
                    many.join(", ")
                )));
            }
            None => return Err(ToolError::InvalidArguments("missing required argument 'datasetId'".into())),
        };
        let indicator_ids = string_list(input, "indicatorIds")?
            .ok_or_else(|| ToolError::InvalidArguments("missing required argument 'indicatorIds'".into()))?;
        let country_codes =
            string_list(input, "countryCodes")?.unwrap_or_else(|| vec![default_country.to_string()]);
        let years = string_list(input, "years")?.unwrap_or_default();
        let top = optional_count(input, "top", default_top as usize)? as u64;
        let skip = optional_count(input, "skip", 0)? as u64;

        Ok(Self {
            dataset_id,
            indicator_ids,
            country_codes,
            years,
            top,
            skip,
        })
    }

    /// Query string pairs; list values become repeated keys.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("datasetId", self.dataset_id.clone())];
        pairs.extend(self.indicator_ids.iter().map(|id| ("indicatorIds", id.clone())));
        pairs.extend(self.country_codes.iter().map(|c| ("countryCodes", c.clone())));
        pairs.extend(self.years.iter().map(|y| ("years", y.clone())));
        pairs.push(("top", self.top.to_string()));
        pairs.push(("skip", self.skip.to_string()));
        pairs
    }
}

/// Thin client for the statistics API. No retries: a failure is reported as is.
pub struct DataFetcher {
    http_client: Client,
    base_url: String,
    default_country: String,
    default_top: u64,
}

impl DataFetcher {
    pub fn new(http_client: Client, base_url: String, default_country: String, default_top: u64) -> Self {
        Self {
            http_client,
            base_url,
            default_country,
            default_top,
        }
    }

    pub fn from_config(config: &DataApiConfig, http_client: Client) -> Self {
        Self::new(
            http_client,
            config.base_url.clone(),
            config.default_country.clone(),
            config.default_top,
        )
    }

    pub async fn fetch(&self, query: &DataQuery) -> Result<Value, ToolError> {
        info!(
            dataset = %query.dataset_id,
            indicators = ?query.indicator_ids,
            countries = ?query.country_codes,
            "Querying statistics API"
        );
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(|e| ToolError::Request(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            warn!(status = %status, body = %body, "Statistics API returned an error");
            return Err(ToolError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|e| ToolError::Request(e.into()))?;
        trace!(payload = %payload, "Statistics API payload");
        debug!("Statistics API call succeeded");
        Ok(payload)
    }
}

/// `query_data`: fetches indicator values once the identifiers are known.
pub struct QueryDataTool {
    fetcher: DataFetcher,
}

impl QueryDataTool {
    pub fn new(fetcher: DataFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for QueryDataTool {
    fn description(&self) -> String {
        "Fetches indicator values from the World Bank statistics API. Needs the exact datasetId \
         and indicatorIds, which wb_api_query_with_semantic_search provides."
            .to_string()
    }

    fn parameters(&self) -> ToolParametersDefinition {
        let string_items = || ToolParameter::new(ToolParameterType::String, "One value.");
        ToolParametersDefinition::object()
            .with_param(
                "datasetId",
                ToolParameter::new(ToolParameterType::String, "The dataset identifier."),
                true,
            )
            .with_param(
                "indicatorIds",
                ToolParameter::new(ToolParameterType::Array, "Indicator identifiers to fetch.")
                    .with_items(string_items()),
                true,
            )
            .with_param(
                "countryCodes",
                ToolParameter::new(ToolParameterType::String, "ISO3 country code.")
                    .with_default(Value::from(self.fetcher.default_country.clone())),
                false,
            )
            .with_param(
                "years",
                ToolParameter::new(ToolParameterType::Array, "Years to restrict the results to.")
                    .with_items(string_items()),
                false,
            )
            .with_param(
                "top",
                ToolParameter::new(ToolParameterType::Integer, "Maximum number of records.")
                    .with_default(Value::from(self.fetcher.default_top)),
                false,
            )
            .with_param(
                "skip",
                ToolParameter::new(ToolParameterType::Integer, "Records to skip, for paging.")
                    .with_default(Value::from(0)),
                false,
            )
    }

    async fn call(&self, input: ToolInput) -> Result<Value, ToolError> {
        let query = DataQuery::from_input(&input, &self.fetcher.default_country, self.fetcher.default_top)?;
        self.fetcher.fetch(&query).await
    }
}
