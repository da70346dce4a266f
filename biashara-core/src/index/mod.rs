// biashara-core/src/index/mod.rs

//! Similarity search over the prebuilt knowledge base: PDF report chunks and
//! indicator metadata rows.
//!
//! Building the index (chunking, embedding, persisting) happens offline. This
//! module only reads the snapshot the build produces and answers queries.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub mod embedded;

pub use embedded::{EmbeddedIndex, Embedder, IndexedDocument, OpenAIEmbedder};

/// Metadata key holding the document's [`SearchSource`].
pub const SOURCE_KEY: &str = "source";

/// Which slice of the knowledge base a document came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Chunks of reports on Kenya's economy and entrepreneurial ecosystem.
    EntrepreneurshipPdf,
    /// One row per statistics-API indicator (`INDICATOR_ID: ... | DATASET_ID: ...`).
    CsvRow,
    IndicatorMeta,
}

impl SearchSource {
    pub const ALL: [SearchSource; 3] = [
        SearchSource::EntrepreneurshipPdf,
        SearchSource::CsvRow,
        SearchSource::IndicatorMeta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::EntrepreneurshipPdf => "entrepreneurship_pdf",
            SearchSource::CsvRow => "csv_row",
            SearchSource::IndicatorMeta => "indicator_meta",
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown source '{}', expected one of: entrepreneurship_pdf, csv_row, indicator_meta",
                    s
                )
            })
    }
}

/// One ranked result: the snippet text plus every metadata field of its document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub content: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Ranked snippet lookup. Omitting `source` searches everything.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        source: Option<SearchSource>,
    ) -> Result<Vec<SearchHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_source_parse_round_trip() {
        for source in SearchSource::ALL {
            assert_eq!(source.as_str().parse::<SearchSource>().unwrap(), source);
        }
        assert!("pdf".parse::<SearchSource>().is_err());
    }

    #[test]
    fn test_search_hit_flattens_metadata() {
        let hit = SearchHit {
            content: "INDICATOR_ID: X".into(),
            metadata: json!({ "source": "csv_row", "row_index": 4 })
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&hit).unwrap(),
            json!({ "content": "INDICATOR_ID: X", "source": "csv_row", "row_index": 4 })
        );
    }
}
