// biashara-core/src/index/embedded.rs
use super::{SOURCE_KEY, SearchHit, SearchSource, SemanticIndex};
use crate::api;
use crate::config::{EmbeddingsConfig, read_api_key};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns query text into a vector in the same space as the indexed documents.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeddings through an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    http_client: Client,
    endpoint: String,
    api_key: String,
    model_name: String,
}

impl OpenAIEmbedder {
    pub fn new(http_client: Client, endpoint: String, api_key: String, model_name: String) -> Self {
        Self {
            http_client,
            endpoint,
            api_key,
            model_name,
        }
    }

    pub fn from_config(config: &EmbeddingsConfig, http_client: Client) -> Self {
        Self::new(
            http_client,
            config.endpoint.clone(),
            read_api_key(config.api_key_env_var.as_deref()),
            config.model_name.clone(),
        )
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = api::get_embeddings(
            &self.http_client,
            &self.endpoint,
            &self.api_key,
            &self.model_name,
            &[text.to_string()],
        )
        .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("Embeddings endpoint returned no vector"))
    }
}

/// One entry of the index snapshot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }
}

/// Brute-force cosine search over documents held in memory.
///
/// Read-only once loaded, so one instance can serve every conversation.
pub struct EmbeddedIndex {
    documents: Vec<IndexedDocument>,
    dimensions: usize,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddedIndex {
    pub fn new(documents: Vec<IndexedDocument>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimensions = documents.first().map_or(0, |d| d.embedding.len());
        if let Some(pos) = documents
            .iter()
            .position(|d| d.embedding.len() != dimensions)
        {
            return Err(anyhow!(
                "Index document {} has {} dimensions, expected {}",
                pos,
                documents[pos].embedding.len(),
                dimensions
            ));
        }
        Ok(Self {
            documents,
            dimensions,
            embedder,
        })
    }

    /// Loads a JSON snapshot: an array of `{content, metadata, embedding}`.
    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open index snapshot at {:?}", path))?;
        let documents: Vec<IndexedDocument> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to deserialize index snapshot from {:?}", path))?;
        let index = Self::new(documents, embedder)?;
        info!(
            path = %path.display(),
            documents = index.len(),
            dimensions = index.dimensions,
            "Loaded semantic index snapshot."
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for EmbeddedIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        source: Option<SearchSource>,
    ) -> Result<Vec<SearchHit>> {
        if self.documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed search query")?;
        if query_embedding.len() != self.dimensions {
            return Err(anyhow!(
                "Query embedding has {} dimensions, index has {}",
                query_embedding.len(),
                self.dimensions
            ));
        }

        let mut scored: Vec<(f32, &IndexedDocument)> = self
            .documents
            .iter()
            .filter(|doc| source.is_none_or(|s| doc.source() == Some(s.as_str())))
            .map(|doc| (cosine_similarity(&doc.embedding, &query_embedding), doc))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!(
            query = %query,
            source = ?source,
            hits = scored.len(),
            "Semantic search finished."
        );

        Ok(scored
            .into_iter()
            .map(|(_, doc)| SearchHit {
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect())
    }
}

/// Returns 0.0 when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
