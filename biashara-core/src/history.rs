// biashara-core/src/history.rs

//! Keeps the conversation inside the model's context window by folding the
//! oldest turns into a short synopsis.

use crate::config::LoopConfig;
use crate::errors::AgentError;
use crate::models::chat::ChatMessage;
use crate::providers::Provider;
use anyhow::anyhow;
use std::sync::Arc;
use tracing::{debug, info};

pub const SUMMARY_INSTRUCTION: &str =
    "Summarize the following conversation in 3 bullet points (no tools!):";
pub const SUMMARY_PREFIX: &str = "Conversation so far (summary):";

pub struct HistoryCompressor {
    summarizer: Arc<dyn Provider>,
    threshold: usize,
    chunk: usize,
}

impl HistoryCompressor {
    pub fn new(summarizer: Arc<dyn Provider>, threshold: usize, chunk: usize) -> Self {
        Self {
            summarizer,
            threshold,
            chunk,
        }
    }

    pub fn from_loop_config(summarizer: Arc<dyn Provider>, config: &LoopConfig) -> Self {
        Self::new(summarizer, config.summarize_threshold, config.summarize_chunk)
    }

    pub fn needs_compaction(&self, history: &[ChatMessage]) -> bool {
        history.len() > self.threshold
    }

    /// Replaces the oldest chunk with one summary message when the history is
    /// over the threshold. Runs a single pass; the tail is kept as is.
    ///
    /// On a failed summarization the error is returned and nothing is dropped.
    pub async fn compact(&self, history: Vec<ChatMessage>) -> Result<Vec<ChatMessage>, AgentError> {
        if !self.needs_compaction(&history) {
            return Ok(history);
        }

        let mut oldest = history;
        let tail = oldest.split_off(self.chunk.min(oldest.len()));
        info!(
            num_messages = oldest.len() + tail.len(),
            summarized = oldest.len(),
            "History over threshold, summarizing oldest messages"
        );

        let summary = self.summarize(&oldest).await?;

        let mut compacted = Vec::with_capacity(tail.len() + 1);
        compacted.push(ChatMessage::system(format!("{}\n{}", SUMMARY_PREFIX, summary)));
        compacted.extend(tail);
        debug!(num_messages = compacted.len(), "History compacted");
        Ok(compacted)
    }

    async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        // Only the role and text of plain dialogue go to the summarizer.
        let dialogue = messages
            .iter()
            .filter(|m| m.is_plain_dialogue())
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
                ..Default::default()
            });
        let prompt: Vec<ChatMessage> = std::iter::once(ChatMessage::system(SUMMARY_INSTRUCTION))
            .chain(dialogue)
            .collect();
        debug!(
            num_messages = prompt.len() - 1,
            summarizer = self.summarizer.name(),
            "Requesting history summary"
        );

        let response = self
            .summarizer
            .get_completion(prompt, None)
            .await
            .map_err(AgentError::Summarization)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AgentError::Summarization(anyhow!("Summarizer returned no text")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ApiResponse, Choice, Role};
    use crate::models::tools::{ToolCall, ToolDefinition, ToolFunction};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSummarizer {
        reply: Option<String>,
        calls: Mutex<Vec<(Vec<ChatMessage>, bool)>>,
    }

    impl RecordingSummarizer {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for RecordingSummarizer {
        fn name(&self) -> &str {
            "recording-summarizer"
        }

        async fn get_completion(
            &self,
            messages: Vec<ChatMessage>,
            tools: Option<&[ToolDefinition]>,
        ) -> Result<ApiResponse> {
            self.calls.lock().unwrap().push((messages, tools.is_some()));
            match &self.reply {
                Some(text) => Ok(ApiResponse {
                    id: "sum-1".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: ChatMessage::assistant(text.clone()),
                        finish_reason: Some("stop".into()),
                    }],
                }),
                None => Err(anyhow!("summarizer unavailable")),
            }
        }
    }

    fn dialogue(len: usize) -> Vec<ChatMessage> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("question {}", i))
                } else {
                    ChatMessage::assistant(format!("answer {}", i))
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_at_or_below_threshold_is_noop() {
        let summarizer = RecordingSummarizer::replying("- unused");
        let compressor = HistoryCompressor::new(summarizer.clone(), 20, 10);

        for len in [0, 1, 19, 20] {
            let history = dialogue(len);
            let out = compressor.compact(history.clone()).await.unwrap();
            assert_eq!(out, history);
        }
        assert!(summarizer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_twenty_five_messages_become_sixteen() {
        let summarizer = RecordingSummarizer::replying("- a\n- b\n- c");
        let compressor = HistoryCompressor::new(summarizer.clone(), 20, 10);
        let history = dialogue(25);

        let out = compressor.compact(history.clone()).await.unwrap();

        assert_eq!(out.len(), 16);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(
            out[0].content.as_deref(),
            Some("Conversation so far (summary):\n- a\n- b\n- c")
        );
        assert_eq!(&out[1..], &history[10..]);
    }

    #[tokio::test]
    async fn test_summarizer_sees_only_plain_dialogue_without_tools() {
        let summarizer = RecordingSummarizer::replying("- summary");
        let compressor = HistoryCompressor::new(summarizer.clone(), 4, 4);
        let call = ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: ToolFunction {
                name: "semantic_search".into(),
                arguments: "{}".into(),
            },
        };
        let history = vec![
            ChatMessage::user("How do I register a business?"),
            ChatMessage::tool_request(vec![call]),
            ChatMessage::tool_result("call_1", "semantic_search", "[...]"),
            ChatMessage::assistant("Use the eCitizen portal."),
            ChatMessage::user("Thanks"),
        ];

        let out = compressor.compact(history).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], ChatMessage::user("Thanks"));

        let calls = summarizer.calls.lock().unwrap();
        let (prompt, offered_tools) = &calls[0];
        assert!(!offered_tools);
        assert_eq!(
            prompt,
            &vec![
                ChatMessage::system(SUMMARY_INSTRUCTION),
                ChatMessage::user("How do I register a business?"),
                ChatMessage::assistant("Use the eCitizen portal."),
            ]
        );
    }

    #[tokio::test]
    async fn test_summarizer_failure_propagates() {
        let compressor = HistoryCompressor::new(RecordingSummarizer::failing(), 20, 10);
        let err = compressor.compact(dialogue(21)).await.unwrap_err();
        assert!(matches!(err, AgentError::Summarization(_)));
    }

    #[tokio::test]
    async fn test_blank_summary_is_a_failure() {
        let compressor = HistoryCompressor::new(RecordingSummarizer::replying("   "), 20, 10);
        let err = compressor.compact(dialogue(21)).await.unwrap_err();
        assert!(matches!(err, AgentError::Summarization(_)));
    }
}
