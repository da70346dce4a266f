// biashara-cli/src/session.rs

//! One user turn against a saved conversation thread.

use crate::history::ConversationHistory;
use biashara_core::{Agent, AgentError, ChatMessage};
use tracing::{error, info};

pub const APOLOGY: &str =
    "Sorry, I ran into a problem while working on that. Please try again in a moment.";

/// Appends `input` to the thread, runs one conversation step and stores the
/// result. On failure the user's message stays in the thread so the question
/// can simply be asked again.
pub async fn take_turn(
    agent: &Agent,
    conversation: &mut ConversationHistory,
    input: &str,
) -> Result<String, AgentError> {
    conversation.messages.push(ChatMessage::user(input));
    conversation.touch();

    match agent.step(conversation.messages.clone()).await {
        Ok(output) => {
            info!(
                history_id = %conversation.id,
                num_tool_calls = output.tool_results.len(),
                "Turn completed"
            );
            conversation.messages = output.history;
            conversation.touch();
            Ok(output.reply.content.unwrap_or_default())
        }
        Err(e) => {
            error!(history_id = %conversation.id, error = %e, "Turn failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use biashara_core::{
        ApiResponse, Choice, LoopConfig, Provider, ToolDefinition, ToolRegistry, async_trait,
    };
    use std::sync::Arc;

    struct FixedProvider(Option<&'static str>);

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_completion(
            &self,
            _messages: Vec<ChatMessage>,
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ApiResponse> {
            let text = self.0.ok_or_else(|| anyhow!("model offline"))?;
            Ok(ApiResponse {
                id: "fixed".into(),
                choices: vec![Choice {
                    index: 0,
                    message: ChatMessage::assistant(text),
                    finish_reason: None,
                }],
            })
        }
    }

    fn agent(reply: Option<&'static str>) -> Agent {
        let provider = Arc::new(FixedProvider(reply));
        Agent::new(
            provider.clone(),
            provider,
            ToolRegistry::new(),
            "prompt",
            &LoopConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_successful_turn_records_both_sides() {
        let mut conversation = ConversationHistory::new(vec![]);

        let reply = take_turn(&agent(Some("Try the Uwezo Fund.")), &mut conversation, "Funding for youth?")
            .await
            .unwrap();

        assert_eq!(reply, "Try the Uwezo Fund.");
        assert_eq!(
            conversation.messages,
            vec![
                ChatMessage::user("Funding for youth?"),
                ChatMessage::assistant("Try the Uwezo Fund."),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_question() {
        let mut conversation = ConversationHistory::new(vec![]);

        let err = take_turn(&agent(None), &mut conversation, "Funding for youth?").await;

        assert!(matches!(err, Err(AgentError::Api(_))));
        assert_eq!(conversation.messages, vec![ChatMessage::user("Funding for youth?")]);
    }
}
