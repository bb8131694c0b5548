use async_trait::async_trait;

use crate::client::{ChatOutcome, Runtime, RuntimeReply, RuntimeUsage};
use crate::error::RuntimeCallError;
use crate::models::{CompletionParams, Message, estimate_prompt_tokens};

pub const MOCK_TEXT: &str = "This is a mock response.";
pub const MOCK_COMPLETION_TOKENS: u64 = 5;

// stand-in runtime for local development: accepts every reset and
// answers every chat with the same canned text
#[derive(Debug, Default, Clone, Copy)]
pub struct MockRuntime;

#[async_trait]
impl Runtime for MockRuntime {

    async fn reset(&self, _system_prompt: &str) -> Result<(), RuntimeCallError> {
        Ok(())
    }

    async fn chat(&self, messages: &[Message], _params: &CompletionParams) -> Result<ChatOutcome, RuntimeCallError> {

        Ok(ChatOutcome::Reply(RuntimeReply::Generated {
            text: MOCK_TEXT.to_string(),
            usage: Some(RuntimeUsage {
                prompt_tokens: estimate_prompt_tokens(messages),
                completion_tokens: MOCK_COMPLETION_TOKENS,
            }),
        }))

    }

    async fn health(&self) -> bool {
        true
    }

}
