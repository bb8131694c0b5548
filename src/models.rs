use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String
}

impl Message {

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message { role, content: content.into() }
    }

}

#[derive(Debug, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: Option<f32>,
    // wider than any ceiling so oversized values reach the limit check
    #[serde(default)]
    pub max_tokens: Option<u64>
}

// generation parameters forwarded to the runtime's chat call as-is
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32
}

impl CompletionRequest {

    pub fn resolve_params(&self, default_max_tokens: u32, ceiling: u32) -> Result<CompletionParams, ApiError> {

        let requested = self.max_tokens.unwrap_or(u64::from(default_max_tokens));

        if requested > u64::from(ceiling) {
            return Err(ApiError::Validation(format!(
                "max_tokens ({}) exceeds allowed limit ({})",
                requested, ceiling
            )));
        }

        let max_tokens = u32::try_from(requested)
            .map_err(|_| ApiError::Validation(format!("max_tokens ({}) is out of range", requested)))?;

        Ok(CompletionParams {
            max_tokens,
            temperature: self.temperature.unwrap_or(0.0),
        })

    }

    // the first system message primes the runtime through reset
    pub fn system_prompt(&self) -> &str {

        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("")

    }

    // every system message is stripped from the turns sent to chat
    pub fn turns(&self) -> Vec<Message> {

        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()

    }

}

// what the adapter hands back regardless of which runtime answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64
}

impl CompletionResponse {

    pub fn from_completion(model: &str, completion: Completion) -> Self {

        let id = uuid::Uuid::new_v4().simple().to_string();

        CompletionResponse {
            id: format!("chatcmpl-{}", &id[..8]),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::new(Role::Assistant, completion.text),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage {
                prompt_tokens: completion.prompt_tokens,
                completion_tokens: completion.completion_tokens,
                total_tokens: completion.prompt_tokens + completion.completion_tokens,
            },
        }

    }

}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelEntry {
    pub path: String,
    pub exists: bool
}

// rough usage figure when the runtime does not report one
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

pub fn estimate_prompt_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
