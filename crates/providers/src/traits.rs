//! Provider-agnostic chat-completion types and the adapter trait.
//!
//! Grounded on the teacher's `LlmProvider`/`ChatRequest`/`ChatResponse`
//! shape, trimmed to what the generation pipeline needs: this core has one
//! provider family (OpenRouter) and no tool-calling, so `tools`/streaming
//! fields are dropped rather than carried as dead surface.

use relay_domain::Result;

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Vec<String>,
    pub reasoning: Option<relay_domain::types::ReasoningOptions>,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest, api_key: &str) -> Result<ChatResponse>;
    fn provider_id(&self) -> &str;
}
