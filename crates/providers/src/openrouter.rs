//! LLM Invocation — pipeline stage 8 (spec §4.3): the OpenRouter adapter.
//!
//! Wraps the HTTP transport in a custom fetch that (a) injects
//! provider-specific extras into the request body, (b) intercepts the
//! response to recover hidden reasoning text and to recover from 400-class
//! responses that nonetheless carry a usable completion.
//!
//! Grounded structurally on the teacher's OpenAI-compatible adapter (same
//! "build body, authed POST, parse response" shape) but the wire format and
//! the response-interception logic are new — the teacher has no equivalent
//! to OpenRouter's reasoning-details recovery or 400-with-valid-body quirk.

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use relay_domain::{Error, ErrorCategory, Result};

use crate::traits::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, Usage};

const CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRouterProvider {
    pub fn new() -> Self {
        Self::with_base_url(CHAT_COMPLETIONS_URL.to_string())
    }

    /// Used by tests to point at a `wiremock` server instead of the real API.
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction");
        Self { client, base_url }
    }

    fn build_body(req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            // OpenRouter-specific extras (spec §4.3 stage 8a).
            "transforms": ["middle-out"],
            "route": "fallback",
            "verbosity": "normal",
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if !req.stop_sequences.is_empty() {
            body["stop"] = json!(req.stop_sequences);
        }
        if let Some(reasoning) = &req.reasoning {
            if reasoning.enabled {
                body["reasoning"] = json!({ "effort": reasoning.effort });
            }
        }
        body
    }

    /// Runs the HTTP call racing a cancellation signal (§5: "each outbound
    /// LLM call receives a timeout and an abort signal").
    async fn post_with_cancel(&self, body: &Value, api_key: &str, cancel: &CancellationToken) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(body)
            .send();

        tokio::select! {
            result = request => result.map_err(from_reqwest),
            _ = cancel.cancelled() => Err(Error::Timeout("cancelled".into())),
        }
    }
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn chat(&self, req: ChatRequest, api_key: &str) -> Result<ChatResponse> {
        self.chat_cancellable(req, api_key, &CancellationToken::new()).await
    }

    fn provider_id(&self) -> &str {
        "openrouter"
    }
}

impl OpenRouterProvider {
    pub async fn chat_cancellable(
        &self,
        req: ChatRequest,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse> {
        let model = req.model.clone();
        let body = Self::build_body(&req);
        let response = self.post_with_cancel(&body, api_key, cancel).await?;
        let status = response.status();
        let text = response.text().await.map_err(from_reqwest)?;

        if status.is_success() {
            return parse_success(&text, &model);
        }

        // 400-class recovery (stage 8b-ii): free-tier models sometimes
        // return HTTP 400 with a body that still carries a usable
        // completion. Peek for it before treating this as an error.
        if status.as_u16() == 400 {
            if let Ok(recovered) = parse_success(&text, &model) {
                return Ok(recovered);
            }
        }

        let category = ErrorCategory::classify(Some(status.as_u16()), &text);
        Err(Error::Provider {
            provider: "openrouter".into(),
            message: format!("{category:?}: {text}"),
        })
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Parses a successful (or 400-with-valid-body) completion, performing
/// reasoning recovery (stage 8b-i).
fn parse_success(text: &str, requested_model: &str) -> Result<ChatResponse> {
    let value: Value = serde_json::from_str(text).map_err(Error::from)?;
    let choice = value
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| Error::Other("missing choices[0]".into()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| Error::Other("missing choices[0].message".into()))?;
    let mut content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(reasoning_text) = extract_reasoning(message) {
        content = format!("<reasoning>{reasoning_text}</reasoning>{content}");
    }

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(String::from);
    let usage = value.get("usage").map(|u| Usage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        content,
        model,
        finish_reason,
        usage,
    })
}

/// Recovers hidden reasoning text from either the flat `message.reasoning`
/// string or the structured `message.reasoning_details[]` array. Within the
/// structured form, `reasoning.text`/`reasoning.summary` entries are
/// concatenated; `reasoning.encrypted` entries are skipped (spec §4.3
/// stage 8b-i).
fn extract_reasoning(message: &Value) -> Option<String> {
    if let Some(flat) = message.get("reasoning").and_then(Value::as_str) {
        if !flat.is_empty() {
            return Some(flat.to_string());
        }
    }

    let details = message.get("reasoning_details").and_then(Value::as_array)?;
    let mut parts = Vec::new();
    for detail in details {
        match detail.get("type").and_then(Value::as_str) {
            Some("reasoning.text") | Some("reasoning.summary") => {
                if let Some(text) = detail.get("text").and_then(Value::as_str) {
                    parts.push(text.to_string());
                }
            }
            _ => {} // "reasoning.encrypted" and anything unrecognized are skipped.
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn basic_request(model: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hello".into(),
            }],
            model: model.into(),
            temperature: Some(0.7),
            max_tokens: Some(256),
            stop_sequences: vec![],
            reasoning: None,
        }
    }

    #[test]
    fn extracts_flat_reasoning_string() {
        let message = json!({"content": "answer", "reasoning": "because X"});
        assert_eq!(extract_reasoning(&message), Some("because X".to_string()));
    }

    #[test]
    fn extracts_structured_reasoning_text_and_summary_skips_encrypted() {
        let message = json!({
            "content": "answer",
            "reasoning_details": [
                {"type": "reasoning.encrypted", "data": "opaque"},
                {"type": "reasoning.text", "text": "step one"},
                {"type": "reasoning.summary", "text": "step two"}
            ]
        });
        assert_eq!(extract_reasoning(&message), Some("step one\nstep two".to_string()));
    }

    #[tokio::test]
    async fn e5_recovers_content_from_400_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "choices": [{"message": {"content": "partial"}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_base_url(server.uri());
        let resp = provider.chat(basic_request("x/model:free"), "sk-test").await.unwrap();
        assert_eq!(resp.content, "partial");
    }

    #[tokio::test]
    async fn injects_reasoning_tag_into_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "x/model",
                "choices": [{"message": {"content": "final answer", "reasoning": "thinking..."}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_base_url(server.uri());
        let resp = provider.chat(basic_request("x/model"), "sk-test").await.unwrap();
        assert_eq!(resp.content, "<reasoning>thinking...</reasoning>final answer");
        assert_eq!(resp.usage.unwrap().prompt_tokens, 10);
    }

    #[tokio::test]
    async fn genuine_error_is_classified_not_recovered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_base_url(server.uri());
        let err = provider.chat(basic_request("x/model"), "sk-test").await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::with_base_url(server.uri());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider
            .chat_cancellable(basic_request("x/model"), "sk-test", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
