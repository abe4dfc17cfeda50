//! `HttpEmbedder` — an OpenAI-compatible `/embeddings` client.
//!
//! Grounded on `relay_providers::openrouter`'s adapter shape (a pooled
//! `reqwest::Client`, a plain JSON body, bearer auth, status-driven error
//! classification) applied to the embeddings endpoint instead of chat
//! completions — the two HTTP surfaces share the same OpenAI-compatible
//! wire convention.

use std::time::Duration;

use serde_json::{json, Value};

use relay_domain::error::{Error, Result};

use crate::provider::Embedder;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction");
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let text_body = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "embeddings".into(),
                message: format!("HTTP {status}: {text_body}"),
            });
        }

        let value: Value = serde_json::from_str(&text_body).map_err(Error::from)?;
        let vector = value
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("embedding"))
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Other("missing data[0].embedding".into()))?;

        vector
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| Error::Other("non-numeric embedding component".into())))
            .collect()
    }
}
