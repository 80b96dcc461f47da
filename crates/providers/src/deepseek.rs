use anyhow::{anyhow, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::chat_api::{ChatMessage, StreamChunk};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// No global timeout: a streaming completion may legitimately run for
/// minutes, and the vendor endpoint gives no upper bound. The balance query
/// sets its own per-request timeout instead.
static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

const BALANCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Display name → API model id.
pub const MODELS: [(&str, &str); 2] = [
    ("DeepThink-V3", "deepseek-chat"),
    ("DeepThink-R1", "deepseek-reasoner"),
];

/// Resolve a display name from the model catalog; unknown names fall back to
/// the chat model.
pub fn model_id(display_name: &str) -> &'static str {
    MODELS
        .iter()
        .find(|(name, _)| *name == display_name)
        .map(|(_, id)| *id)
        .unwrap_or(MODELS[0].1)
}

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    /// Secondary deliberation channel exposed by the reasoner model.
    #[serde(default)]
    reasoning_content: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct DeepSeekClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl DeepSeekClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Stream a chat completion, sending each delta over `tx` as it arrives.
    /// Reasoning tokens and answer tokens are routed to separate variants;
    /// `StreamChunk::Done` is always sent last on success.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = CompletionRequest {
            model,
            messages,
            temperature,
            stream: true,
        };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("completion error: {}", status));
            }
            return Err(anyhow!("completion error: {}\n{}", status, detail));
        }

        let mut parser = crate::sse::SseParser::new();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| anyhow!("stream read error: {}", e))?;
            for event in parser.feed(&bytes) {
                if event.data == "[DONE]" {
                    let _ = tx.send(StreamChunk::Done);
                    return Ok(());
                }
                let parsed: StreamResponse = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    // Keep-alives and vendor extras are not deltas; skip them.
                    Err(_) => continue,
                };
                let Some(choice) = parsed.choices.first() else {
                    continue;
                };
                if let Some(token) = &choice.delta.reasoning_content {
                    if !token.is_empty() {
                        let _ = tx.send(StreamChunk::Reasoning(token.clone()));
                    }
                }
                if let Some(token) = &choice.delta.content {
                    if !token.is_empty() {
                        let _ = tx.send(StreamChunk::Text(token.clone()));
                    }
                }
                if choice.finish_reason.is_some() {
                    let _ = tx.send(StreamChunk::Done);
                    return Ok(());
                }
            }
        }

        let _ = tx.send(StreamChunk::Done);
        Ok(())
    }

    /// Query the account credit balance. Bounded by a 10s timeout so a dead
    /// endpoint cannot wedge the poll loop.
    pub async fn balance(&self) -> Result<f64> {
        let url = format!("{}/user/balance", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(BALANCE_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(anyhow!("balance error: {}", resp.status()));
        }

        let body = resp.text().await?;
        parse_balance(&body)
    }

    /// Balance for display: failures are logged and reported as 0.0, never
    /// propagated into the session.
    pub async fn balance_or_zero(&self) -> f64 {
        match self.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::error!("balance query failed: {e}");
                0.0
            }
        }
    }
}

/// Extract the `balance` field from the endpoint's JSON body. The field has
/// been observed both as a number and as a decimal string.
fn parse_balance(body: &str) -> Result<f64> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let balance = value
        .get("balance")
        .ok_or_else(|| anyhow!("balance body missing `balance` field"))?;

    match balance {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow!("`balance` is not a finite number")),
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| anyhow!("`balance` string did not parse: {e}")),
        other => Err(anyhow!("`balance` has unexpected type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_catalog() {
        assert_eq!(model_id("DeepThink-V3"), "deepseek-chat");
        assert_eq!(model_id("DeepThink-R1"), "deepseek-reasoner");
        assert_eq!(model_id("nonsense"), "deepseek-chat");
    }

    #[test]
    fn test_parse_balance_number() {
        assert_eq!(parse_balance(r#"{"balance": 12.5}"#).unwrap(), 12.5);
    }

    #[test]
    fn test_parse_balance_string() {
        assert_eq!(parse_balance(r#"{"balance": "3.07"}"#).unwrap(), 3.07);
    }

    #[test]
    fn test_parse_balance_missing_field() {
        assert!(parse_balance(r#"{"currency": "USD"}"#).is_err());
    }

    #[test]
    fn test_parse_balance_malformed_body() {
        assert!(parse_balance("<html>500</html>").is_err());
    }

    #[test]
    fn test_stream_delta_shapes() {
        let with_reasoning: StreamResponse = serde_json::from_str(
            r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            with_reasoning.choices[0].delta.reasoning_content.as_deref(),
            Some("hmm")
        );
        assert!(with_reasoning.choices[0].delta.content.is_none());

        let with_finish: StreamResponse = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"hi"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(
            with_finish.choices[0].finish_reason.as_deref(),
            Some("stop")
        );
    }
}
