use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::ModelConfig;
use crate::errors::{PilotError, PilotResult};
use crate::llm::prompt;
use crate::llm::provider::ModelClient;
use crate::llm::sse_parser;
use crate::llm::types::{PredictionRequest, StreamChunkKind};

/// Chat-completions client for vLLM, SGLang, Ollama and hosted
/// OpenAI-compatible endpoints.
pub struct OpenAiCompatibleClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
    max_image_side: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(cfg: &ModelConfig) -> PilotResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.name.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            stream: cfg.stream,
            max_image_side: cfg.max_image_side,
            timeout: Duration::from_secs(cfg.request_timeout_secs),
            client,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> PilotResult<String> {
        let mut req = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| self.map_transport(e))?;
        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::PredictionUnreachable(format!(
                "{status}: {}",
                truncate(&err_body, 500)
            )));
        }

        if self.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }

    fn map_transport(&self, e: reqwest::Error) -> PilotError {
        if e.is_timeout() {
            PilotError::PredictionTimeout(self.timeout)
        } else {
            PilotError::PredictionUnreachable(format!("{}: {e}", self.endpoint))
        }
    }

    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result.map_err(|e| self.map_transport(e))?;
            if acc.feed(&bytes) {
                break;
            }
        }

        tracing::info!(
            content_len = acc.content.len(),
            reasoning_len = acc.reasoning.len(),
            "model stream complete"
        );
        Ok(acc.finish())
    }

    async fn handle_json(&self, response: reqwest::Response) -> PilotResult<String> {
        let json: serde_json::Value = response.json().await.map_err(|e| self.map_transport(e))?;
        let message = &json["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"]
            .as_str()
            .or_else(|| message["reasoning"].as_str())
            .unwrap_or("");

        tracing::info!(
            content_len = content.len(),
            reasoning_len = reasoning.len(),
            "model response received"
        );
        Ok(merge_reasoning(reasoning, content))
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn predict(&self, request: &PredictionRequest) -> PilotResult<String> {
        let messages = prompt::build_messages(request, self.max_image_side)?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": &messages,
            "stream": self.stream,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "max_tokens": self.max_tokens,
        });

        tracing::debug!(
            model = %self.model,
            step = request.step,
            history = request.history.len(),
            stream = self.stream,
            "sending prediction request"
        );
        tracing::trace!(body = %sanitized(&body), "request body (base64 omitted)");

        match tokio::time::timeout(self.timeout, self.send(&body)).await {
            Ok(result) => result,
            Err(_) => Err(PilotError::PredictionTimeout(self.timeout)),
        }
    }
}

/// Collects an SSE body. Lines are split on raw bytes and decoded only once
/// complete, so a character cut across network chunks stays intact. A separate
/// reasoning channel is folded back into `<thinking>` tags on `finish`.
#[derive(Default)]
struct StreamAccumulator {
    line_buf: Vec<u8>,
    content: String,
    reasoning: String,
}

impl StreamAccumulator {
    /// Returns true once the stream signalled `[DONE]`.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        self.line_buf.extend_from_slice(bytes);
        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);

            match sse_parser::parse_sse_line(line.trim()) {
                Ok(Some(chunk)) => match chunk.kind {
                    StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                    StreamChunkKind::Content => self.content.push_str(&chunk.content),
                    StreamChunkKind::Done => return true,
                },
                Ok(None) => {}
                Err(e) => tracing::debug!("SSE parse skipped: {e}"),
            }
        }
        false
    }

    fn finish(self) -> String {
        merge_reasoning(&self.reasoning, self.content)
    }
}

/// Prepends streamed reasoning unless the content already carries its own block.
fn merge_reasoning(reasoning: &str, content: String) -> String {
    let reasoning = reasoning.trim();
    if reasoning.is_empty() || content.contains("<thinking>") || content.contains("<think>") {
        return content;
    }
    format!("<thinking>\n{reasoning}\n</thinking>\n{content}")
}

/// Copy of the request body with image payloads replaced, for logging.
fn sanitized(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_reasoning() {
        assert_eq!(merge_reasoning("", "x".into()), "x");
        assert_eq!(
            merge_reasoning("look", "<tool_call>{}</tool_call>".into()),
            "<thinking>\nlook\n</thinking>\n<tool_call>{}</tool_call>"
        );
        assert_eq!(
            merge_reasoning("look", "<thinking>a</thinking>".into()),
            "<thinking>a</thinking>"
        );
    }

    #[test]
    fn test_stream_keeps_characters_split_across_chunks() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"输入问候\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"<tool_call>{\\\"action\\\":\\\"type\\\",\\\"text\\\":\\\"你好\\\"}</tool_call>\"}}]}\n\n",
            "data: [DONE]\n\n",
        )
        .as_bytes();
        let ni = "你".as_bytes();
        let cut = body
            .windows(ni.len())
            .position(|w| w == ni)
            .unwrap()
            + 1;

        let mut acc = StreamAccumulator::default();
        assert!(!acc.feed(&body[..cut]));
        assert!(acc.feed(&body[cut..]));
        let raw = acc.finish();

        assert!(raw.contains(r#""text":"你好""#), "{raw}");
        assert!(raw.starts_with("<thinking>\n输入问候\n</thinking>"));
        assert!(!raw.contains('\u{FFFD}'));
    }

    #[test]
    fn test_stream_line_split_mid_json() {
        let mut acc = StreamAccumulator::default();
        assert!(!acc.feed(b"data: {\"choices\":[{\"delta\":{\"con"));
        assert!(!acc.feed(b"tent\":\"ok\"}}]}\n"));
        assert_eq!(acc.content, "ok");
    }

    #[test]
    fn test_sanitized_drops_images() {
        let body = json!({
            "messages": [
                {"role": "system", "content": "hi"},
                {"role": "user", "content": [
                    {"type": "text", "text": "Step 1"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]}
            ]
        });
        let logged = sanitized(&body);
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(!logged.contains("AAAA"));
        assert!(logged.contains("Step 1"));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let mut cfg = ModelConfig::default();
        cfg.base_url = "http://127.0.0.1:8000/v1/".into();
        cfg.api_key = Some(String::new());
        let client = OpenAiCompatibleClient::new(&cfg).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:8000/v1/chat/completions");
        assert!(client.api_key.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_classified() {
        let mut cfg = ModelConfig::default();
        // Port 9 (discard) is closed on test machines; connect fails fast.
        cfg.base_url = "http://127.0.0.1:9/v1".into();
        cfg.request_timeout_secs = 5;
        let client = OpenAiCompatibleClient::new(&cfg).unwrap();
        let err = client.send(&json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            PilotError::PredictionUnreachable(_) | PilotError::PredictionTimeout(_)
        ));
    }
}
