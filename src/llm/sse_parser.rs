use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses one line of an OpenAI-compatible SSE stream.
/// Keep-alives, comments and lines without a usable delta yield `Ok(None)`.
pub fn parse_sse_line(line: &str) -> Result<Option<StreamChunk>, serde_json::Error> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value = serde_json::from_str(data)?;
    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // vLLM and DeepSeek-style servers put the thinking trace in its own field.
    for key in ["reasoning_content", "reasoning"] {
        if let Some(reasoning) = delta[key].as_str() {
            if !reasoning.is_empty() {
                return Ok(Some(StreamChunk {
                    kind: StreamChunkKind::Reasoning,
                    content: reasoning.to_string(),
                }));
            }
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Content,
                content: content.to_string(),
            }));
        }
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_reasoning_and_done() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"<tool"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "<tool");

        let chunk =
            parse_sse_line(r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#)
                .unwrap()
                .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Reasoning);

        let done = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert_eq!(done.kind, StreamChunkKind::Done);
    }

    #[test]
    fn test_ignores_keepalives_and_empty_deltas() {
        assert!(parse_sse_line(": ping").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#)
            .unwrap()
            .is_none());
        assert!(parse_sse_line("data: {not json").is_err());
    }
}
