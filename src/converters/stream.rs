//! Upstream Gemini envelopes → OpenAI chat-completion chunks.
//!
//! One transformer instance per stream. It frames the first chunk with the
//! assistant role, splits `<thinking>` blocks out of visible prose even when
//! a tag straddles envelope boundaries, mints tool-call ids, records thought
//! signatures in the continuity cache and closes the stream with exactly one
//! terminal chunk.

use crate::converters::gemini::{GeminiEnvelope, GeminiPart};
use crate::converters::openai::{
    OpenAIStreamChoice, OpenAIStreamChunk, OpenAIStreamDelta, OpenAIStreamToolCall,
    OpenAIStreamToolCallFunction, OpenAIUsage,
};
use crate::signature_cache::SignatureCache;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

const OPEN_TAG: &str = "<thinking>";
const CLOSE_TAG: &str = "</thinking>";

pub struct StreamTransformer {
    id: String,
    created: u64,
    model: String,
    cache: Arc<SignatureCache>,
    first_chunk: bool,
    emitted_tool_call: bool,
    usage: Option<OpenAIUsage>,
    current_signature: Option<String>,
    accumulated_thought: String,
    inside_thinking: bool,
    tag_buffer: String,
}

enum VisibleEvent {
    Content(String),
    Thinking(String),
}

impl StreamTransformer {
    pub fn new(model: &str, cache: Arc<SignatureCache>) -> Self {
        StreamTransformer {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            model: model.to_string(),
            cache,
            first_chunk: true,
            emitted_tool_call: false,
            usage: None,
            current_signature: None,
            accumulated_thought: String::new(),
            inside_thinking: false,
            tag_buffer: String::new(),
        }
    }

    /// Deserializes and processes one raw SSE payload; unparsable envelopes
    /// are dropped, not fatal.
    pub fn process_value(&mut self, value: Value) -> Vec<OpenAIStreamChunk> {
        match serde_json::from_value::<GeminiEnvelope>(value) {
            Ok(envelope) => self.process(&envelope),
            Err(e) => {
                warn!("skipping malformed upstream envelope: {}", e);
                Vec::new()
            }
        }
    }

    pub fn process(&mut self, envelope: &GeminiEnvelope) -> Vec<OpenAIStreamChunk> {
        let mut chunks = Vec::new();
        let Some(response) = &envelope.response else {
            return chunks;
        };

        if let Some(content) = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
        {
            for part in &content.parts {
                match part {
                    GeminiPart::Text {
                        text,
                        thought,
                        thought_signature,
                    } => {
                        if thought.unwrap_or(false) {
                            if let Some(signature) = thought_signature {
                                self.current_signature = Some(signature.clone());
                            }
                            self.accumulated_thought.push_str(text);
                            chunks.push(self.thinking_chunk(text.clone()));
                        } else {
                            if let Some(signature) = thought_signature {
                                self.current_signature = Some(signature.clone());
                            }
                            for event in self.split_visible(text) {
                                match event {
                                    VisibleEvent::Content(text) => {
                                        chunks.push(self.content_chunk(text));
                                    }
                                    VisibleEvent::Thinking(text) => {
                                        self.accumulated_thought.push_str(&text);
                                        chunks.push(self.thinking_chunk(text));
                                    }
                                }
                            }
                        }
                    }
                    GeminiPart::FunctionCall {
                        function_call,
                        thought_signature,
                    } => {
                        if self.current_signature.is_none() {
                            self.current_signature = thought_signature.clone();
                        }
                        chunks.push(
                            self.tool_call_chunk(&function_call.name, &function_call.args),
                        );
                    }
                    GeminiPart::InlineData { .. }
                    | GeminiPart::FunctionResponse { .. }
                    | GeminiPart::Other(_) => {}
                }
            }
        }

        if let Some(usage) = &response.usage_metadata {
            let prompt = usage.prompt_token_count.unwrap_or(0);
            let completion = usage.candidates_token_count.unwrap_or(0);
            self.usage = Some(OpenAIUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            });
        }

        chunks
    }

    /// Exactly one terminal chunk per stream: empty delta, final finish
    /// reason, usage when the upstream reported it.
    pub fn finish(&mut self) -> OpenAIStreamChunk {
        let finish_reason = if self.emitted_tool_call {
            "tool_calls"
        } else {
            "stop"
        };
        let delta = self.frame(OpenAIStreamDelta::default());
        OpenAIStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![OpenAIStreamChoice {
                index: 0,
                delta,
                finish_reason: Some(finish_reason.to_string()),
            }],
            usage: self.usage.take(),
        }
    }

    /// Visible-content chunk injected ahead of the stream, e.g. the model
    /// fallback notification.
    pub fn notice_chunk(&mut self, text: &str) -> OpenAIStreamChunk {
        self.content_chunk(text.to_string())
    }

    fn content_chunk(&mut self, text: String) -> OpenAIStreamChunk {
        self.chunk(OpenAIStreamDelta {
            content: Some(Some(text)),
            ..Default::default()
        })
    }

    fn thinking_chunk(&mut self, text: String) -> OpenAIStreamChunk {
        self.chunk(OpenAIStreamDelta {
            thinking: Some(text),
            signature: self.current_signature.clone(),
            ..Default::default()
        })
    }

    fn tool_call_chunk(&mut self, name: &str, args: &Value) -> OpenAIStreamChunk {
        let tool_call_id = format!("call_{}", Uuid::new_v4());
        if let Some(signature) = &self.current_signature {
            self.cache
                .store(&tool_call_id, signature, &self.accumulated_thought);
        }
        self.emitted_tool_call = true;

        self.chunk(OpenAIStreamDelta {
            tool_calls: Some(vec![OpenAIStreamToolCall {
                index: 0,
                id: Some(tool_call_id),
                r#type: Some("function".to_string()),
                function: Some(OpenAIStreamToolCallFunction {
                    name: Some(name.to_string()),
                    arguments: Some(args.to_string()),
                }),
            }]),
            ..Default::default()
        })
    }

    fn chunk(&mut self, delta: OpenAIStreamDelta) -> OpenAIStreamChunk {
        let delta = self.frame(delta);
        OpenAIStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![OpenAIStreamChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// First emitted chunk, and only the first, carries the assistant role;
    /// when that chunk is a tool call its content is an explicit null.
    fn frame(&mut self, mut delta: OpenAIStreamDelta) -> OpenAIStreamDelta {
        if self.first_chunk {
            self.first_chunk = false;
            delta.role = Some("assistant".to_string());
            if delta.tool_calls.is_some() && delta.content.is_none() {
                delta.content = Some(None);
            }
        }
        delta
    }

    /// Two-state scanner over visible prose. Text up to an opening tag is
    /// content; text inside the tags is reasoning. A partial tag at the end
    /// of a chunk is buffered and re-examined with the next chunk.
    fn split_visible(&mut self, text: &str) -> Vec<VisibleEvent> {
        let mut input = std::mem::take(&mut self.tag_buffer);
        input.push_str(text);
        let mut events = Vec::new();

        loop {
            let tag = if self.inside_thinking {
                CLOSE_TAG
            } else {
                OPEN_TAG
            };
            match input.find(tag) {
                Some(pos) => {
                    if pos > 0 {
                        events.push(self.visible_event(input[..pos].to_string()));
                    }
                    input = input[pos + tag.len()..].to_string();
                    self.inside_thinking = !self.inside_thinking;
                }
                None => {
                    let keep = trailing_tag_prefix(&input, tag);
                    let emit_len = input.len() - keep;
                    if keep > 0 {
                        self.tag_buffer = input[emit_len..].to_string();
                    }
                    if emit_len > 0 {
                        events.push(self.visible_event(input[..emit_len].to_string()));
                    }
                    break;
                }
            }
        }
        events
    }

    fn visible_event(&self, text: String) -> VisibleEvent {
        if self.inside_thinking {
            VisibleEvent::Thinking(text)
        } else {
            VisibleEvent::Content(text)
        }
    }
}

/// Length of the longest proper tag prefix the text ends with.
fn trailing_tag_prefix(text: &str, tag: &str) -> usize {
    let max = (tag.len() - 1).min(text.len());
    for k in (1..=max).rev() {
        if text.ends_with(&tag[..k]) {
            return k;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transformer() -> StreamTransformer {
        StreamTransformer::new("gemini-2.5-pro", SignatureCache::in_memory())
    }

    fn text_envelope(text: &str) -> Value {
        json!({"response": {"candidates": [{"content": {"parts": [{"text": text}]}}]}})
    }

    fn delta(chunk: &OpenAIStreamChunk) -> Value {
        serde_json::to_value(&chunk.choices[0].delta).unwrap()
    }

    #[test]
    fn test_plain_text_stream() {
        let mut t = transformer();

        let chunks = t.process_value(text_envelope("Hello"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            delta(&chunks[0]),
            json!({"role": "assistant", "content": "Hello"})
        );

        let chunks = t.process_value(text_envelope(" world"));
        assert_eq!(delta(&chunks[0]), json!({"content": " world"}));

        let last = t.finish();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(delta(&last), json!({}));
    }

    #[test]
    fn test_thought_parts_become_thinking_deltas() {
        let mut t = transformer();
        let chunks = t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "pondering", "thought": true, "thoughtSignature": "sig-1"},
            {"text": "the answer"}
        ]}}]}}));

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            delta(&chunks[0]),
            json!({"role": "assistant", "thinking": "pondering", "signature": "sig-1"})
        );
        assert_eq!(delta(&chunks[1]), json!({"content": "the answer"}));
    }

    #[test]
    fn test_snake_case_thought_signature_accepted() {
        let mut t = transformer();
        let chunks = t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "hm", "thought": true, "thought_signature": "sig-snake"}
        ]}}]}}));
        assert_eq!(delta(&chunks[0])["signature"], "sig-snake");
    }

    #[test]
    fn test_tool_call_stream() {
        let cache = SignatureCache::in_memory();
        let mut t = StreamTransformer::new("gemini-2.5-pro", cache.clone());

        let chunks = t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "get_weather", "args": {"city": "Berlin"}}}
        ]}}]}}));

        assert_eq!(chunks.len(), 1);
        let d = delta(&chunks[0]);
        assert_eq!(d["role"], "assistant");
        // Tool-call first chunk carries an explicit content null
        assert_eq!(d.get("content"), Some(&Value::Null));
        assert_eq!(d["tool_calls"][0]["index"], 0);
        assert_eq!(d["tool_calls"][0]["type"], "function");
        assert_eq!(d["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(
            d["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Berlin\"}"
        );
        assert!(d["tool_calls"][0]["id"]
            .as_str()
            .unwrap()
            .starts_with("call_"));

        let last = t.finish();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        // No signature was seen, so nothing was cached
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_signature_binds_to_minted_tool_calls() {
        let cache = SignatureCache::in_memory();
        let mut t = StreamTransformer::new("gemini-2.5-pro", cache.clone());

        t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "let me check", "thought": true, "thoughtSignature": "sig-S"}
        ]}}]}}));
        let chunks = t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "f", "args": {}}},
            {"functionCall": {"name": "g", "args": {}}}
        ]}}]}}));

        for chunk in &chunks {
            let d = delta(chunk);
            let id = d["tool_calls"][0]["id"].as_str().unwrap();
            let hit = cache.get(id).expect("tool call id must be cached");
            assert_eq!(hit.signature, "sig-S");
            assert_eq!(hit.thought_text, "let me check");
        }
    }

    #[test]
    fn test_function_call_signature_does_not_overwrite() {
        let mut t = transformer();
        t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "x", "thought": true, "thoughtSignature": "sig-first"}
        ]}}]}}));
        t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "f", "args": {}}, "thoughtSignature": "sig-other"}
        ]}}]}}));
        assert_eq!(t.current_signature.as_deref(), Some("sig-first"));
    }

    #[test]
    fn test_thinking_tag_split_across_envelopes() {
        let mut t = transformer();
        let mut deltas = Vec::new();

        for text in ["pre<thi", "nking>secret</thin", "king>post"] {
            for chunk in t.process_value(text_envelope(text)) {
                deltas.push(delta(&chunk));
            }
        }
        let last = t.finish();

        assert_eq!(
            deltas,
            vec![
                json!({"role": "assistant", "content": "pre"}),
                json!({"thinking": "secret"}),
                json!({"content": "post"}),
            ]
        );
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_thinking_interior_never_leaks_into_content() {
        let original = "x<thinking>hidden reasoning</thinking>z tail";
        // Every two-way fragmentation must excise the same interior
        for split in 0..=original.len() {
            if !original.is_char_boundary(split) {
                continue;
            }
            let mut t = transformer();
            let mut content = String::new();
            let mut thinking = String::new();
            for piece in [&original[..split], &original[split..]] {
                for chunk in t.process_value(text_envelope(piece)) {
                    let d = delta(&chunk);
                    if let Some(c) = d.get("content").and_then(Value::as_str) {
                        content.push_str(c);
                    }
                    if let Some(th) = d.get("thinking").and_then(Value::as_str) {
                        thinking.push_str(th);
                    }
                }
            }
            t.finish();
            assert_eq!(content, "xz tail", "split at {}", split);
            assert_eq!(thinking, "hidden reasoning", "split at {}", split);
        }
    }

    #[test]
    fn test_false_tag_prefix_is_flushed() {
        let mut t = transformer();
        let mut chunks = t.process_value(text_envelope("a <thi"));
        chunks.extend(t.process_value(text_envelope("ng that is not a tag")));
        t.finish();

        let content: String = chunks
            .iter()
            .filter_map(|c| {
                delta(c)
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect();
        assert_eq!(content, "a <thing that is not a tag");
    }

    #[test]
    fn test_embedded_thinking_gets_current_signature() {
        let mut t = transformer();
        t.process_value(json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "warmup", "thought": true, "thoughtSignature": "sig-9"}
        ]}}]}}));
        let chunks = t.process_value(text_envelope("<thinking>inline</thinking>"));

        assert_eq!(
            delta(&chunks[0]),
            json!({"thinking": "inline", "signature": "sig-9"})
        );
        // Inline reasoning joins the accumulated thought text
        assert_eq!(t.accumulated_thought, "warmupinline");
    }

    #[test]
    fn test_usage_attaches_to_terminal_chunk() {
        let mut t = transformer();
        t.process_value(json!({"response": {
            "candidates": [{"content": {"parts": [{"text": "hi"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        }}));

        let last = t.finish();
        let usage = last.usage.expect("usage on terminal chunk");
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_empty_stream_terminal_is_framed() {
        let mut t = transformer();
        let last = t.finish();
        assert_eq!(last.choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_malformed_envelope_is_skipped() {
        let mut t = transformer();
        assert!(t.process_value(json!({"response": {"candidates": 42}})).is_empty());
        assert!(t.process_value(json!("just a string")).is_empty());
    }

    #[test]
    fn test_notice_chunk_consumes_role_framing() {
        let mut t = transformer();
        let notice = t.notice_chunk("switched model\n\n");
        assert_eq!(
            delta(&notice),
            json!({"role": "assistant", "content": "switched model\n\n"})
        );
        let next = t.process_value(text_envelope("hi"));
        assert_eq!(delta(&next[0]), json!({"content": "hi"}));
    }

    #[test]
    fn test_stream_ids_are_stable_within_stream() {
        let mut t = transformer();
        let a = t.process_value(text_envelope("x"));
        let b = t.finish();
        assert_eq!(a[0].id, b.id);
        assert!(a[0].id.starts_with("chatcmpl-"));
        assert_eq!(a[0].object, "chat.completion.chunk");
    }
}
