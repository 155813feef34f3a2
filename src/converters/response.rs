//! Non-streaming Gemini `generateContent` answer → OpenAI chat completion.

use crate::converters::gemini::{GeminiEnvelope, GeminiPart};
use crate::converters::openai::{
    OpenAIChoice, OpenAIResponse, OpenAIResponseMessage, OpenAIToolCall, OpenAIToolCallFunction,
    OpenAIUsage,
};
use crate::signature_cache::SignatureCache;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn thinking_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<thinking[^>]*>(.*?)</thinking>").unwrap())
}

/// Mirrors the streaming semantics for the buffered path: thought parts and
/// embedded `<thinking>` blocks surface as reasoning, tool calls get minted
/// ids, and any observed signature is cached against them.
pub fn build_completion_response(
    body: &Value,
    model: &str,
    cache: &SignatureCache,
) -> OpenAIResponse {
    let envelope: GeminiEnvelope =
        serde_json::from_value(body.clone()).unwrap_or(GeminiEnvelope { response: None });

    let mut content = String::new();
    let mut thinking = String::new();
    let mut signature: Option<String> = None;
    let mut tool_calls: Vec<OpenAIToolCall> = Vec::new();
    let mut usage: Option<OpenAIUsage> = None;

    if let Some(response) = &envelope.response {
        if let Some(parts) = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| &content.parts)
        {
            for part in parts {
                match part {
                    GeminiPart::Text {
                        text,
                        thought,
                        thought_signature,
                    } => {
                        if let Some(sig) = thought_signature {
                            signature.get_or_insert_with(|| sig.clone());
                        }
                        if thought.unwrap_or(false) {
                            thinking.push_str(text);
                        } else {
                            content.push_str(text);
                        }
                    }
                    GeminiPart::FunctionCall {
                        function_call,
                        thought_signature,
                    } => {
                        if let Some(sig) = thought_signature {
                            signature.get_or_insert_with(|| sig.clone());
                        }
                        tool_calls.push(OpenAIToolCall {
                            id: format!("call_{}", Uuid::new_v4()),
                            r#type: "function".to_string(),
                            function: OpenAIToolCallFunction {
                                name: function_call.name.clone(),
                                arguments: function_call.args.to_string(),
                            },
                        });
                    }
                    _ => {}
                }
            }
        }

        usage = response.usage_metadata.as_ref().map(|u| {
            let prompt = u.prompt_token_count.unwrap_or(0);
            let completion = u.candidates_token_count.unwrap_or(0);
            OpenAIUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });
    }

    // Reasoning embedded in the prose moves over to the thinking field
    let re = thinking_block_regex();
    if re.is_match(&content) {
        for captures in re.captures_iter(&content) {
            thinking.push_str(&captures[1]);
        }
        content = re.replace_all(&content, "").into_owned();
    }

    if let Some(sig) = &signature {
        for call in &tool_calls {
            cache.store(&call.id, sig, &thinking);
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        "stop"
    } else {
        "tool_calls"
    };

    OpenAIResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        model: model.to_string(),
        choices: vec![OpenAIChoice {
            index: 0,
            message: OpenAIResponseMessage {
                role: "assistant".to_string(),
                content: if content.is_empty() {
                    None
                } else {
                    Some(content)
                },
                thinking: if thinking.is_empty() {
                    None
                } else {
                    Some(thinking)
                },
                signature,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
            },
            finish_reason: finish_reason.to_string(),
        }],
        usage,
        fallback_notice: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_response() {
        let cache = SignatureCache::in_memory();
        let body = json!({"response": {
            "candidates": [{"content": {"parts": [{"text": "Hello!"}]}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
        }});

        let resp = build_completion_response(&body, "gemini-2.5-pro", &cache);
        assert_eq!(resp.object, "chat.completion");
        assert_eq!(resp.model, "gemini-2.5-pro");
        assert_eq!(resp.choices[0].message.role, "assistant");
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hello!"));
        assert_eq!(resp.choices[0].finish_reason, "stop");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 6);
    }

    #[test]
    fn test_thought_and_tool_call_response() {
        let cache = SignatureCache::in_memory();
        let body = json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "checking the weather", "thought": true, "thoughtSignature": "sig-7"},
            {"functionCall": {"name": "get_weather", "args": {"city": "Oslo"}}}
        ]}}]}});

        let resp = build_completion_response(&body, "gemini-2.5-pro", &cache);
        let message = &resp.choices[0].message;
        assert_eq!(message.thinking.as_deref(), Some("checking the weather"));
        assert_eq!(message.signature.as_deref(), Some("sig-7"));
        assert_eq!(message.content, None);
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(resp.choices[0].finish_reason, "tool_calls");

        // Every minted id is bound to the signature
        let hit = cache.get(&calls[0].id).unwrap();
        assert_eq!(hit.signature, "sig-7");
        assert_eq!(hit.thought_text, "checking the weather");
    }

    #[test]
    fn test_embedded_thinking_block_extracted() {
        let cache = SignatureCache::in_memory();
        let body = json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "<thinking>secret</thinking>The answer is 4."}
        ]}}]}});

        let resp = build_completion_response(&body, "gemini-2.5-pro", &cache);
        let message = &resp.choices[0].message;
        assert_eq!(message.content.as_deref(), Some("The answer is 4."));
        assert_eq!(message.thinking.as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_body_degrades_to_empty_completion() {
        let cache = SignatureCache::in_memory();
        let resp = build_completion_response(&json!({}), "gemini-2.5-pro", &cache);
        assert_eq!(resp.choices[0].message.content, None);
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert!(resp.usage.is_none());
    }
}
