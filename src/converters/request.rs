//! OpenAI chat request → Code Assist Gemini request.
//!
//! Translation is total: malformed pieces of the caller request degrade to
//! the closest sensible shape instead of failing the call.

use crate::converters::gemini::{
    CodeAssistRequest, GeminiContent, GeminiFunctionCall, GeminiFunctionCallingConfig,
    GeminiFunctionDeclaration, GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData,
    GeminiPart, GeminiRequestBody, GeminiThinkingConfig, GeminiTool, GeminiToolConfig,
};
use crate::converters::openai::{OpenAIContent, OpenAIMessage, OpenAIRequest, OpenAIToolChoice};
use crate::converters::schema::sanitize_schema;
use crate::model_table;
use crate::signature_cache::SignatureCache;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    pub enable_google_search: bool,
}

fn thinking_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<thinking[^>]*>(.*?)</thinking>").unwrap())
}

pub fn translate_request(
    project: &str,
    request: &OpenAIRequest,
    cache: &SignatureCache,
    options: &TranslateOptions,
) -> CodeAssistRequest {
    let model = model_table::resolve_model(&request.model);
    let effort = request.effort();

    // System and developer messages never reach `contents`; their text merges
    // into the system instruction in original order.
    let mut system_text = String::new();
    for message in &request.messages {
        if message.role == "system" || message.role == "developer" {
            append_system_text(&mut system_text, message);
        }
    }
    let system_instruction = if system_text.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(system_text)],
        })
    };

    let mut contents: Vec<GeminiContent> = Vec::new();
    // Function names for tool turns, recovered from preceding assistant calls.
    let mut call_names: HashMap<String, String> = HashMap::new();
    // Consecutive tool messages coalesce into one upstream user turn.
    let mut pending_responses: Vec<GeminiPart> = Vec::new();

    for message in &request.messages {
        if message.role == "system" || message.role == "developer" {
            continue;
        }

        if message.role == "tool" {
            pending_responses.push(tool_response_part(message, &call_names));
            continue;
        }
        flush_tool_responses(&mut contents, &mut pending_responses);

        match message.role.as_str() {
            "assistant" => {
                if let Some(content) = assistant_content(message, cache, &mut call_names) {
                    contents.push(content);
                }
            }
            _ => {
                if let Some(content) = user_content(message) {
                    contents.push(content);
                }
            }
        }
    }
    flush_tool_responses(&mut contents, &mut pending_responses);

    let tools = map_tools(request, options);
    let tool_config = request.tool_choice.as_ref().and_then(map_tool_choice);

    let generation_config = GeminiGenerationConfig {
        temperature: request
            .temperature
            .unwrap_or(model_table::DEFAULT_TEMPERATURE),
        thinking_config: thinking_config(model, effort),
    };

    CodeAssistRequest {
        model: model.to_string(),
        project: project.to_string(),
        request: GeminiRequestBody {
            contents,
            system_instruction,
            tools,
            tool_config,
            generation_config,
        },
    }
}

fn append_system_text(buffer: &mut String, message: &OpenAIMessage) {
    match &message.content {
        Some(OpenAIContent::Text(text)) => buffer.push_str(text),
        Some(OpenAIContent::Parts(items)) => {
            for item in items {
                if let Some(text) = &item.text {
                    buffer.push_str(text);
                }
            }
        }
        _ => {}
    }
}

fn flush_tool_responses(contents: &mut Vec<GeminiContent>, pending: &mut Vec<GeminiPart>) {
    if pending.is_empty() {
        return;
    }
    contents.push(GeminiContent {
        role: Some("user".to_string()),
        parts: std::mem::take(pending),
    });
}

fn tool_response_part(message: &OpenAIMessage, call_names: &HashMap<String, String>) -> GeminiPart {
    let name = message
        .tool_call_id
        .as_ref()
        .and_then(|id| call_names.get(id))
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    let response = match &message.content {
        Some(OpenAIContent::Text(text)) => Value::String(text.clone()),
        Some(other) => Value::String(
            serde_json::to_string(other).unwrap_or_else(|_| String::new()),
        ),
        None => Value::String(String::new()),
    };

    GeminiPart::FunctionResponse {
        function_response: GeminiFunctionResponse { name, response },
    }
}

fn user_content(message: &OpenAIMessage) -> Option<GeminiContent> {
    let mut parts: Vec<GeminiPart> = Vec::new();

    match &message.content {
        Some(OpenAIContent::Text(text)) => parts.push(GeminiPart::text(text.clone())),
        Some(OpenAIContent::Parts(items)) => {
            for item in items {
                match item.r#type.as_str() {
                    "text" => {
                        let mut text = item.text.clone().unwrap_or_default();
                        if !text.ends_with('\n') {
                            text.push('\n');
                        }
                        parts.push(GeminiPart::text(text));
                    }
                    "image_url" => {
                        if let Some(image) = &item.image_url {
                            if let Some(part) = inline_image_part(&image.url) {
                                parts.push(part);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(OpenAIContent::Other(value)) => parts.push(GeminiPart::text(value.to_string())),
        None => {}
    }

    if parts.is_empty() {
        return None;
    }
    Some(GeminiContent {
        role: Some("user".to_string()),
        parts,
    })
}

/// Only embedded `data:image/...;base64,...` URLs become inline data; remote
/// image URLs are dropped.
fn inline_image_part(url: &str) -> Option<GeminiPart> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^data:(image/.+);base64,(.+)$").unwrap());
    let captures = re.captures(url)?;
    Some(GeminiPart::InlineData {
        inline_data: GeminiInlineData {
            mime_type: captures[1].to_string(),
            data: captures[2].to_string(),
        },
    })
}

fn assistant_content(
    message: &OpenAIMessage,
    cache: &SignatureCache,
    call_names: &mut HashMap<String, String>,
) -> Option<GeminiContent> {
    let mut signature = message.reasoning_signature().map(|s| s.to_string());
    let mut thought_text = message.reasoning_text().map(|s| s.to_string());

    // The cache is consulted only when the message itself carried no
    // reasoning fields; the first hit among the turn's tool calls decides.
    if signature.is_none() && thought_text.is_none() {
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                if let Some(hit) = cache.get(&call.id) {
                    signature = Some(hit.signature);
                    thought_text = Some(hit.thought_text);
                    break;
                }
            }
        }
    }

    let mut visible = message
        .content
        .as_ref()
        .map(OpenAIContent::text)
        .unwrap_or_default();

    // Clients may replay reasoning inline; the block never goes upstream as
    // visible prose.
    let re = thinking_block_regex();
    if let Some(captures) = re.captures(&visible) {
        if thought_text.as_deref().map(str::is_empty).unwrap_or(true) {
            thought_text = Some(captures[1].to_string());
        }
        visible = re.replace_all(&visible, "").into_owned();
    }

    let mut parts: Vec<GeminiPart> = Vec::new();
    if let Some(text) = thought_text.filter(|t| !t.is_empty()) {
        parts.push(GeminiPart::thought(text, signature.clone()));
    }
    if !visible.is_empty() {
        parts.push(GeminiPart::text(visible));
    }

    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            call_names.insert(call.id.clone(), call.function.name.clone());
            let args: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
            parts.push(GeminiPart::FunctionCall {
                function_call: GeminiFunctionCall {
                    name: call.function.name.clone(),
                    args,
                },
                thought_signature: signature.clone(),
            });
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(GeminiContent {
        role: Some("model".to_string()),
        parts,
    })
}

fn map_tools(request: &OpenAIRequest, options: &TranslateOptions) -> Option<Vec<GeminiTool>> {
    match &request.tools {
        Some(tools) if !tools.is_empty() => {
            let declarations = tools
                .iter()
                .map(|tool| {
                    let mut parameters = tool.function.parameters.clone().unwrap_or(json!({}));
                    sanitize_schema(&mut parameters);
                    GeminiFunctionDeclaration {
                        name: tool.function.name.clone(),
                        description: tool.function.description.clone(),
                        parameters: Some(parameters),
                    }
                })
                .collect();
            Some(vec![GeminiTool::functions(declarations)])
        }
        _ if options.enable_google_search => Some(vec![GeminiTool::google_search()]),
        _ => None,
    }
}

fn map_tool_choice(choice: &OpenAIToolChoice) -> Option<GeminiToolConfig> {
    let config = match choice {
        OpenAIToolChoice::Mode(mode) => match mode.as_str() {
            "none" => GeminiFunctionCallingConfig {
                mode: "NONE".to_string(),
                allowed_function_names: None,
            },
            "auto" => GeminiFunctionCallingConfig {
                mode: "AUTO".to_string(),
                allowed_function_names: None,
            },
            _ => return None,
        },
        OpenAIToolChoice::Named { function, .. } => GeminiFunctionCallingConfig {
            mode: "ANY".to_string(),
            allowed_function_names: Some(vec![function.name.clone()]),
        },
    };
    Some(GeminiToolConfig {
        function_calling_config: config,
    })
}

fn thinking_config(model: &str, effort: Option<&str>) -> Option<GeminiThinkingConfig> {
    let from_effort = effort
        .and_then(model_table::budget_for_effort)
        .map(GeminiThinkingConfig::with_budget);

    if model_table::is_thinking_model(model) {
        // Thinking models always get a config; the default budget covers an
        // absent or unrecognized effort hint.
        return Some(from_effort.unwrap_or_else(|| {
            GeminiThinkingConfig::with_budget(model_table::DEFAULT_THINKING_BUDGET)
        }));
    }
    from_effort
}
