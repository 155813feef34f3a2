pub mod gemini_content;
pub mod gemini_envelope;
pub mod gemini_function_call;
pub mod gemini_function_declaration;
pub mod gemini_function_response;
pub mod gemini_generation_config;
pub mod gemini_inline_data;
pub mod gemini_part;
pub mod gemini_request;
pub mod gemini_tool;
pub mod gemini_tool_config;
pub mod gemini_usage;

pub use gemini_content::GeminiContent;
pub use gemini_envelope::{GeminiCandidate, GeminiEnvelope, GeminiStreamResponse};
pub use gemini_function_call::GeminiFunctionCall;
pub use gemini_function_declaration::GeminiFunctionDeclaration;
pub use gemini_function_response::GeminiFunctionResponse;
pub use gemini_generation_config::{GeminiGenerationConfig, GeminiThinkingConfig};
pub use gemini_inline_data::GeminiInlineData;
pub use gemini_part::GeminiPart;
pub use gemini_request::{CodeAssistRequest, GeminiRequestBody};
pub use gemini_tool::{GeminiGoogleSearch, GeminiTool};
pub use gemini_tool_config::{GeminiFunctionCallingConfig, GeminiToolConfig};
pub use gemini_usage::GeminiUsage;
