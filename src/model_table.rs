//! Upstream model identifiers and the static policy tables around them.

pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Thinking budget applied when a thinking model gets no usable effort hint.
pub const DEFAULT_THINKING_BUDGET: i32 = 8192;

/// Primary model; also the target for unrecognized caller model names.
pub const PRIMARY_THINKING_MODEL: &str = "gemini-2.5-pro";

/// Upstream models the proxy will route to.
pub const KNOWN_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.0-flash-001",
];

/// Models for which `thinkingConfig` is mandatory.
const THINKING_MODELS: &[&str] = &["gemini-2.5-pro", "gemini-2.5-flash"];

/// Maps a caller-supplied model name onto a canonical upstream id.
pub fn resolve_model(requested: &str) -> &'static str {
    KNOWN_MODELS
        .iter()
        .copied()
        .find(|m| *m == requested)
        .unwrap_or(PRIMARY_THINKING_MODEL)
}

pub fn is_thinking_model(model: &str) -> bool {
    THINKING_MODELS.contains(&model)
}

/// Thinking budget for a recognized reasoning effort; None for anything else.
pub fn budget_for_effort(effort: &str) -> Option<i32> {
    match effort {
        "low" => Some(1024),
        "medium" => Some(8192),
        "high" => Some(24576),
        _ => None,
    }
}

/// One-hop fallback chain used when a model is rate-limited upstream.
/// A model at the bottom of its chain has no entry.
pub fn fallback_for(model: &str) -> Option<&'static str> {
    match model {
        "gemini-2.5-pro" => Some("gemini-2.5-flash"),
        _ => None,
    }
}
