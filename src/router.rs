use crate::converters::gemini::CodeAssistRequest;
use crate::converters::openai::{OpenAIRequest, OpenAIStreamChunk};
use crate::converters::request::{translate_request, TranslateOptions};
use crate::converters::response::build_completion_response;
use crate::converters::sse::SseParser;
use crate::converters::stream::StreamTransformer;
use crate::error::ProxyError;
use crate::fallback;
use crate::model_table;
use crate::models::{ErrorResponse, ModelInfo, ModelsResponse};
use crate::signature_cache::SignatureCache;
use crate::upstream::CodeAssistClient;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<CodeAssistClient>,
    pub cache: Arc<SignatureCache>,
    pub enable_google_search: bool,
    pub enable_model_fallback: bool,
}

#[axum_macros::debug_handler]
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<OpenAIRequest>,
) -> axum::response::Response {
    let project = match state.client.project_id().await {
        Ok(project) => project,
        Err(e) => return error_response(e),
    };

    let options = TranslateOptions {
        enable_google_search: state.enable_google_search,
    };
    let translated = translate_request(&project, &request, &state.cache, &options);
    debug!(
        "translated request for model {}: {}",
        translated.model,
        serde_json::to_string(&translated).unwrap_or_default()
    );

    if request.is_stream() {
        stream_chat(state, translated).await
    } else {
        unary_chat(state, translated).await
    }
}

async fn unary_chat(
    state: AppState,
    mut translated: CodeAssistRequest,
) -> axum::response::Response {
    let body = serde_json::to_value(&translated).expect("request body must serialize");
    let requested_model = translated.model.clone();

    match state.client.generate_content(&body).await {
        Ok(answer) => {
            Json(build_completion_response(&answer, &requested_model, &state.cache)).into_response()
        }
        Err(error) => {
            let Some(fallback_model) = eligible_fallback(&state, &error, &requested_model) else {
                return error_response(error);
            };
            info!(
                "retrying rate-limited request with fallback model {}",
                fallback_model
            );
            translated.model = fallback_model.to_string();
            let body = serde_json::to_value(&translated).expect("request body must serialize");
            match state.client.generate_content(&body).await {
                Ok(answer) => {
                    let mut response =
                        build_completion_response(&answer, fallback_model, &state.cache);
                    response.fallback_notice =
                        Some(fallback::fallback_notice(&requested_model, fallback_model));
                    Json(response).into_response()
                }
                Err(error) => error_response(error),
            }
        }
    }
}

async fn stream_chat(
    state: AppState,
    mut translated: CodeAssistRequest,
) -> axum::response::Response {
    let requested_model = translated.model.clone();
    let body = serde_json::to_value(&translated).expect("request body must serialize");

    // The fallback decision happens at stream-open time; rate-limit failures
    // surface before any data frame is produced.
    let (upstream, model_in_use, notice) = match state.client.stream_generate_content(&body).await
    {
        Ok(stream) => (stream, requested_model, None),
        Err(error) => {
            let Some(fallback_model) = eligible_fallback(&state, &error, &requested_model) else {
                return error_response(error);
            };
            info!(
                "retrying rate-limited stream with fallback model {}",
                fallback_model
            );
            translated.model = fallback_model.to_string();
            let body = serde_json::to_value(&translated).expect("request body must serialize");
            match state.client.stream_generate_content(&body).await {
                Ok(stream) => (
                    stream,
                    fallback_model.to_string(),
                    Some(fallback::fallback_notice(&requested_model, fallback_model)),
                ),
                Err(error) => return error_response(error),
            }
        }
    };

    let mut transformer = StreamTransformer::new(&model_in_use, state.cache.clone());

    let event_stream = async_stream::stream! {
        if let Some(notice) = notice {
            yield Ok::<Event, Infallible>(chunk_event(&transformer.notice_chunk(&notice)));
        }

        let mut parser = SseParser::new();
        futures::pin_mut!(upstream);
        while let Some(frame) = upstream.next().await {
            match frame {
                Ok(bytes) => {
                    for envelope in parser.feed(&bytes) {
                        for chunk in transformer.process_value(envelope) {
                            yield Ok(chunk_event(&chunk));
                        }
                    }
                }
                Err(e) => {
                    // Truncated upstream; report and end without a terminal chunk
                    warn!("upstream streaming error: {}", e);
                    yield Ok(error_event(&e));
                    return;
                }
            }
        }
        if let Some(envelope) = parser.finish() {
            for chunk in transformer.process_value(envelope) {
                yield Ok(chunk_event(&chunk));
            }
        }

        yield Ok(chunk_event(&transformer.finish()));
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(event_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
        .into_response()
}

fn eligible_fallback(
    state: &AppState,
    error: &ProxyError,
    model: &str,
) -> Option<&'static str> {
    if !state.enable_model_fallback {
        return None;
    }
    fallback::fallback_model(error, model)
}

fn chunk_event(chunk: &OpenAIStreamChunk) -> Event {
    Event::default().data(serde_json::to_string(chunk).unwrap_or_default())
}

fn error_event(error: &reqwest::Error) -> Event {
    let payload = serde_json::to_string(&ErrorResponse::new(
        format!("upstream streaming error: {}", error),
        "api_error",
        "upstream_error",
    ))
    .unwrap_or_default();
    Event::default().event("error").data(payload)
}

fn error_response(error: ProxyError) -> axum::response::Response {
    warn!("request failed: {}", error);
    let (status, response) = match &error {
        ProxyError::Upstream { status, body } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            ErrorResponse::new(
                format!("upstream error: {}", body),
                "api_error",
                "upstream_error",
            ),
        ),
        ProxyError::Transport(e) => (
            StatusCode::BAD_GATEWAY,
            ErrorResponse::new(
                format!("cannot reach upstream: {}", e),
                "api_error",
                "transport_error",
            ),
        ),
        ProxyError::Auth(message) => (
            StatusCode::UNAUTHORIZED,
            ErrorResponse::new(message.clone(), "authentication_error", "invalid_token"),
        ),
        ProxyError::OnboardingTimeout => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(
                "project onboarding did not complete in time",
                "api_error",
                "onboarding_timeout",
            ),
        ),
    };
    (status, Json(response)).into_response()
}

#[axum_macros::debug_handler]
pub async fn list_models() -> impl IntoResponse {
    let data = model_table::KNOWN_MODELS
        .iter()
        .map(|id| ModelInfo {
            id: id.to_string(),
            object: "model".to_string(),
            owned_by: "google".to_string(),
        })
        .collect();
    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}
