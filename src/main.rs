mod auth;
mod converters;
mod error;
mod fallback;
mod logging;
mod model_table;
mod models;
mod request_id;
mod router;
mod signature_cache;
mod upstream;

use auth::OauthFileTokenSource;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use router::{chat_completions, list_models, AppState};
use signature_cache::SignatureCache;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, Level};
use upstream::CodeAssistClient;

#[derive(Parser, Debug)]
#[command(name = "gemini-proxy")]
#[command(about = "OpenAI-compatible local proxy for the Gemini Code Assist API")]
struct Args {
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// Google Cloud project id; defaults to $GOOGLE_CLOUD_PROJECT, then the
    /// onboarding handshake
    #[arg(long)]
    google_cloud_project: Option<String>,

    /// error, warn, info, debug
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Never open a browser for OAuth; rely on stored credentials only
    #[arg(long)]
    disable_browser_auth: bool,

    /// Do not add Google Search grounding to tool-less requests
    #[arg(long)]
    disable_google_search: bool,

    /// Do not switch to a fallback model on upstream rate limits
    #[arg(long)]
    disable_auto_model_switch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = Level::from_str(&args.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using INFO level.", args.log_level);
        Level::INFO
    });
    logging::init_logging(log_level);

    let project = args
        .google_cloud_project
        .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok().filter(|p| !p.is_empty()));
    match &project {
        Some(project) => info!("using Google Cloud project {}", project),
        None => info!("no project configured; will run the onboarding handshake"),
    }
    if args.disable_browser_auth {
        debug!("browser auth disabled; stored credentials will be used as-is");
    }

    let http_client = Arc::new(reqwest::Client::new());
    let token_source = Arc::new(OauthFileTokenSource::new());
    let client = Arc::new(CodeAssistClient::new(http_client, token_source, project));
    let cache = SignatureCache::open(auth::gemini_dir().join("signature-cache.json")).await;

    let app_state = AppState {
        client,
        cache: cache.clone(),
        enable_google_search: !args.disable_google_search,
        enable_model_fallback: !args.disable_auto_model_switch,
    };

    let app = Router::new()
        .route("/openai/v1/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/openai/v1/models", get(list_models))
        .route("/v1/models", get(list_models))
        .route("/health", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id::inject_request_id))
        .with_state(app_state);

    let bind_address = format!("127.0.0.1:{}", args.port);
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Server started on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache.flush().await;
    cache.destroy();
    Ok(())
}

// Waits for Ctrl+C (all platforms) or SIGTERM (unix) and returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let term = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received. Starting graceful shutdown...");
        }
        _ = term => {
            tracing::info!("SIGTERM received. Starting graceful shutdown...");
        }
    }
}
