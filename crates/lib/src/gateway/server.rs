//! Gateway HTTP server: LINE webhook endpoint and health probe.

use crate::channels::{self, LineChannel, ReplyChannel, WebhookPayload, SIGNATURE_HEADER};
use crate::config::{Config, Secrets};
use crate::llm::{CompletionParams, LlmBackend, OpenRouterClient};
use crate::pipeline::Pipeline;
use crate::retrieval::{Retriever, RetrieverClient};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shared state for the webhook handler. Immutable; cloned per request.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// LINE channel secret. When None every webhook is rejected as unsigned.
    pub channel_secret: Option<String>,
    pub retriever: Arc<dyn Retriever>,
    pub llm: Arc<dyn LlmBackend>,
    pub channel: Arc<dyn ReplyChannel>,
    pub params: Arc<CompletionParams>,
    pub top_k: u32,
}

impl GatewayState {
    /// Build HTTP collaborators from config, with env overrides applied to secrets.
    pub fn from_config(config: Config) -> Self {
        let secrets = Secrets::resolve(&config);
        Self::new(config, secrets)
    }

    /// Build HTTP collaborators from config and already-resolved secrets. The environment is not read.
    pub fn new(config: Config, secrets: Secrets) -> Self {
        let retriever = RetrieverClient::new(
            secrets.retriever_endpoint,
            Duration::from_millis(config.retriever.timeout_ms),
        );
        let llm = OpenRouterClient::new(
            &config.completion.base_url,
            secrets.completion_api_key,
            Duration::from_millis(config.completion.timeout_ms),
        );
        let channel = LineChannel::new(
            secrets.channel_access_token,
            &config.channels.line.api_base,
            Duration::from_millis(config.channels.line.timeout_ms),
        );
        let params = CompletionParams {
            model: config.completion.model.clone(),
            temperature: config.completion.temperature,
            max_tokens: config.completion.max_tokens,
        };
        Self {
            channel_secret: secrets.channel_secret,
            retriever: Arc::new(retriever),
            llm: Arc::new(llm),
            channel: Arc::new(channel),
            params: Arc::new(params),
            top_k: config.retriever.top_k,
            config: Arc::new(config),
        }
    }

    /// Pipeline for one request, tagged with a fresh request id.
    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            request_id: Uuid::new_v4(),
            retriever: self.retriever.as_ref(),
            llm: self.llm.as_ref(),
            params: self.params.as_ref(),
            top_k: self.top_k,
        }
    }
}

/// Webhook route: POST only; every other method gets 405.
fn webhook_route() -> MethodRouter<GatewayState> {
    post(line_webhook).fallback(method_not_allowed)
}

/// Routes: `POST /` and `POST /line/webhook` (webhook), `GET /health`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", webhook_route())
        .route("/line/webhook", webhook_route())
        .route("/health", get(health_http))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    let secrets = Secrets::resolve(&config);
    for name in secrets.missing() {
        log::warn!("{} is not set; calls that need it will fail", name);
    }
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::new(config, secrets);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight webhook requests are allowed to finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// POST / — LINE webhook. Verifies the signature over the raw body, then answers each
/// text message event in order before responding.
async fn line_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let pipeline = state.pipeline();
    let request_id = pipeline.request_id;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let verified = match state.channel_secret.as_deref() {
        Some(secret) => channels::verify_signature(secret, &body, signature),
        None => {
            log::warn!("[{}] channel secret not configured; rejecting webhook", request_id);
            false
        }
    };
    if !verified {
        log::warn!("[{}] invalid signature", request_id);
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let payload = match WebhookPayload::parse(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("[{}] bad JSON: {}", request_id, e);
            return (StatusCode::BAD_REQUEST, "Bad JSON");
        }
    };
    log::info!("[{}] webhook with {} event(s)", request_id, payload.len());

    for (index, event) in payload.events().enumerate() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                log::debug!("[{}] skipping malformed event {}: {}", request_id, index, e);
                continue;
            }
        };
        let Some(message) = event.text_message() else {
            log::debug!("[{}] skipping {} event", request_id, event.typ);
            continue;
        };
        if let Err(e) = pipeline
            .answer_and_reply(state.channel.as_ref(), &message)
            .await
        {
            log::warn!(
                "[{}] {} reply delivery failed, not retried: {}",
                request_id,
                state.channel.id(),
                e
            );
        }
    }

    (StatusCode::OK, "ok")
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}
