mod delivery;
mod handlers;
mod ingest;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Router,
    extract::{ConnectInfo, FromRef},
    http::{HeaderName, Request, header},
};
use merge_bridge_chain::{ProvenanceVerifier, deployment::resolve_contract_address};
use merge_bridge_core::config::Config;
use merge_bridge_github::{GitHub, MergeOrchestrator, PullRequestApi};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    normalize_path::NormalizePathLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{delivery::SIGNATURE_HEADER, handlers::build_router, ingest::Bridge};

pub struct AppState<C> {
    config: Arc<Config>,
    bridge: Arc<Bridge<C>>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self { Self { config: self.config.clone(), bridge: self.bridge.clone() } }
}

impl<C> FromRef<AppState<C>> for Arc<Config> {
    fn from_ref(state: &AppState<C>) -> Self { state.config.clone() }
}

impl<C: PullRequestApi> AppState<C> {
    pub fn new(config: Arc<Config>, client: C, contract_address: Option<&str>) -> Self {
        let verifier = ProvenanceVerifier::new(contract_address);
        let orchestrator = MergeOrchestrator::new(client, config.github.timeout());
        Self { config, bridge: Arc::new(Bridge::new(verifier, orchestrator)) }
    }
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config = Arc::new(Config::from_env().expect("Failed to load config"));
    let contract_address = resolve_contract_address(&config.marketplace)
        .expect("Failed to resolve marketplace contract address")
        .map(|address| format!("0x{address:x}"));
    match &contract_address {
        Some(address) => tracing::info!("Accepting TaskApproved events from {}", address),
        None => tracing::warn!(
            "No marketplace contract address configured: provenance checking is disabled and \
             events from any contract will be accepted"
        ),
    }
    let github = GitHub::new(&config.github).await.expect("Failed to create GitHub client");
    let state = AppState::new(config.clone(), github, contract_address.as_deref());

    let port = state.config.server.port;
    let router = app(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    tracing::info!("Web server: Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("bind error");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error");
    if let Err(e) = result {
        tracing::error!("{e:?}");
    }
    tracing::info!("Shut down gracefully");
}

fn app<C: PullRequestApi + 'static>(state: AppState<C>) -> Router {
    let sensitive_headers: Arc<[_]> =
        vec![header::AUTHORIZATION, HeaderName::from_static(SIGNATURE_HEADER)].into();
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan { level: Level::INFO })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(NormalizePathLayer::trim_trailing_slash())
        .compression();
    build_router().with_state(state).layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            result = signal::ctrl_c() => result.expect("Failed to listen for Ctrl-C"),
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl-C");
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpan {
    level: Level,
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let forwarded_for = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        let ip = forwarded_for
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(socket_addr)| socket_addr.ip())
            })
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("[unknown]");
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    ip = %ip,
                    user_agent = %user_agent,
                )
            }
        }
        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}
