mod auth;
mod config;
mod cors;
mod db;
mod embedding;
mod error;
mod store;
mod ws;

use std::time::Instant;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    auth::tokens::{TokenConfig, TokenService},
    config::ServerConfig,
    embedding::Embeddings,
    error::{attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope},
    store::Store,
};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    if config.has_dev_secrets() {
        warn!(
            "running with built-in development secrets, set CORKBOARD_ACCESS_TOKEN_SECRET \
             and CORKBOARD_REFRESH_TOKEN_SECRET before exposing this server"
        );
    }

    let store = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pg_pool(url, db::PoolConfig::from_env())
                .await
                .context("failed to connect to Postgres")?;
            db::run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            db::check_pool_health(&pool)
                .await
                .context("database health check failed")?;
            info!("connected to Postgres");
            Store::postgres(pool)
        }
        None => {
            warn!("CORKBOARD_DATABASE_URL is not set, boards will live in memory only");
            Store::memory()
        }
    };

    let tokens = TokenService::new(TokenConfig::from_server_config(&config), store.clone())
        .context("invalid token configuration")?;

    let embeddings = Embeddings::from_api_key(config.cohere_api_key.clone());
    if !embeddings.is_enabled() {
        info!("semantic search is disabled, set CORKBOARD_COHERE_API_KEY to enable it");
    }

    let app = build_router(
        store,
        tokens,
        embeddings,
        cors::cors_layer(config.cors_origins.as_deref()),
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting corkboard server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")
}

fn build_router(
    store: Store,
    tokens: TokenService,
    embeddings: Embeddings,
    cors: CorsLayer,
) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(auth::routes::router(store.clone(), tokens.clone()))
            .merge(ws::router(store, tokens, embeddings)),
    )
    .layer(cors)
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
