//! Server wiring: config, ledger, gate and router.

use axum::Router;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use xcashu_axum::CashuMiddleware;
use xcashu_ledger::{MemoryLedger, MintClient};

use crate::config::{Config, ConfigError};
use crate::handlers::{self, ServerInfo};
use crate::util::{SigDown, Telemetry};

/// Starts the xcashu server and serves until SIGTERM or SIGINT.
///
/// Binds to the address from the config file or the `HOST` and `PORT` env vars.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let ledger = build_ledger(&config)?;

    let cashu = CashuMiddleware::new(ledger)
        .with_policy(config.policy())
        .with_extractor(config.token_extractor()?)
        .with_mint_url(config.mint_url())
        .with_settlement(config.lightning());

    let info = Arc::new(ServerInfo {
        mint: config.mint_url().to_string(),
        lightning: config.lightning(),
        token_header: cashu.config().extractor.token_label().to_string(),
        prices: config.paid_paths().to_vec(),
    });

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(info))
        .layer(cashu)
        .layer(telemetry.http_tracing())
        .layer(cors_layer());

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!(
        lightning = config.lightning(),
        mint = config.mint_url(),
        "Starting server at http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { sig_down.recv().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// In-memory ledger, wired to the mint backend when Lightning quotes are on.
fn build_ledger(config: &Config) -> Result<MemoryLedger, Box<dyn std::error::Error>> {
    let ledger = MemoryLedger::new();
    if !config.lightning() {
        return Ok(ledger);
    }
    let backend = config
        .mint_backend()
        .ok_or(ConfigError::MissingMintBackend)?;
    let mint = MintClient::try_new(backend.clone())?;
    tracing::info!(backend = %mint.base_url(), "Requesting invoices from mint backend");
    Ok(ledger.with_mint_client(mint))
}

/// Any origin, method and header; every response header is visible to browsers.
fn cors_layer() -> cors::CorsLayer {
    cors::CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any)
        .expose_headers(cors::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn cors_preflight_allows_any_method() {
        let app = Router::new()
            .route("/paid/hello", get(|| async { "hello" }))
            .layer(cors_layer());
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/paid/hello")
                    .header("origin", "https://client.example.com")
                    .header("access-control-request-method", "DELETE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "*"
        );
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
