//! HTTP endpoints served behind the payment gate.
//!
//! `/cashu/info` is free and tells clients where to get tokens and what each
//! path costs. `/paid/hello` is a demo resource under the default paid prefix;
//! by the time its handler runs the gate has already redeemed the payment.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use xcashu_axum::PricedPrefix;

/// Public facts about this server's pricing, shared with the handlers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub mint: String,
    pub lightning: bool,
    pub token_header: String,
    pub prices: Vec<PricedPrefix>,
}

pub fn routes() -> Router<Arc<ServerInfo>> {
    Router::new()
        .route("/cashu/info", get(get_info))
        .route("/paid/hello", get(get_hello))
}

/// `GET /cashu/info`: mint, token header and price list.
#[instrument(skip_all)]
pub async fn get_info(State(info): State<Arc<ServerInfo>>) -> impl IntoResponse {
    Json(info.as_ref().clone())
}

/// `GET /paid/hello`: paid demo resource.
#[instrument(skip_all)]
pub async fn get_hello() -> impl IntoResponse {
    Json(json!({ "message": "Hello, paying customer!" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn info() -> Arc<ServerInfo> {
        Arc::new(ServerInfo {
            mint: "http://localhost:8000/cashu".to_string(),
            lightning: false,
            token_header: "X-Cashu".to_string(),
            prices: vec![PricedPrefix::new("/paid/", 1)],
        })
    }

    #[tokio::test]
    async fn info_lists_mint_and_prices() {
        let response = routes()
            .with_state(info())
            .oneshot(
                Request::builder()
                    .uri("/cashu/info")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["mint"], "http://localhost:8000/cashu");
        assert_eq!(body["token_header"], "X-Cashu");
        assert_eq!(body["prices"][0]["prefix"], "/paid/");
        assert_eq!(body["prices"][0]["amount"], 1);
    }
}
