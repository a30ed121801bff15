//! Axum middleware that charges for requests in [Cashu](https://cashu.space) ecash.
//!
//! A client pays by attaching a token to the `X-Cashu` header worth exactly
//! the price of the path. Requests without a token receive a `402 Payment
//! Required` quote naming the price, an invoice and the mint to pay. Tokens are
//! redeemed against an injected [`Ledger`](xcashu_types::ledger::Ledger),
//! which owns all double-spend state.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, Json};
//! use axum::response::IntoResponse;
//! use serde_json::json;
//! use xcashu_axum::{CashuMiddleware, PrefixPolicy};
//! use xcashu_ledger::MemoryLedger;
//!
//! let cashu = CashuMiddleware::new(MemoryLedger::new())
//!     .with_policy(PrefixPolicy::free().with_prefix("/premium/", 21))
//!     .with_mint_url("https://mint.example.com/cashu");
//!
//! let app: Router = Router::new()
//!     .route("/premium/content", get(my_handler))
//!     .layer(cashu);
//!
//! async fn my_handler() -> impl IntoResponse {
//!     Json(json!({ "hello": "world" }))
//! }
//! ```
//!
//! See [`CashuMiddleware`] for configuration and [`paygate`] for the exact
//! responses.

pub mod layer;
pub mod paygate;
pub mod pending;
pub mod policy;
pub mod token;

pub use layer::{CashuMiddleware, CashuMiddlewareService};
pub use paygate::{GateConfig, PaygateError};
pub use policy::{PathPolicy, PrefixPolicy, PricedPrefix};
pub use token::TokenExtractor;
