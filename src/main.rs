//! xcashu HTTP entrypoint.
//!
//! Serves an Axum router behind the Cashu payment gate:
//! - `GET /cashu/info` – free; mint URL, token header and price list
//! - `GET /paid/hello` – paid demo resource
//!
//! Requests under a paid prefix must carry an `X-Cashu` token worth exactly
//! the path price, or they are answered with a `402` quote.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `MINT_URL`, `LIGHTNING`, `MINT_BACKEND` as config fallbacks
//! - `OTEL_*` variables enable OpenTelemetry export

mod config;
mod handlers;
mod run;
mod util;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
