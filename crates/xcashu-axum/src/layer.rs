//! The tower [`Layer`] that puts the payment gate in front of a router.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use xcashu_axum::CashuMiddleware;
//! use xcashu_ledger::MemoryLedger;
//!
//! let cashu = CashuMiddleware::new(MemoryLedger::new());
//! let app: Router = Router::new()
//!     .route("/paid/hello", get(|| async { "hello" }))
//!     .route("/free", get(|| async { "free" }))
//!     .layer(cashu);
//! ```
//!
//! Pricing is by path (see [`crate::policy`]), so a single layer wraps the
//! whole router and free routes pass through untouched.

use axum_core::extract::Request;
use axum_core::response::Response;
use http::header::InvalidHeaderName;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use xcashu_types::ledger::Ledger;

use crate::paygate::{GateConfig, Paygate};
use crate::policy::{PathPolicy, PrefixPolicy};
use crate::token::TokenExtractor;

/// Cashu payment middleware. Build one per application and layer it onto the router.
pub struct CashuMiddleware<L, P = PrefixPolicy> {
    ledger: L,
    policy: Arc<P>,
    config: Arc<GateConfig>,
}

impl<L: Clone, P> Clone for CashuMiddleware<L, P> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: fmt::Debug, P> fmt::Debug for CashuMiddleware<L, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CashuMiddleware")
            .field("ledger", &self.ledger)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<L> CashuMiddleware<L> {
    /// Gate over `ledger` with the default policy (`/paid/` costs 1 sat) and default headers.
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            policy: Arc::new(PrefixPolicy::default()),
            config: Arc::new(GateConfig::default()),
        }
    }
}

impl<L, P> CashuMiddleware<L, P> {
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Replaces the path policy.
    pub fn with_policy<Q: PathPolicy>(self, policy: Q) -> CashuMiddleware<L, Q> {
        CashuMiddleware {
            ledger: self.ledger,
            policy: Arc::new(policy),
            config: self.config,
        }
    }

    pub fn with_extractor(self, extractor: TokenExtractor) -> Self {
        self.map_config(|config| config.extractor = extractor)
    }

    /// Overrides the name of the token header, `X-Cashu` by default.
    pub fn with_token_header(self, name: &str) -> Result<Self, InvalidHeaderName> {
        let extractor = self.config.extractor.clone().with_token_header(name)?;
        Ok(self.with_extractor(extractor))
    }

    /// Sets the mint URL advertised in quotes.
    pub fn with_mint_url(self, mint_url: impl Into<String>) -> Self {
        let mint_url = mint_url.into();
        self.map_config(|config| config.mint_url = mint_url)
    }

    /// Quotes real invoices from the ledger instead of placeholders.
    pub fn with_settlement(self, settlement: bool) -> Self {
        self.map_config(|config| config.settlement = settlement)
    }

    fn map_config(mut self, f: impl FnOnce(&mut GateConfig)) -> Self {
        let mut config = (*self.config).clone();
        f(&mut config);
        self.config = Arc::new(config);
        self
    }
}

impl<S, L, P> Layer<S> for CashuMiddleware<L, P>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    L: Ledger + Clone,
{
    type Service = CashuMiddlewareService<L, P>;

    fn layer(&self, inner: S) -> Self::Service {
        CashuMiddlewareService {
            ledger: self.ledger.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`CashuMiddleware`]; gates every request before the wrapped service sees it.
pub struct CashuMiddlewareService<L, P> {
    ledger: L,
    policy: Arc<P>,
    config: Arc<GateConfig>,
    /// The wrapped Axum service
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<L: Clone, P> Clone for CashuMiddlewareService<L, P> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<L, P> Service<Request> for CashuMiddlewareService<L, P>
where
    L: Ledger + Clone + Send + Sync + 'static,
    P: PathPolicy,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            ledger: self.ledger.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
        };
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
