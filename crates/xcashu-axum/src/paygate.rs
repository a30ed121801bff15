//! The payment gate: decides, per request, whether to forward or reject.
//!
//! ## Flow
//!
//! 1. Price the path with the [`PathPolicy`]. Free paths go straight to the
//!    inner service with no ledger interaction.
//! 2. Extract the token. No token: reply `402` with a quote (an invoice plus
//!    the price). A token that does not decode: reply `400`.
//! 3. Sum the proofs. Anything but the exact price (overpayment included)
//!    is a `400`; nothing is marked pending.
//! 4. Mark the proofs pending, verify, invalidate, and unmark. The unmark runs
//!    exactly once on every exit path, request cancellation included (see
//!    [`crate::pending`]).
//! 5. A refused verification or invalidation is a `402` carrying the ledger's
//!    reason. Otherwise the untouched request is forwarded.
//!
//! Ledger infrastructure failures become `500`. Every rejection is a JSON body
//! with a `detail` field.

use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::{Service, ServiceExt};
use xcashu_types::invoice::Invoice;
use xcashu_types::ledger::{Ledger, LedgerError, LedgerErrorKind};
use xcashu_types::proof::{Proof, TokenDecodeError};

use crate::pending::redeem_detached;
use crate::policy::PathPolicy;
use crate::token::TokenExtractor;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Mint URL advertised in quotes when none is configured.
pub const DEFAULT_MINT_URL: &str = "http://localhost:8000/cashu";

/// Everything the gate needs besides the ledger and the path policy.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub extractor: TokenExtractor,
    /// Mint the client should obtain tokens from, echoed in quotes.
    pub mint_url: String,
    /// Ask the ledger for real invoices. When off, quotes carry a placeholder.
    pub settlement: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            extractor: TokenExtractor::default(),
            mint_url: DEFAULT_MINT_URL.to_string(),
            settlement: false,
        }
    }
}

/// Every way the gate can refuse a request.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    #[error("This endpoint requires a {header} ecash header. Costs per request: {required} sats")]
    PaymentRequired {
        header: String,
        required: u64,
        invoice: Invoice,
        mint: String,
    },
    #[error("Invalid {header} token: {source}")]
    InvalidToken {
        header: String,
        #[source]
        source: TokenDecodeError,
    },
    #[error("Insufficient amount provided. Costs per request: {required} sats")]
    InsufficientAmount { required: u64, provided: u64 },
    #[error("{0}")]
    PaymentRejected(String),
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

impl PaygateError {
    /// Classifies a ledger failure: refused proofs are a payment problem, anything else is ours.
    pub fn from_ledger<E: LedgerError>(err: E) -> Self {
        match err.kind() {
            LedgerErrorKind::Rejected => PaygateError::PaymentRejected(err.to_string()),
            LedgerErrorKind::Unavailable => PaygateError::LedgerUnavailable(err.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PaygateError::PaymentRequired { .. } | PaygateError::PaymentRejected(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            PaygateError::InvalidToken { .. } | PaygateError::InsufficientAmount { .. } => {
                StatusCode::BAD_REQUEST
            }
            PaygateError::LedgerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let body = match &self {
            PaygateError::PaymentRequired { invoice, mint, .. } => json!({
                "detail": detail,
                "pr": invoice.payment_request,
                "hash": invoice.payment_hash,
                "mint": mint,
            }),
            _ => json!({ "detail": detail }),
        };
        (
            self.status(),
            [(CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// One request's view of the gate: the injected ledger, the policy, and the config.
pub struct Paygate<L, P: ?Sized> {
    pub ledger: L,
    pub policy: Arc<P>,
    pub config: Arc<GateConfig>,
}

impl<L, P> Paygate<L, P>
where
    L: Ledger + Clone + Send + Sync + 'static,
    P: PathPolicy + ?Sized,
{
    /// Handles a request, turning every refusal into its JSON response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "xcashu.handle_request", skip_all, fields(path = %req.uri().path()))
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response> + Send,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        match self.handle_request_fallible(inner, req).await {
            Ok(response) => Ok(response),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                if matches!(err, PaygateError::LedgerUnavailable(_)) {
                    tracing::error!(error = %err, "ledger failure");
                } else {
                    tracing::info!(status = %err.status(), error = %err, "request refused");
                }
                Ok(err.into_response())
            }
        }
    }

    /// Like [`Paygate::handle_request`], but hands the refusal back as a [`PaygateError`].
    pub async fn handle_request_fallible<S>(
        &self,
        inner: S,
        req: Request,
    ) -> Result<Response, PaygateError>
    where
        S: Service<Request, Response = Response> + Send,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let required = self.policy.required_amount(req.uri().path());
        if required == 0 {
            return Ok(Self::call_inner(inner, req).await);
        }

        let extractor = &self.config.extractor;
        let envelope =
            extractor
                .extract(req.headers())
                .map_err(|source| PaygateError::InvalidToken {
                    header: extractor.token_label().to_string(),
                    source,
                })?;
        let Some(envelope) = envelope else {
            let invoice_amount = extractor.desired_invoice_amount(req.headers());
            return Err(self.quote(required, invoice_amount).await);
        };

        let proofs = envelope.into_proofs();
        let provided = self
            .ledger
            .sum_value(&proofs)
            .await
            .map_err(PaygateError::from_ledger)?;
        if provided != required {
            return Err(PaygateError::InsufficientAmount { required, provided });
        }

        self.redeem(proofs).await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(amount = provided, "payment redeemed, forwarding");

        Ok(Self::call_inner(inner, req).await)
    }

    /// Builds the `402` offer for a client that sent no token.
    async fn quote(&self, required: u64, invoice_amount: u64) -> PaygateError {
        let invoice = if self.config.settlement {
            match self.ledger.request_invoice(invoice_amount).await {
                Ok(invoice) => invoice,
                Err(err) => return PaygateError::LedgerUnavailable(err.to_string()),
            }
        } else {
            Invoice::placeholder(invoice_amount)
        };
        PaygateError::PaymentRequired {
            header: self.config.extractor.token_label().to_string(),
            required,
            invoice,
            mint: self.config.mint_url.clone(),
        }
    }

    /// Marks, verifies, invalidates and unmarks `proofs` on a detached task.
    async fn redeem(&self, proofs: Vec<Proof>) -> Result<(), PaygateError> {
        let (report, outcome) = oneshot::channel();
        let redemption = redeem_detached(self.ledger.clone(), proofs, report);
        #[cfg(feature = "telemetry")]
        let redemption = redemption.in_current_span();
        tokio::spawn(redemption);
        outcome.await.map_err(|_| {
            PaygateError::LedgerUnavailable("redemption aborted before completing".to_string())
        })?
    }

    /// Calls the inner service once it is ready, with telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Response
    where
        S: Service<Request, Response = Response> + Send,
        S::Error: IntoResponse,
        S::Future: Send,
    {
        let call = async move {
            match inner.ready().await {
                Ok(service) => match service.call(req).await {
                    Ok(response) => response,
                    Err(err) => err.into_response(),
                },
                Err(err) => err.into_response(),
            }
        };
        #[cfg(feature = "telemetry")]
        {
            call.instrument(tracing::info_span!("inner")).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            call.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom(LedgerErrorKind);

    impl LedgerError for Boom {
        fn kind(&self) -> LedgerErrorKind {
            self.0
        }
    }

    #[test]
    fn ledger_errors_are_classified_by_kind() {
        let rejected = PaygateError::from_ledger(Boom(LedgerErrorKind::Rejected));
        assert_eq!(rejected.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(rejected.to_string(), "boom");

        let unavailable = PaygateError::from_ledger(Boom(LedgerErrorKind::Unavailable));
        assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unavailable.to_string(), "Ledger unavailable: boom");
    }

    #[test]
    fn insufficient_amount_names_the_price() {
        let err = PaygateError::InsufficientAmount {
            required: 5,
            provided: 8,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Insufficient amount provided. Costs per request: 5 sats"
        );
    }
}
