//! Pulling the client's ecash token out of a request.
//!
//! The token travels in a dedicated header (`X-Cashu` by default) as a
//! base64url JSON envelope. A missing or empty header means the client offered
//! no payment; a header that does not decode is a client error, never treated
//! as "no payment".

use http::HeaderMap;
use http::header::{HeaderName, InvalidHeaderName};
use xcashu_types::proof::{TokenDecodeError, TokenEnvelope};

pub const DEFAULT_TOKEN_HEADER: &str = "X-Cashu";
/// Header a client may use to choose the size of the invoice it is quoted.
pub const DEFAULT_INVOICE_AMOUNT_HEADER: &str = "X-Cashu-Inv-Amnt";
/// Invoice size, in sats, quoted when the client does not ask for one.
pub const DEFAULT_INVOICE_AMOUNT: u64 = 1000;

/// Reads the payment token and the requested quote size from request headers.
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    token_header: HeaderName,
    /// Header name as configured, for user-facing messages (`HeaderName` is lowercased).
    token_label: String,
    invoice_amount_header: HeaderName,
    default_invoice_amount: u64,
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self {
            token_header: HeaderName::from_static("x-cashu"),
            token_label: DEFAULT_TOKEN_HEADER.to_string(),
            invoice_amount_header: HeaderName::from_static("x-cashu-inv-amnt"),
            default_invoice_amount: DEFAULT_INVOICE_AMOUNT,
        }
    }
}

impl TokenExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token_header(mut self, name: &str) -> Result<Self, InvalidHeaderName> {
        self.token_header = HeaderName::from_bytes(name.as_bytes())?;
        self.token_label = name.to_string();
        Ok(self)
    }

    pub fn with_invoice_amount_header(mut self, name: &str) -> Result<Self, InvalidHeaderName> {
        self.invoice_amount_header = HeaderName::from_bytes(name.as_bytes())?;
        Ok(self)
    }

    pub fn with_default_invoice_amount(mut self, amount: u64) -> Self {
        self.default_invoice_amount = amount;
        self
    }

    pub fn token_header(&self) -> &HeaderName {
        &self.token_header
    }

    /// The token header name in the casing it was configured with.
    pub fn token_label(&self) -> &str {
        &self.token_label
    }

    pub fn default_invoice_amount(&self) -> u64 {
        self.default_invoice_amount
    }

    /// Returns the decoded token, or `None` when the client did not send one.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Option<TokenEnvelope>, TokenDecodeError> {
        let Some(value) = headers.get(&self.token_header) else {
            return Ok(None);
        };
        let token = value.to_str().map_err(|_| TokenDecodeError::NotText)?.trim();
        if token.is_empty() {
            return Ok(None);
        }
        TokenEnvelope::decode(token.as_bytes()).map(Some)
    }

    /// Invoice size the client asked for, or the configured default when the
    /// header is absent, not a positive integer, or zero.
    pub fn desired_invoice_amount(&self, headers: &HeaderMap) -> u64 {
        headers
            .get(&self.invoice_amount_header)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|amount| *amount > 0)
            .unwrap_or(self.default_invoice_amount)
    }
}
