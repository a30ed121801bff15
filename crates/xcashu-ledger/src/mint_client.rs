//! HTTP client for the invoice endpoint of a remote Cashu mint.
//!
//! When the gate runs with settlement enabled, a client without a token is
//! quoted a real Lightning invoice. The invoice comes from the mint's legacy
//! `GET /mint?amount=<sats>` endpoint, which answers with `{"pr": ..., "hash": ...}`.
//!
//! ```rust
//! use xcashu_ledger::MintClient;
//!
//! let mint = MintClient::try_from("https://mint.example.com/cashu").unwrap();
//! assert_eq!(mint.mint_url().as_str(), "https://mint.example.com/cashu/mint");
//! ```

use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;
use xcashu_types::invoice::Invoice;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Errors that can occur while talking to a remote mint.
#[derive(Debug, thiserror::Error)]
pub enum MintClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// A client for requesting invoices from a Cashu mint.
#[derive(Clone, Debug)]
pub struct MintClient {
    /// Base URL of the mint API (e.g. `https://mint.example/cashu/`)
    base_url: Url,
    /// Full URL of `GET /mint`
    mint_url: Url,
    client: Client,
    /// Custom headers sent with each request
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl MintClient {
    /// Constructs a client for the mint API rooted at `base_url`.
    pub fn try_new(base_url: Url) -> Result<Self, MintClientError> {
        let mint_url = base_url
            .join("./mint")
            .map_err(|e| MintClientError::UrlParse {
                context: "Failed to construct ./mint URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            mint_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn mint_url(&self) -> &Url {
        &self.mint_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attaches custom headers (an API key, say) to all future requests.
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Asks the mint for a Lightning invoice of `amount` sats.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "xcashu.mint_client.request_mint", skip(self), err)
    )]
    pub async fn request_mint(&self, amount: u64) -> Result<Invoice, MintClientError> {
        let context = "GET /mint";
        let mut req = self
            .client
            .get(self.mint_url.clone())
            .query(&[("amount", amount)]);
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| MintClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<Invoice>()
                .await
                .map_err(|e| MintClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| MintClientError::ResponseBodyRead { context, source: e })?;
            Err(MintClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl TryFrom<&str> for MintClient {
    type Error = MintClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // `Url::join` replaces the last path segment unless the base ends with a slash.
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| MintClientError::UrlParse {
            context: "Failed to parse mint url",
            source: e,
        })?;
        MintClient::try_new(url)
    }
}

impl TryFrom<String> for MintClient {
    type Error = MintClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MintClient::try_from(value.as_str())
    }
}

impl TryFrom<Url> for MintClient {
    type Error = MintClientError;

    fn try_from(value: Url) -> Result<Self, Self::Error> {
        MintClient::try_from(value.as_str())
    }
}
