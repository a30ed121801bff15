//! Configuration for the xcashu server.
//!
//! Values come from a JSON file (`--config`, `$CONFIG`, or `./config.json` when
//! present). Missing fields fall back to environment variables and then to
//! built-in defaults, so the server also starts with no file at all.
//!
//! ```json
//! {
//!   "port": 8000,
//!   "mint_url": "https://mint.example.com/cashu",
//!   "lightning": true,
//!   "mint_backend": "$MINT_BACKEND",
//!   "paid_paths": [{ "prefix": "/paid/", "amount": 1 }]
//! }
//! ```

use axum::http::header::InvalidHeaderName;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use url::Url;
use xcashu_axum::{PrefixPolicy, PricedPrefix, TokenExtractor};
use xcashu_types::config::LiteralOrEnv;

/// CLI arguments for the xcashu server.
#[derive(Parser, Debug)]
#[command(name = "xcashu")]
#[command(about = "HTTP server that charges per request in Cashu ecash")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG")]
    config: Option<PathBuf>,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    /// Mint advertised to clients in `402` quotes.
    #[serde(default = "config_defaults::default_mint_url")]
    mint_url: LiteralOrEnv<String>,
    /// Quote real Lightning invoices from `mint_backend`.
    #[serde(default = "config_defaults::default_lightning")]
    lightning: LiteralOrEnv<bool>,
    #[serde(default = "config_defaults::default_mint_backend")]
    mint_backend: Option<LiteralOrEnv<Url>>,
    #[serde(default = "config_defaults::default_token_header")]
    token_header: String,
    #[serde(default = "config_defaults::default_invoice_amount_header")]
    invoice_amount_header: String,
    #[serde(default = "config_defaults::default_invoice_amount")]
    default_invoice_amount: LiteralOrEnv<u64>,
    #[serde(default = "config_defaults::default_paid_paths")]
    paid_paths: Vec<PricedPrefix>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            mint_url: config_defaults::default_mint_url(),
            lightning: config_defaults::default_lightning(),
            mint_backend: config_defaults::default_mint_backend(),
            token_header: config_defaults::default_token_header(),
            invoice_amount_header: config_defaults::default_invoice_amount_header(),
            default_invoice_amount: config_defaults::default_invoice_amount(),
            paid_paths: config_defaults::default_paid_paths(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};
    use url::Url;
    use xcashu_axum::paygate::DEFAULT_MINT_URL;
    use xcashu_axum::policy::{DEFAULT_PAID_PREFIX, DEFAULT_PRICE};
    use xcashu_axum::token::{
        DEFAULT_INVOICE_AMOUNT, DEFAULT_INVOICE_AMOUNT_HEADER, DEFAULT_TOKEN_HEADER,
    };
    use xcashu_axum::PricedPrefix;
    use xcashu_types::config::LiteralOrEnv;

    pub const DEFAULT_PORT: u16 = 8000;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

    /// Returns the default port value with fallback: $PORT env var -> 8000
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    /// $MINT_URL -> `http://localhost:8000/cashu`
    pub fn default_mint_url() -> LiteralOrEnv<String> {
        let url = env::var("MINT_URL").unwrap_or_else(|_| DEFAULT_MINT_URL.to_string());
        LiteralOrEnv::from_literal(url)
    }

    /// $LIGHTNING -> false
    pub fn default_lightning() -> LiteralOrEnv<bool> {
        let lightning = env::var("LIGHTNING")
            .ok()
            .and_then(|s| s.to_ascii_lowercase().parse().ok())
            .unwrap_or(false);
        LiteralOrEnv::from_literal(lightning)
    }

    /// $MINT_BACKEND, unset by default
    pub fn default_mint_backend() -> Option<LiteralOrEnv<Url>> {
        env::var("MINT_BACKEND")
            .ok()
            .and_then(|s| Url::parse(&s).ok())
            .map(LiteralOrEnv::from_literal)
    }

    pub fn default_token_header() -> String {
        DEFAULT_TOKEN_HEADER.to_string()
    }

    pub fn default_invoice_amount_header() -> String {
        DEFAULT_INVOICE_AMOUNT_HEADER.to_string()
    }

    pub fn default_invoice_amount() -> LiteralOrEnv<u64> {
        LiteralOrEnv::from_literal(DEFAULT_INVOICE_AMOUNT)
    }

    pub fn default_paid_paths() -> Vec<PricedPrefix> {
        vec![PricedPrefix::new(DEFAULT_PAID_PREFIX, DEFAULT_PRICE)]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid header name in config: {0}")]
    InvalidHeader(#[from] InvalidHeaderName),
    #[error("`lightning` is enabled but no `mint_backend` is configured")]
    MissingMintBackend,
}

impl Config {
    /// Get the port value.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the host value.
    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn mint_url(&self) -> &str {
        self.mint_url.inner()
    }

    pub fn lightning(&self) -> bool {
        *self.lightning.inner()
    }

    /// Mint to request invoices from. Always `Some` when [`Config::lightning`] is on.
    pub fn mint_backend(&self) -> Option<&Url> {
        self.mint_backend.as_ref().map(|url| url.inner())
    }

    pub fn paid_paths(&self) -> &[PricedPrefix] {
        &self.paid_paths
    }

    pub fn policy(&self) -> PrefixPolicy {
        PrefixPolicy::new(self.paid_paths.iter().cloned())
    }

    pub fn token_extractor(&self) -> Result<TokenExtractor, ConfigError> {
        let extractor = TokenExtractor::new()
            .with_token_header(&self.token_header)?
            .with_invoice_amount_header(&self.invoice_amount_header)?
            .with_default_invoice_amount(*self.default_invoice_amount.inner());
        Ok(extractor)
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is taken from `--config`, then `$CONFIG`, then
    /// `./config.json`. Only the last one may be missing, in which case the
    /// defaults apply.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config = match cli_args.config {
            Some(path) => Self::load_from_path(&path)?,
            None => {
                let path = Path::new("config.json");
                if path.exists() {
                    Self::load_from_path(path)?
                } else {
                    Config::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lightning() && self.mint_backend.is_none() {
            return Err(ConfigError::MissingMintBackend);
        }
        self.token_extractor()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcashu_axum::PathPolicy;

    #[test]
    fn explicit_values_are_used() {
        let config: Config = serde_json::from_str(
            r#"{
                "port": 9000,
                "host": "127.0.0.1",
                "mint_url": "https://mint.example.com/cashu",
                "lightning": true,
                "mint_backend": "https://mint.example.com/",
                "token_header": "X-Ecash",
                "default_invoice_amount": "21",
                "paid_paths": [
                    { "prefix": "/paid/", "amount": 2 },
                    { "prefix": "/paid/free/", "amount": 0 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.port(), 9000);
        assert_eq!(config.host().to_string(), "127.0.0.1");
        assert_eq!(config.mint_url(), "https://mint.example.com/cashu");
        assert!(config.lightning());
        assert_eq!(
            config.mint_backend().map(Url::as_str),
            Some("https://mint.example.com/")
        );
        config.validate().unwrap();

        let extractor = config.token_extractor().unwrap();
        assert_eq!(extractor.token_label(), "X-Ecash");
        assert_eq!(extractor.default_invoice_amount(), 21);

        let policy = config.policy();
        assert_eq!(policy.required_amount("/paid/hello"), 2);
        assert_eq!(policy.required_amount("/paid/free/hello"), 0);
    }

    #[test]
    fn headers_and_prices_default_to_cashu_conventions() {
        let config: Config = serde_json::from_str(r#"{ "lightning": false }"#).unwrap();

        assert!(!config.lightning());
        assert_eq!(config.paid_paths(), &[PricedPrefix::new("/paid/", 1)]);
        let extractor = config.token_extractor().unwrap();
        assert_eq!(extractor.token_label(), "X-Cashu");
        assert_eq!(extractor.default_invoice_amount(), 1000);
        config.validate().unwrap();
    }

    #[test]
    fn lightning_requires_a_mint_backend() {
        let mut config: Config = serde_json::from_str(r#"{ "lightning": true }"#).unwrap();
        config.mint_backend = None;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingMintBackend)
        ));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let config: Config =
            serde_json::from_str(r#"{ "lightning": false, "token_header": "X Cashu" }"#).unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeader(_))
        ));
    }

    #[test]
    fn mint_url_can_come_from_the_environment() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("XCASHU_CONFIG_TEST_MINT", "https://env-mint.example.com") };
        let config: Config =
            serde_json::from_str(r#"{ "mint_url": "$XCASHU_CONFIG_TEST_MINT" }"#).unwrap();

        assert_eq!(config.mint_url(), "https://env-mint.example.com");
    }
}
