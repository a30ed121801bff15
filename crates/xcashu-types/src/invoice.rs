//! Invoices quoted to clients that arrive without a token.

use serde::{Deserialize, Serialize};

/// A payment request for the settlement network, plus the hash used to claim it.
///
/// Field names follow the Cashu mint's `GET /mint` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "pr")]
    pub payment_request: String,
    #[serde(rename = "hash")]
    pub payment_hash: String,
}

impl Invoice {
    /// Locally synthesized invoice, used when settlement is not wired up.
    pub fn placeholder(amount: u64) -> Self {
        Self {
            payment_request: format!("payment_request: {amount} sats"),
            payment_hash: "payment_hash".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_mentions_amount() {
        let invoice = Invoice::placeholder(1000);
        assert_eq!(invoice.payment_request, "payment_request: 1000 sats");
        assert_eq!(invoice.payment_hash, "payment_hash");
    }

    #[test]
    fn parses_mint_response() {
        let invoice: Invoice =
            serde_json::from_str(r#"{"pr": "lnbc10u1p3", "hash": "67d1"}"#).unwrap();
        assert_eq!(invoice.payment_request, "lnbc10u1p3");
        assert_eq!(invoice.payment_hash, "67d1");
    }
}
