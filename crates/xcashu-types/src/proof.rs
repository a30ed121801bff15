//! Ecash proofs and the token envelope that carries them over HTTP.
//!
//! The envelope is the legacy Cashu "V2" token: a JSON object with a `proofs`
//! array and an optional `mints` list, serialized as base64url. The gate never
//! looks inside a proof beyond its `amount`; the `secret` is the identity a
//! [`Ledger`](crate::ledger::Ledger) uses for double-spend detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::util::Base64Bytes;

/// A single value-unit claim, redeemable once against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    /// Keyset identifier of the mint keys that signed this proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Value in the smallest settlement unit (sats).
    pub amount: u64,
    pub secret: String,
    /// Unblinded mint signature on `secret`.
    #[serde(rename = "C")]
    pub c: String,
}

impl Proof {
    /// Identity used for pending marks and spent-state lookups.
    pub fn identity(&self) -> &str {
        &self.secret
    }
}

/// Total value of a set of proofs.
///
/// Saturates instead of overflowing, so a hostile envelope can never wrap
/// around to a small total.
pub fn sum_proofs(proofs: &[Proof]) -> u64 {
    proofs
        .iter()
        .fold(0u64, |total, proof| total.saturating_add(proof.amount))
}

/// A mint referenced by a token, with the keyset ids its proofs belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMint {
    pub url: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// Proofs extracted from one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub proofs: Vec<Proof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mints: Option<Vec<TokenMint>>,
}

/// Why a serialized token could not be turned into a [`TokenEnvelope`].
#[derive(Debug, thiserror::Error)]
pub enum TokenDecodeError {
    #[error("token is not valid text")]
    NotText,
    #[error("token is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token is not a valid envelope: {0}")]
    Json(#[from] serde_json::Error),
}

impl TokenEnvelope {
    pub fn new(proofs: Vec<Proof>) -> Self {
        Self {
            proofs,
            mints: None,
        }
    }

    /// Sum of all proof amounts in the envelope.
    pub fn amount(&self) -> u64 {
        sum_proofs(&self.proofs)
    }

    /// Decodes a base64url JSON envelope, as sent in the token header.
    pub fn decode(serialized: &[u8]) -> Result<Self, TokenDecodeError> {
        let json = Base64Bytes::from(serialized).decode()?;
        let envelope = serde_json::from_slice(&json)?;
        Ok(envelope)
    }

    /// Serializes the envelope into the base64url form [`TokenEnvelope::decode`] accepts.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    pub fn into_proofs(self) -> Vec<Proof> {
        self.proofs
    }
}

impl FromStr for TokenEnvelope {
    type Err = TokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s.as_bytes())
    }
}

impl fmt::Display for TokenEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let serialized = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&serialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof {
            id: Some("I2yN+iRYfkzT".to_string()),
            amount,
            secret: secret.to_string(),
            c: "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea".to_string(),
        }
    }

    #[test]
    fn decodes_legacy_v2_token() {
        let json = r#"{
            "proofs": [
                {"id": "DSAl9nvvyfva", "amount": 2, "secret": "EhpennC9qB3iFlW8FZ_pZw", "C": "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4"},
                {"id": "DSAl9nvvyfva", "amount": 8, "secret": "TmS6Cv0YT5PU_5ATVKnukw", "C": "02ac910bef28cbe5d7325415d5c263026f15f9b967a079ca9779ab6e5c2db133a7"}
            ],
            "mints": [{"url": "https://8333.space:3338", "ids": ["DSAl9nvvyfva"]}]
        }"#;
        let serialized = Base64Bytes::encode(json.as_bytes()).to_string();

        let envelope: TokenEnvelope = serialized.parse().unwrap();
        assert_eq!(envelope.proofs.len(), 2);
        assert_eq!(envelope.amount(), 10);
        assert_eq!(envelope.proofs[1].identity(), "TmS6Cv0YT5PU_5ATVKnukw");
        assert_eq!(envelope.mints.unwrap()[0].url, "https://8333.space:3338");
    }

    #[test]
    fn encoded_envelope_decodes_to_the_same_proofs() {
        let envelope = TokenEnvelope::new(vec![proof(1, "a"), proof(4, "b")]);
        let serialized = envelope.encode().unwrap();
        assert!(!serialized.contains('+'));
        assert_eq!(TokenEnvelope::decode(serialized.as_bytes()).unwrap(), envelope);
    }

    #[test]
    fn missing_proofs_is_a_schema_error() {
        let serialized = Base64Bytes::encode(br#"{"token": []}"#).to_string();
        let err = TokenEnvelope::decode(serialized.as_bytes()).unwrap_err();
        assert!(matches!(err, TokenDecodeError::Json(_)));
    }

    #[test]
    fn negative_amount_is_a_schema_error() {
        let json = r#"{"proofs": [{"amount": -1, "secret": "s", "C": "c"}]}"#;
        let serialized = Base64Bytes::encode(json.as_bytes()).to_string();
        assert!(matches!(
            TokenEnvelope::decode(serialized.as_bytes()),
            Err(TokenDecodeError::Json(_))
        ));
    }

    #[test]
    fn bad_base64_is_reported_as_such() {
        assert!(matches!(
            TokenEnvelope::decode(b"%%%"),
            Err(TokenDecodeError::Base64(_))
        ));
    }

    #[test]
    fn sum_saturates() {
        let proofs = vec![proof(u64::MAX, "a"), proof(2, "b")];
        assert_eq!(sum_proofs(&proofs), u64::MAX);
        assert_eq!(sum_proofs(&[]), 0);
    }
}
