//! Environment variable resolution for configuration values.
//!
//! Any string-typed configuration value may be written either literally or as a
//! reference to an environment variable:
//!
//! ```json
//! {
//!   "mint_url": "https://mint.example.com/cashu",
//!   "mint_backend": "$MINT_BACKEND_URL",
//!   "default_invoice_amount": "${QUOTE_SATS}"
//! }
//! ```
//!
//! This keeps deployment-specific endpoints out of the checked-in config file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// A value that is either given literally or read from the environment during deserialization.
///
/// Accepts `"literal"`, `"$VAR"` and `"${VAR}"`. The resolved string is then parsed with
/// [`FromStr`], so a `LiteralOrEnv<u64>` reads `"1000"` as well as `"$AMOUNT"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Returns the variable name when `s` is written as `$VAR` or `${VAR}`.
fn env_var_name(s: &str) -> Option<&str> {
    if let Some(braced) = s.strip_prefix("${") {
        return braced.strip_suffix('}').filter(|name| !name.is_empty());
    }
    let name = s.strip_prefix('$')?;
    let is_identifier = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then_some(name)
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Accept bare JSON numbers and booleans too, so `"port": 8000` keeps working.
        let raw = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a string, number or boolean, got {other}"
                )));
            }
        };

        let resolved = match env_var_name(&raw) {
            Some(name) => std::env::var(name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{name}' not found (referenced as '{raw}')"
                ))
            })?,
            None => raw,
        };

        resolved
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse '{resolved}': {e}")))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_env_syntax() {
        assert_eq!(env_var_name("$MINT_URL"), Some("MINT_URL"));
        assert_eq!(env_var_name("${MINT_URL}"), Some("MINT_URL"));
        assert_eq!(env_var_name("http://localhost:3338"), None);
        assert_eq!(env_var_name("$"), None);
        assert_eq!(env_var_name("${}"), None);
        assert_eq!(env_var_name("$not a var"), None);
    }

    #[test]
    fn literal_values_parse_directly() {
        let amount: LiteralOrEnv<u64> = serde_json::from_str("\"21\"").unwrap();
        assert_eq!(*amount, 21);
        let amount: LiteralOrEnv<u64> = serde_json::from_str("21").unwrap();
        assert_eq!(amount.into_inner(), 21);
        let flag: LiteralOrEnv<bool> = serde_json::from_str("true").unwrap();
        assert!(*flag.inner());
    }

    #[test]
    fn env_references_are_resolved() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("XCASHU_TEST_QUOTE_SATS", "2100") };
        let amount: LiteralOrEnv<u64> =
            serde_json::from_str("\"${XCASHU_TEST_QUOTE_SATS}\"").unwrap();
        assert_eq!(*amount, 2100);
    }

    #[test]
    fn missing_env_is_an_error() {
        let err = serde_json::from_str::<LiteralOrEnv<String>>("\"$XCASHU_TEST_SURELY_UNSET\"")
            .unwrap_err();
        assert!(err.to_string().contains("XCASHU_TEST_SURELY_UNSET"));
    }
}
