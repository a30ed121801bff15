//! Path pricing: how many sats a request path costs.
//!
//! A [`PathPolicy`] is total and infallible; `0` means the path is free and
//! the gate forwards it without touching the ledger.

use serde::{Deserialize, Serialize};

/// Prefix that the stock policy charges for.
pub const DEFAULT_PAID_PREFIX: &str = "/paid/";
/// Price of a request under [`DEFAULT_PAID_PREFIX`], in sats.
pub const DEFAULT_PRICE: u64 = 1;

/// Maps a request path to the amount a request must pay.
pub trait PathPolicy: Send + Sync + 'static {
    fn required_amount(&self, path: &str) -> u64;

    fn is_payable(&self, path: &str) -> bool {
        self.required_amount(path) > 0
    }
}

impl<F> PathPolicy for F
where
    F: Fn(&str) -> u64 + Send + Sync + 'static,
{
    fn required_amount(&self, path: &str) -> u64 {
        self(path)
    }
}

/// One pricing rule: every path starting with `prefix` costs `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedPrefix {
    pub prefix: String,
    pub amount: u64,
}

impl PricedPrefix {
    pub fn new(prefix: impl Into<String>, amount: u64) -> Self {
        Self {
            prefix: prefix.into(),
            amount,
        }
    }
}

/// Prefix-based pricing. The longest matching prefix wins, so a zero-priced
/// rule can carve a free area out of a paid one. Unmatched paths are free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixPolicy {
    /// Sorted by descending prefix length.
    rules: Vec<PricedPrefix>,
}

impl PrefixPolicy {
    pub fn new(rules: impl IntoIterator<Item = PricedPrefix>) -> Self {
        let mut rules: Vec<PricedPrefix> = rules.into_iter().collect();
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { rules }
    }

    /// A policy under which every path is free.
    pub fn free() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_prefix(self, prefix: impl Into<String>, amount: u64) -> Self {
        let mut rules = self.rules;
        rules.push(PricedPrefix::new(prefix, amount));
        Self::new(rules)
    }

    pub fn rules(&self) -> &[PricedPrefix] {
        &self.rules
    }
}

/// `/paid/` costs 1 sat, everything else is free.
impl Default for PrefixPolicy {
    fn default() -> Self {
        Self::new([PricedPrefix::new(DEFAULT_PAID_PREFIX, DEFAULT_PRICE)])
    }
}

impl PathPolicy for PrefixPolicy {
    fn required_amount(&self, path: &str) -> u64 {
        self.rules
            .iter()
            .find(|rule| path.starts_with(rule.prefix.as_str()))
            .map_or(0, |rule| rule.amount)
    }
}
