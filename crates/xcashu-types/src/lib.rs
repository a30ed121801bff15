//! Core types for xcashu, an ecash-paid HTTP gate.
//!
//! A client pays for a request by attaching a Cashu token: a base64url JSON
//! envelope carrying one or more [`proof::Proof`]s. The gate sums the proofs,
//! asks a [`ledger::Ledger`] to redeem them, and only then forwards the request.
//!
//! # Modules
//!
//! - [`config`] - Environment variable resolution for configuration values
//! - [`invoice`] - Invoices quoted to clients that arrive without a token
//! - [`ledger`] - The ledger interface the gate redeems proofs against
//! - [`proof`] - Proofs and token envelopes
//! - [`util`] - Helper types (base64url)

pub mod config;
pub mod invoice;
pub mod ledger;
pub mod proof;
pub mod util;
