//! Reference [`Ledger`](xcashu_types::ledger::Ledger) for the xcashu gate.
//!
//! - [`memory`] - [`MemoryLedger`], an in-process double-spend database with
//!   exclusive pending marks.
//! - [`mint_client`] - [`MintClient`], which asks a remote Cashu mint for
//!   Lightning invoices when settlement is enabled.
//!
//! The ledger does not check mint signatures on proofs: that belongs to the
//! mint's keyset cryptography. It enforces everything the gate's redemption
//! protocol depends on: well-formed amounts, unique secrets, issued-set
//! membership, and the pending/spent lifecycle.

pub mod memory;
pub mod mint_client;

pub use memory::{MemoryLedger, MemoryLedgerError};
pub use mint_client::{MintClient, MintClientError};
