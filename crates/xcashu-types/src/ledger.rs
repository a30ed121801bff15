//! The interface the payment gate redeems proofs against.
//!
//! A [`Ledger`] owns every piece of durable state: which proofs are spent and
//! which are currently being redeemed. The gate only drives the operations in a
//! fixed order (`mark_pending`, `verify`, `invalidate`, `unmark_pending`) and
//! guarantees the last one runs.
//!
//! Implementations must make [`Ledger::mark_pending`] exclusive per proof
//! identity: while one request holds a pending mark on a proof, a second
//! `mark_pending` covering that proof has to fail. Otherwise two requests can
//! both pass `verify` before either reaches `invalidate`.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::invoice::Invoice;
use crate::proof::{Proof, sum_proofs};

/// How the gate should treat a ledger failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    /// The proofs themselves were refused: invalid, unknown, pending or spent.
    Rejected,
    /// The ledger could not answer: storage or transport failure.
    Unavailable,
}

/// Error type of a [`Ledger`], classified for the gate.
pub trait LedgerError: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> LedgerErrorKind;

    fn is_rejection(&self) -> bool {
        self.kind() == LedgerErrorKind::Rejected
    }
}

/// Asynchronous interface to the system of record for proofs and invoices.
pub trait Ledger {
    type Error: LedgerError + Debug + Display;

    /// Issues an invoice for `amount` on the settlement network.
    fn request_invoice(
        &self,
        amount: u64,
    ) -> impl Future<Output = Result<Invoice, Self::Error>> + Send;

    /// Total value the ledger assigns to `proofs`.
    fn sum_value(&self, proofs: &[Proof]) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        std::future::ready(Ok(sum_proofs(proofs)))
    }

    /// Reserves `proofs` for the calling request.
    ///
    /// All-or-nothing: on error no proof of the set is left marked.
    fn mark_pending(&self, proofs: &[Proof])
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fails if any proof is malformed, unknown, or already spent.
    fn verify(&self, proofs: &[Proof]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Marks `proofs` permanently spent. Only called after a successful [`Ledger::verify`].
    fn invalidate(&self, proofs: &[Proof])
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Releases the reservation taken by [`Ledger::mark_pending`].
    fn unmark_pending(
        &self,
        proofs: &[Proof],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T: Ledger> Ledger for Arc<T> {
    type Error = T::Error;

    fn request_invoice(
        &self,
        amount: u64,
    ) -> impl Future<Output = Result<Invoice, Self::Error>> + Send {
        self.as_ref().request_invoice(amount)
    }

    fn sum_value(&self, proofs: &[Proof]) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        self.as_ref().sum_value(proofs)
    }

    fn mark_pending(
        &self,
        proofs: &[Proof],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().mark_pending(proofs)
    }

    fn verify(&self, proofs: &[Proof]) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().verify(proofs)
    }

    fn invalidate(
        &self,
        proofs: &[Proof],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().invalidate(proofs)
    }

    fn unmark_pending(
        &self,
        proofs: &[Proof],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().unmark_pending(proofs)
    }
}
