//! In-process ledger with exclusive pending marks.
//!
//! Every proof the ledger has seen lives in one shared map keyed by its
//! identity (the proof secret), in one of two states: `Pending` while a
//! request is redeeming it, `Spent` once redeemed. A proof absent from the
//! map is free.
//!
//! [`Ledger::mark_pending`] claims each identity with an atomic per-key
//! insert. If any key is already taken, the keys this call did claim are
//! rolled back and the call fails, so two requests presenting overlapping
//! proofs can never both hold a pending mark, and a mark that fails leaves
//! nothing behind to clean up.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::Arc;
use xcashu_types::invoice::Invoice;
use xcashu_types::ledger::{Ledger, LedgerError, LedgerErrorKind};
use xcashu_types::proof::Proof;

use crate::mint_client::{MintClient, MintClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProofState {
    Pending,
    Spent,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryLedgerError {
    #[error("proofs already pending")]
    AlreadyPending,
    #[error("proofs already spent")]
    AlreadySpent,
    #[error("duplicate proofs")]
    DuplicateProofs,
    #[error("invalid proof amount: {0}")]
    InvalidAmount(u64),
    #[error("proof has an empty secret")]
    EmptySecret,
    #[error("proof was not issued by this mint")]
    NotIssued,
    #[error("settlement is not configured")]
    SettlementDisabled,
    #[error(transparent)]
    Mint(#[from] MintClientError),
}

impl LedgerError for MemoryLedgerError {
    fn kind(&self) -> LedgerErrorKind {
        match self {
            MemoryLedgerError::SettlementDisabled | MemoryLedgerError::Mint(_) => {
                LedgerErrorKind::Unavailable
            }
            _ => LedgerErrorKind::Rejected,
        }
    }
}

/// Shared, cloneable in-memory ledger. Clones see the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    proofs: Arc<DashMap<String, ProofState>>,
    /// When set, only proofs registered here verify.
    issued: Option<Arc<DashSet<String>>>,
    mint: Option<MintClient>,
}

impl MemoryLedger {
    /// A ledger that accepts any well-formed proof it has not seen spent.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that only accepts proofs from `issued`.
    pub fn with_issued<'a>(issued: impl IntoIterator<Item = &'a Proof>) -> Self {
        let set: DashSet<String> = issued
            .into_iter()
            .map(|proof| proof.identity().to_string())
            .collect();
        Self {
            issued: Some(Arc::new(set)),
            ..Self::default()
        }
    }

    /// Uses `mint` to answer [`Ledger::request_invoice`].
    pub fn with_mint_client(mut self, mint: MintClient) -> Self {
        self.mint = Some(mint);
        self
    }

    /// Registers more issued proofs. No-op for a ledger built with [`MemoryLedger::new`].
    pub fn issue<'a>(&self, proofs: impl IntoIterator<Item = &'a Proof>) {
        if let Some(issued) = &self.issued {
            for proof in proofs {
                issued.insert(proof.identity().to_string());
            }
        }
    }

    pub fn is_pending(&self, identity: &str) -> bool {
        self.state(identity) == Some(ProofState::Pending)
    }

    pub fn is_spent(&self, identity: &str) -> bool {
        self.state(identity) == Some(ProofState::Spent)
    }

    /// Number of proofs currently marked pending.
    pub fn pending_len(&self) -> usize {
        self.proofs
            .iter()
            .filter(|entry| *entry.value() == ProofState::Pending)
            .count()
    }

    fn state(&self, identity: &str) -> Option<ProofState> {
        self.proofs.get(identity).map(|state| *state)
    }

    fn claim(&self, proofs: &[Proof]) -> Result<(), MemoryLedgerError> {
        ensure_unique(proofs)?;
        let mut claimed: Vec<&str> = Vec::with_capacity(proofs.len());
        for proof in proofs {
            // The entry guard holds a shard lock; it must be gone before any rollback.
            let conflict = match self.proofs.entry(proof.identity().to_string()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(ProofState::Pending);
                    None
                }
                Entry::Occupied(occupied) => Some(match occupied.get() {
                    ProofState::Pending => MemoryLedgerError::AlreadyPending,
                    ProofState::Spent => MemoryLedgerError::AlreadySpent,
                }),
            };
            match conflict {
                None => claimed.push(proof.identity()),
                Some(err) => {
                    for identity in claimed {
                        self.release(identity);
                    }
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(error = %err, "refused pending mark");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn release(&self, identity: &str) {
        self.proofs
            .remove_if(identity, |_, state| *state == ProofState::Pending);
    }

    fn check(&self, proof: &Proof) -> Result<(), MemoryLedgerError> {
        if !proof.amount.is_power_of_two() {
            return Err(MemoryLedgerError::InvalidAmount(proof.amount));
        }
        if proof.secret.is_empty() {
            return Err(MemoryLedgerError::EmptySecret);
        }
        if let Some(issued) = &self.issued
            && !issued.contains(proof.identity())
        {
            return Err(MemoryLedgerError::NotIssued);
        }
        if self.is_spent(proof.identity()) {
            return Err(MemoryLedgerError::AlreadySpent);
        }
        Ok(())
    }
}

fn ensure_unique(proofs: &[Proof]) -> Result<(), MemoryLedgerError> {
    let mut seen = HashSet::with_capacity(proofs.len());
    if proofs.iter().all(|proof| seen.insert(proof.identity())) {
        Ok(())
    } else {
        Err(MemoryLedgerError::DuplicateProofs)
    }
}

impl Ledger for MemoryLedger {
    type Error = MemoryLedgerError;

    async fn request_invoice(&self, amount: u64) -> Result<Invoice, Self::Error> {
        match &self.mint {
            Some(mint) => Ok(mint.request_mint(amount).await?),
            None => Err(MemoryLedgerError::SettlementDisabled),
        }
    }

    async fn mark_pending(&self, proofs: &[Proof]) -> Result<(), Self::Error> {
        self.claim(proofs)
    }

    async fn verify(&self, proofs: &[Proof]) -> Result<(), Self::Error> {
        ensure_unique(proofs)?;
        proofs.iter().try_for_each(|proof| self.check(proof))
    }

    async fn invalidate(&self, proofs: &[Proof]) -> Result<(), Self::Error> {
        for proof in proofs {
            self.proofs
                .insert(proof.identity().to_string(), ProofState::Spent);
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(count = proofs.len(), "invalidated proofs");
        Ok(())
    }

    async fn unmark_pending(&self, proofs: &[Proof]) -> Result<(), Self::Error> {
        for proof in proofs {
            self.release(proof.identity());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof {
            id: None,
            amount,
            secret: secret.to_string(),
            c: "02".to_string(),
        }
    }

    #[tokio::test]
    async fn full_redemption_leaves_proofs_spent_and_unmarked() {
        let ledger = MemoryLedger::new();
        let proofs = vec![proof(1, "a"), proof(2, "b")];

        ledger.mark_pending(&proofs).await.unwrap();
        assert_eq!(ledger.pending_len(), 2);
        ledger.verify(&proofs).await.unwrap();
        ledger.invalidate(&proofs).await.unwrap();
        ledger.unmark_pending(&proofs).await.unwrap();

        assert_eq!(ledger.pending_len(), 0);
        assert!(ledger.is_spent("a"));
        assert!(ledger.is_spent("b"));
    }

    #[tokio::test]
    async fn second_mark_is_refused_and_rolled_back() {
        let ledger = MemoryLedger::new();
        ledger.mark_pending(&[proof(1, "shared")]).await.unwrap();

        let err = ledger
            .mark_pending(&[proof(1, "fresh"), proof(1, "shared")])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryLedgerError::AlreadyPending));
        assert!(err.is_rejection());
        // "fresh" was claimed first and must have been released again.
        assert!(!ledger.is_pending("fresh"));
        assert!(ledger.is_pending("shared"));
    }

    #[tokio::test]
    async fn spent_proofs_cannot_be_marked_or_verified() {
        let ledger = MemoryLedger::new();
        let proofs = vec![proof(4, "x")];
        ledger.invalidate(&proofs).await.unwrap();

        assert!(matches!(
            ledger.mark_pending(&proofs).await,
            Err(MemoryLedgerError::AlreadySpent)
        ));
        assert!(matches!(
            ledger.verify(&proofs).await,
            Err(MemoryLedgerError::AlreadySpent)
        ));
        assert_eq!(ledger.pending_len(), 0);
    }

    #[tokio::test]
    async fn unmark_keeps_spent_state() {
        let ledger = MemoryLedger::new();
        let proofs = vec![proof(1, "s")];
        ledger.mark_pending(&proofs).await.unwrap();
        ledger.invalidate(&proofs).await.unwrap();
        ledger.unmark_pending(&proofs).await.unwrap();
        assert!(ledger.is_spent("s"));
    }

    #[tokio::test]
    async fn verify_rejects_malformed_proofs() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.verify(&[proof(3, "a")]).await,
            Err(MemoryLedgerError::InvalidAmount(3))
        ));
        assert!(matches!(
            ledger.verify(&[proof(0, "a")]).await,
            Err(MemoryLedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.verify(&[proof(1, "")]).await,
            Err(MemoryLedgerError::EmptySecret)
        ));
        assert!(matches!(
            ledger.verify(&[proof(1, "d"), proof(2, "d")]).await,
            Err(MemoryLedgerError::DuplicateProofs)
        ));
        assert!(matches!(
            ledger.mark_pending(&[proof(1, "d"), proof(2, "d")]).await,
            Err(MemoryLedgerError::DuplicateProofs)
        ));
        assert_eq!(ledger.pending_len(), 0);
    }

    #[tokio::test]
    async fn issued_set_restricts_verification() {
        let known = proof(8, "known");
        let ledger = MemoryLedger::with_issued([&known]);
        assert!(ledger.verify(std::slice::from_ref(&known)).await.is_ok());
        assert!(matches!(
            ledger.verify(&[proof(8, "stranger")]).await,
            Err(MemoryLedgerError::NotIssued)
        ));

        let later = proof(1, "later");
        ledger.issue([&later]);
        assert!(ledger.verify(&[later]).await.is_ok());
    }

    #[tokio::test]
    async fn invoice_without_mint_is_unavailable() {
        let err = MemoryLedger::new().request_invoice(1000).await.unwrap_err();
        assert_eq!(err.kind(), LedgerErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn default_sum_value_adds_amounts() {
        let ledger = MemoryLedger::new();
        let total = ledger
            .sum_value(&[proof(1, "a"), proof(4, "b")])
            .await
            .unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_marks_admit_at_most_one() {
        let ledger = MemoryLedger::new();
        let proofs = Arc::new(vec![proof(1, "p1"), proof(2, "p2")]);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                let proofs = proofs.clone();
                tokio::spawn(async move {
                    // Rotate the order so racers collide on different keys first.
                    let mut mine = proofs.as_ref().clone();
                    mine.rotate_left(i % 2);
                    ledger.mark_pending(&mine).await.is_ok()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert!(admitted <= 1);
        // The winner, if any, still holds both marks; losers left nothing behind.
        assert_eq!(ledger.pending_len(), admitted * 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_marks_in_the_same_order_admit_exactly_one() {
        let ledger = MemoryLedger::new();
        let proofs = Arc::new(vec![proof(1, "q1"), proof(2, "q2")]);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                let proofs = proofs.clone();
                tokio::spawn(async move { ledger.mark_pending(&proofs).await.is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        // Whoever claims the first key first also gets the second.
        assert_eq!(admitted, 1);
        assert_eq!(ledger.pending_len(), 2);
    }
}
