//! Redemption of proofs under a pending mark.
//!
//! [`redeem_detached`] runs the whole mark, verify, invalidate, unmark
//! sequence on its own Tokio task and reports back over a oneshot channel.
//! Dropping the request future only drops the receiving end: a mark that is
//! in flight still lands and is still released, and an unmark that has
//! started is never repeated. Once the caller is gone the task stops spending
//! and only unmarks, so an abandoned request does not consume its token
//! unless invalidation already began.
//!
//! [`PendingGuard`] covers the remaining exit path, a panic inside the ledger:
//! its `Drop` spawns the unmark if [`PendingGuard::release`] never started.

use tokio::sync::oneshot;
use xcashu_types::ledger::Ledger;
use xcashu_types::proof::Proof;

use crate::paygate::PaygateError;

/// Pending mark on a set of proofs, released exactly once.
pub struct PendingGuard<L>
where
    L: Ledger + Clone + Send + Sync + 'static,
{
    ledger: L,
    /// `None` once release has started.
    proofs: Option<Vec<Proof>>,
}

impl<L> PendingGuard<L>
where
    L: Ledger + Clone + Send + Sync + 'static,
{
    /// Marks `proofs` pending. On error nothing is held and nothing needs releasing.
    pub async fn acquire(ledger: L, proofs: Vec<Proof>) -> Result<Self, L::Error> {
        ledger.mark_pending(&proofs).await?;
        Ok(Self {
            ledger,
            proofs: Some(proofs),
        })
    }

    pub fn proofs(&self) -> &[Proof] {
        self.proofs.as_deref().unwrap_or_default()
    }

    /// Unmarks the proofs.
    ///
    /// The guard is disarmed before the ledger call, so `Drop` never issues a
    /// second unmark. Callers must not cancel this future; [`redeem_detached`]
    /// runs it on a task nobody aborts.
    pub async fn release(mut self) -> Result<(), L::Error> {
        match self.proofs.take() {
            Some(proofs) => self.ledger.unmark_pending(&proofs).await,
            None => Ok(()),
        }
    }
}

impl<L> Drop for PendingGuard<L>
where
    L: Ledger + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let Some(proofs) = self.proofs.take() else {
            return;
        };
        let ledger = self.ledger.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    count = proofs.len(),
                    "pending mark dropped before release, unmarking in background"
                );
                handle.spawn(async move {
                    let result = ledger.unmark_pending(&proofs).await;
                    #[cfg(feature = "telemetry")]
                    if let Err(err) = &result {
                        tracing::error!(error = %err, "background unmark failed");
                    }
                    let _ = result;
                });
            }
            Err(_) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(
                    count = proofs.len(),
                    "pending mark dropped outside a Tokio runtime; proofs stay pending"
                );
            }
        }
    }
}

/// Redeems `proofs` and sends the outcome to `caller`.
///
/// Meant to be spawned: nothing here may be cut short by the request going away.
/// A failed unmark outranks the redemption outcome, since the proofs are then
/// stuck pending.
pub async fn redeem_detached<L>(
    ledger: L,
    proofs: Vec<Proof>,
    caller: oneshot::Sender<Result<(), PaygateError>>,
) where
    L: Ledger + Clone + Send + Sync + 'static,
{
    let outcome = async {
        let guard = PendingGuard::acquire(ledger.clone(), proofs)
            .await
            .map_err(PaygateError::from_ledger)?;
        let spent = spend(&ledger, guard.proofs(), &caller).await;
        guard
            .release()
            .await
            .map_err(|err| PaygateError::LedgerUnavailable(err.to_string()))?;
        spent.map_err(PaygateError::from_ledger)
    }
    .await;

    if caller.send(outcome).is_err() {
        #[cfg(feature = "telemetry")]
        tracing::debug!("request went away before redemption finished");
    }
}

/// Verifies then invalidates, unless the request has been abandoned in between.
async fn spend<L: Ledger>(
    ledger: &L,
    proofs: &[Proof],
    caller: &oneshot::Sender<Result<(), PaygateError>>,
) -> Result<(), L::Error> {
    if caller.is_closed() {
        return Ok(());
    }
    ledger.verify(proofs).await?;
    if caller.is_closed() {
        return Ok(());
    }
    ledger.invalidate(proofs).await
}
