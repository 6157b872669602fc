//! Persistence contract for invoices.
//!
//! The store is the single source of truth for invoice state. Implementations
//! must make each call atomic on its own; callers that need a check-then-act
//! sequence (such as "still unpaid? then resolve") serialize those calls
//! themselves.

use crate::amount::AmountMsat;
use crate::hash::PaymentHash;
use crate::invoice::{InvoiceDetails, InvoiceId, InvoiceState, Label, NewInvoice};
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate label '{0}'")]
    DuplicateLabel(Label),
    #[error("preimage already used")]
    DuplicateHash(PaymentHash),
    #[error("invoice {0:?} not found")]
    NotFound(InvoiceId),
    #[error("invoice {0:?} is not unpaid")]
    NotUnpaid(InvoiceId),
    #[error("invoice {0:?} changed state")]
    StateChanged(InvoiceId),
    #[error("Database error: {0}")]
    Backend(String),
}

/// Atomic create/read/update/delete of invoice records, keyed by id, label and hash.
pub trait InvoiceStore: Send + Sync {
    /// Persists a new unpaid invoice, rejecting a duplicate label or payment hash.
    fn create(&self, invoice: NewInvoice) -> Result<InvoiceDetails, StoreError>;

    fn details(&self, id: InvoiceId) -> Result<Option<InvoiceDetails>, StoreError>;

    fn find_by_label(&self, label: &str) -> Result<Option<InvoiceDetails>, StoreError>;

    /// Any invoice with this hash, regardless of state.
    fn find_by_hash(&self, hash: &PaymentHash) -> Result<Option<InvoiceDetails>, StoreError>;

    /// The invoice with this hash, only if it is unpaid and unexpired at `now`.
    fn find_unpaid(
        &self,
        hash: &PaymentHash,
        now: UnixTimestamp,
    ) -> Result<Option<InvoiceDetails>, StoreError> {
        let found = self.find_by_hash(hash)?;
        Ok(found.filter(|inv| inv.state == InvoiceState::Unpaid && now < inv.expires_at))
    }

    /// Restartable iteration in id order: the first invoice with id greater than `after`.
    fn iterate(&self, after: Option<InvoiceId>) -> Result<Option<InvoiceDetails>, StoreError>;

    /// Marks an unpaid invoice paid. Fails with [`StoreError::NotUnpaid`] otherwise.
    fn resolve(
        &self,
        id: InvoiceId,
        received: AmountMsat,
        pay_index: u64,
        paid_at: UnixTimestamp,
    ) -> Result<InvoiceDetails, StoreError>;

    /// Removes an invoice if its stored state still equals `state`, and
    /// returns what was removed. Fails with [`StoreError::StateChanged`] otherwise.
    fn delete_if_state(
        &self,
        id: InvoiceId,
        state: &InvoiceState,
    ) -> Result<InvoiceDetails, StoreError>;

    /// Removes every unpaid invoice with `expires_at <= cutoff`.
    fn delete_expired(&self, cutoff: UnixTimestamp) -> Result<Vec<InvoiceDetails>, StoreError>;

    /// The paid invoice with the smallest pay index greater than `pay_index`.
    fn first_paid_after(&self, pay_index: u64) -> Result<Option<InvoiceDetails>, StoreError>;

    /// Highest pay index ever passed to [`resolve`](Self::resolve), including
    /// those of invoices deleted since. Zero if nothing was paid yet.
    fn last_pay_index(&self) -> Result<u64, StoreError>;
}
