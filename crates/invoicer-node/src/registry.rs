//! Invoice lifecycle on top of an [`InvoiceStore`], plus the waiters that
//! block until an invoice is paid or removed.
//!
//! All mutating calls run under one lock, which also guards the waiter lists.
//! That lock is the mutual-exclusion boundary for the check-then-act steps:
//! [`InvoiceRegistry::settle_unpaid`] ("still unpaid? then resolve") and
//! [`InvoiceRegistry::delete_if_status`] ("still in that status? then delete")
//! run without letting any other writer of this registry in between.
//!
//! Waiters are one-shot channels. A waiter on a single invoice receives
//! `Some(paid)` when it is resolved and `None` when it is deleted. A waiter on
//! "any invoice" receives the first invoice resolved with a pay index above
//! its cursor. Each sender is drained exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use invoicer_types::amount::AmountMsat;
use invoicer_types::hash::PaymentHash;
use invoicer_types::invoice::{InvoiceDetails, InvoiceId, InvoiceStatus, NewInvoice};
use invoicer_types::store::{InvoiceStore, StoreError};
use invoicer_types::timestamp::UnixTimestamp;

/// Global settlement counter. Indices handed out by [`PayIndex::next`] strictly increase.
#[derive(Debug)]
pub struct PayIndex(AtomicU64);

impl PayIndex {
    fn starting_after(last: u64) -> Self {
        Self(AtomicU64::new(last))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// What [`InvoiceRegistry::delete_if_status`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    Deleted(InvoiceDetails),
    Unknown,
    StatusMismatch(InvoiceStatus),
}

/// How a wait on a single invoice ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Paid(InvoiceDetails),
    Expired(InvoiceDetails),
    Deleted,
}

#[derive(Default)]
struct Waiters {
    by_invoice: HashMap<InvoiceId, Vec<oneshot::Sender<Option<InvoiceDetails>>>>,
    any: Vec<(u64, oneshot::Sender<InvoiceDetails>)>,
}

impl Waiters {
    fn paid(&mut self, invoice: &InvoiceDetails) {
        for waiter in self.by_invoice.remove(&invoice.id).unwrap_or_default() {
            let _ = waiter.send(Some(invoice.clone()));
        }
        let Some(pay_index) = invoice.pay_index() else {
            return;
        };
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.any)
            .into_iter()
            .partition(|(cursor, _)| *cursor < pay_index);
        self.any = pending;
        for (_, waiter) in ready {
            let _ = waiter.send(invoice.clone());
        }
    }

    fn deleted(&mut self, id: InvoiceId) {
        for waiter in self.by_invoice.remove(&id).unwrap_or_default() {
            let _ = waiter.send(None);
        }
    }
}

pub struct InvoiceRegistry {
    store: Arc<dyn InvoiceStore>,
    pay_index: PayIndex,
    waiters: Mutex<Waiters>,
}

impl InvoiceRegistry {
    /// Wraps `store`, resuming the pay index after the last one it assigned.
    pub fn new(store: Arc<dyn InvoiceStore>) -> Result<Self, StoreError> {
        let last = store.last_pay_index()?;
        Ok(Self {
            store,
            pay_index: PayIndex::starting_after(last),
            waiters: Mutex::new(Waiters::default()),
        })
    }

    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, invoice: NewInvoice) -> Result<InvoiceDetails, StoreError> {
        let _guard = self.waiters();
        self.store.create(invoice)
    }

    pub fn details(&self, id: InvoiceId) -> Result<Option<InvoiceDetails>, StoreError> {
        self.store.details(id)
    }

    pub fn find_by_label(&self, label: &str) -> Result<Option<InvoiceDetails>, StoreError> {
        self.store.find_by_label(label)
    }

    pub fn find_by_hash(&self, hash: &PaymentHash) -> Result<Option<InvoiceDetails>, StoreError> {
        self.store.find_by_hash(hash)
    }

    /// The invoice with this hash if it can still be paid right now.
    pub fn find_unpaid(&self, hash: &PaymentHash) -> Result<Option<InvoiceDetails>, StoreError> {
        self.store.find_unpaid(hash, UnixTimestamp::now())
    }

    /// Every stored invoice, in creation order.
    pub fn list(&self) -> Result<Vec<InvoiceDetails>, StoreError> {
        let mut invoices = Vec::new();
        let mut cursor = None;
        while let Some(invoice) = self.store.iterate(cursor)? {
            cursor = Some(invoice.id);
            invoices.push(invoice);
        }
        Ok(invoices)
    }

    /// Marks an unpaid invoice paid with the next pay index and wakes its waiters.
    pub fn resolve(
        &self,
        id: InvoiceId,
        received: AmountMsat,
    ) -> Result<InvoiceDetails, StoreError> {
        let mut waiters = self.waiters();
        self.resolve_locked(&mut waiters, id, received)
    }

    fn resolve_locked(
        &self,
        waiters: &mut Waiters,
        id: InvoiceId,
        received: AmountMsat,
    ) -> Result<InvoiceDetails, StoreError> {
        let pay_index = self.pay_index.next();
        let paid = self
            .store
            .resolve(id, received, pay_index, UnixTimestamp::now())?;
        waiters.paid(&paid);
        Ok(paid)
    }

    /// Re-checks that the invoice for `hash` is unpaid and resolves it, as one step.
    ///
    /// Returns `None` when the invoice is gone, paid, or expired.
    pub fn settle_unpaid(
        &self,
        hash: &PaymentHash,
        received: AmountMsat,
    ) -> Result<Option<InvoiceDetails>, StoreError> {
        let mut waiters = self.waiters();
        match self.store.find_unpaid(hash, UnixTimestamp::now())? {
            Some(invoice) => self
                .resolve_locked(&mut waiters, invoice.id, received)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Deletes the labelled invoice if its status at `now` is `expected`.
    /// Pending waiters learn of the deletion.
    ///
    /// The store only removes the record it checked: if the record changed in
    /// between, the check runs again on the new state.
    pub fn delete_if_status(
        &self,
        label: &str,
        expected: &str,
        now: UnixTimestamp,
    ) -> Result<Deletion, StoreError> {
        let mut waiters = self.waiters();
        loop {
            let Some(invoice) = self.store.find_by_label(label)? else {
                return Ok(Deletion::Unknown);
            };
            let status = invoice.status(now);
            if status.as_str() != expected {
                return Ok(Deletion::StatusMismatch(status));
            }
            match self.store.delete_if_state(invoice.id, &invoice.state) {
                Ok(deleted) => {
                    waiters.deleted(deleted.id);
                    return Ok(Deletion::Deleted(deleted));
                }
                Err(StoreError::StateChanged(_) | StoreError::NotFound(_)) => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Deletes every unpaid invoice that expired at or before `cutoff`.
    pub fn delete_expired(&self, cutoff: UnixTimestamp) -> Result<Vec<InvoiceDetails>, StoreError> {
        let mut waiters = self.waiters();
        let deleted = self.store.delete_expired(cutoff)?;
        for invoice in &deleted {
            waiters.deleted(invoice.id);
        }
        Ok(deleted)
    }

    /// Waits until the invoice is paid, expires, or is deleted.
    ///
    /// Returns at once when the invoice is already paid or expired.
    pub async fn wait_one(&self, id: InvoiceId) -> Result<WaitOutcome, StoreError> {
        loop {
            let (notified, expires_at) = {
                let mut waiters = self.waiters();
                let Some(invoice) = self.store.details(id)? else {
                    return Ok(WaitOutcome::Deleted);
                };
                match invoice.status(UnixTimestamp::now()) {
                    InvoiceStatus::Paid => return Ok(WaitOutcome::Paid(invoice)),
                    InvoiceStatus::Expired => return Ok(WaitOutcome::Expired(invoice)),
                    InvoiceStatus::Unpaid => {}
                }
                let (tx, rx) = oneshot::channel();
                let pending = waiters.by_invoice.entry(id).or_default();
                pending.retain(|waiter| !waiter.is_closed());
                pending.push(tx);
                (rx, invoice.expires_at)
            };

            let remaining = UnixTimestamp::now().secs_until(expires_at);
            tokio::select! {
                notified = notified => match notified {
                    Ok(Some(paid)) => return Ok(WaitOutcome::Paid(paid)),
                    Ok(None) => return Ok(WaitOutcome::Deleted),
                    Err(_) => continue,
                },
                // Expiry is not an event; look again once it should have passed.
                _ = tokio::time::sleep(Duration::from_secs(remaining)) => continue,
            }
        }
    }

    /// Waits for the first invoice paid with a pay index greater than `after`.
    pub async fn wait_any(&self, after: u64) -> Result<InvoiceDetails, StoreError> {
        let notified = {
            let mut waiters = self.waiters();
            if let Some(paid) = self.store.first_paid_after(after)? {
                return Ok(paid);
            }
            let (tx, rx) = oneshot::channel();
            waiters.any.retain(|(_, waiter)| !waiter.is_closed());
            waiters.any.push((after, tx));
            rx
        };
        notified
            .await
            .map_err(|_| StoreError::Backend("invoice registry shut down".to_string()))
    }
}
