//! In-memory [`InvoiceStore`].
//!
//! Every call takes the one internal lock, so each operation is atomic on its
//! own. Records are kept in id order, which makes [`InvoiceStore::iterate`] a
//! range lookup.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use invoicer_types::amount::AmountMsat;
use invoicer_types::hash::PaymentHash;
use invoicer_types::invoice::{InvoiceDetails, InvoiceId, InvoiceState, NewInvoice};
use invoicer_types::store::{InvoiceStore, StoreError};
use invoicer_types::timestamp::UnixTimestamp;

#[derive(Debug, Default)]
struct Records {
    next_id: u64,
    last_pay_index: u64,
    invoices: BTreeMap<InvoiceId, InvoiceDetails>,
}

impl Records {
    fn find(&self, mut predicate: impl FnMut(&InvoiceDetails) -> bool) -> Option<InvoiceDetails> {
        self.invoices.values().find(|inv| predicate(inv)).cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryInvoiceStore {
    records: Mutex<Records>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InvoiceStore for MemoryInvoiceStore {
    fn create(&self, invoice: NewInvoice) -> Result<InvoiceDetails, StoreError> {
        let mut records = self.records();
        let payment_hash = invoice.payment_hash();
        if records.invoices.values().any(|inv| inv.label == invoice.label) {
            return Err(StoreError::DuplicateLabel(invoice.label));
        }
        if records.invoices.values().any(|inv| inv.payment_hash == payment_hash) {
            return Err(StoreError::DuplicateHash(payment_hash));
        }
        records.next_id += 1;
        let id = InvoiceId::new(records.next_id);
        let details = InvoiceDetails {
            id,
            expires_at: invoice.expires_at(),
            label: invoice.label,
            bolt11: invoice.bolt11,
            payment_hash,
            preimage: invoice.preimage,
            amount: invoice.amount,
            description: invoice.description,
            created_at: invoice.created_at,
            state: InvoiceState::Unpaid,
        };
        records.invoices.insert(id, details.clone());
        Ok(details)
    }

    fn details(&self, id: InvoiceId) -> Result<Option<InvoiceDetails>, StoreError> {
        Ok(self.records().invoices.get(&id).cloned())
    }

    fn find_by_label(&self, label: &str) -> Result<Option<InvoiceDetails>, StoreError> {
        Ok(self.records().find(|inv| inv.label.as_str() == label))
    }

    fn find_by_hash(&self, hash: &PaymentHash) -> Result<Option<InvoiceDetails>, StoreError> {
        Ok(self.records().find(|inv| inv.payment_hash == *hash))
    }

    fn iterate(&self, after: Option<InvoiceId>) -> Result<Option<InvoiceDetails>, StoreError> {
        let records = self.records();
        let next = match after {
            Some(after) => records
                .invoices
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .next(),
            None => records.invoices.iter().next(),
        };
        Ok(next.map(|(_, inv)| inv.clone()))
    }

    fn resolve(
        &self,
        id: InvoiceId,
        received: AmountMsat,
        pay_index: u64,
        paid_at: UnixTimestamp,
    ) -> Result<InvoiceDetails, StoreError> {
        let mut records = self.records();
        let invoice = records
            .invoices
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if invoice.state != InvoiceState::Unpaid {
            return Err(StoreError::NotUnpaid(id));
        }
        invoice.state = InvoiceState::Paid {
            pay_index,
            received,
            paid_at,
        };
        let paid = invoice.clone();
        records.last_pay_index = records.last_pay_index.max(pay_index);
        Ok(paid)
    }

    fn delete_if_state(
        &self,
        id: InvoiceId,
        state: &InvoiceState,
    ) -> Result<InvoiceDetails, StoreError> {
        let mut records = self.records();
        let current = records.invoices.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.state != *state {
            return Err(StoreError::StateChanged(id));
        }
        records.invoices.remove(&id).ok_or(StoreError::NotFound(id))
    }

    fn delete_expired(&self, cutoff: UnixTimestamp) -> Result<Vec<InvoiceDetails>, StoreError> {
        let mut records = self.records();
        let expired: Vec<InvoiceId> = records
            .invoices
            .values()
            .filter(|inv| inv.state == InvoiceState::Unpaid && inv.expires_at <= cutoff)
            .map(|inv| inv.id)
            .collect();
        Ok(expired
            .into_iter()
            .filter_map(|id| records.invoices.remove(&id))
            .collect())
    }

    fn first_paid_after(&self, pay_index: u64) -> Result<Option<InvoiceDetails>, StoreError> {
        let records = self.records();
        Ok(records
            .invoices
            .values()
            .filter(|inv| inv.pay_index().is_some_and(|idx| idx > pay_index))
            .min_by_key(|inv| inv.pay_index())
            .cloned())
    }

    fn last_pay_index(&self) -> Result<u64, StoreError> {
        Ok(self.records().last_pay_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoicer_types::hash::Preimage;
    use invoicer_types::invoice::Label;

    fn new_invoice(label: &str, seed: u8, expiry_secs: u64) -> NewInvoice {
        NewInvoice {
            label: Label::new(label).unwrap(),
            amount: Some(AmountMsat::from_msat(1000)),
            description: Some("test".to_string()),
            bolt11: format!("lnbcrt{label}"),
            preimage: Preimage::from_byte_array([seed; 32]),
            created_at: UnixTimestamp::from_secs(1_000),
            expiry_secs,
        }
    }

    #[test]
    fn duplicate_label_and_hash_are_rejected() {
        let store = MemoryInvoiceStore::new();
        store.create(new_invoice("a", 1, 60)).unwrap();
        assert!(matches!(
            store.create(new_invoice("a", 2, 60)),
            Err(StoreError::DuplicateLabel(_))
        ));
        assert!(matches!(
            store.create(new_invoice("b", 1, 60)),
            Err(StoreError::DuplicateHash(_))
        ));
        assert!(store.find_by_label("b").unwrap().is_none());
        assert!(store.iterate(None).unwrap().is_some());
    }

    #[test]
    fn ids_increase_and_iteration_restarts() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        let b = store.create(new_invoice("b", 2, 60)).unwrap();
        assert!(a.id < b.id);
        assert_eq!(store.iterate(None).unwrap().unwrap().id, a.id);
        assert_eq!(store.iterate(Some(a.id)).unwrap().unwrap().id, b.id);
        assert!(store.iterate(Some(b.id)).unwrap().is_none());
    }

    #[test]
    fn resolve_only_once() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        let paid = store
            .resolve(a.id, AmountMsat::from_msat(1000), 1, UnixTimestamp::from_secs(1_010))
            .unwrap();
        assert_eq!(paid.pay_index(), Some(1));
        assert_eq!(
            store.resolve(a.id, AmountMsat::from_msat(1000), 2, UnixTimestamp::from_secs(1_011)),
            Err(StoreError::NotUnpaid(a.id))
        );
        assert_eq!(store.last_pay_index().unwrap(), 1);
    }

    #[test]
    fn deleting_paid_invoice_keeps_last_pay_index() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        let paid = store
            .resolve(a.id, AmountMsat::from_msat(1000), 7, UnixTimestamp::from_secs(1_010))
            .unwrap();
        store.delete_if_state(a.id, &paid.state).unwrap();
        assert!(store.details(a.id).unwrap().is_none());
        assert_eq!(store.last_pay_index().unwrap(), 7);
    }

    #[test]
    fn delete_if_state_refuses_changed_record() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        store
            .resolve(a.id, AmountMsat::from_msat(1000), 1, UnixTimestamp::from_secs(1_010))
            .unwrap();
        assert_eq!(
            store.delete_if_state(a.id, &InvoiceState::Unpaid),
            Err(StoreError::StateChanged(a.id))
        );
        assert!(store.details(a.id).unwrap().is_some());
    }

    #[test]
    fn find_unpaid_skips_paid_and_expired() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        let hash = a.payment_hash;
        assert!(store.find_unpaid(&hash, UnixTimestamp::from_secs(1_059)).unwrap().is_some());
        assert!(store.find_unpaid(&hash, UnixTimestamp::from_secs(1_060)).unwrap().is_none());
        store
            .resolve(a.id, AmountMsat::from_msat(1000), 1, UnixTimestamp::from_secs(1_010))
            .unwrap();
        assert!(store.find_unpaid(&hash, UnixTimestamp::from_secs(1_010)).unwrap().is_none());
    }

    #[test]
    fn delete_expired_keeps_paid_and_live() {
        let store = MemoryInvoiceStore::new();
        let short = store.create(new_invoice("short", 1, 10)).unwrap();
        let paid = store.create(new_invoice("paid", 2, 10)).unwrap();
        store.create(new_invoice("long", 3, 1_000)).unwrap();
        store
            .resolve(paid.id, AmountMsat::from_msat(1000), 1, UnixTimestamp::from_secs(1_005))
            .unwrap();

        let removed = store.delete_expired(UnixTimestamp::from_secs(1_010)).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, short.id);
        assert!(store.find_by_label("paid").unwrap().is_some());
        assert!(store.find_by_label("long").unwrap().is_some());
    }

    #[test]
    fn first_paid_after_orders_by_pay_index() {
        let store = MemoryInvoiceStore::new();
        let a = store.create(new_invoice("a", 1, 60)).unwrap();
        let b = store.create(new_invoice("b", 2, 60)).unwrap();
        let now = UnixTimestamp::from_secs(1_001);
        store.resolve(b.id, AmountMsat::from_msat(1), 1, now).unwrap();
        store.resolve(a.id, AmountMsat::from_msat(1), 2, now).unwrap();
        assert_eq!(store.first_paid_after(0).unwrap().unwrap().id, b.id);
        assert_eq!(store.first_paid_after(1).unwrap().unwrap().id, a.id);
        assert!(store.first_paid_after(2).unwrap().is_none());
    }
}
