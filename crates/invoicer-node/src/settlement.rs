//! Settlement of incoming payment attempts.
//!
//! An attempt moves through `received -> validating -> awaiting hook ->
//! fulfilled | failed`, and its [`HtlcHandle`] is resolved at most once. Every
//! rejection is a normal [`SettlementOutcome::Failed`] carrying a BOLT4
//! failure code. Only protocol violations surface as [`FatalError`].
//!
//! The handle is one half of a one-shot channel whose other half,
//! [`HtlcOwner`], belongs to the channel layer. When the owner goes away (the
//! peer disconnected) the handle reports itself invalidated and the attempt
//! ends quietly without touching the invoice.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::instrument;

use invoicer_types::amount::AmountMsat;
use invoicer_types::collaborator::{
    GossipError, HookReplyError, InvoicePayment, PaymentHook, SignerError,
};
use invoicer_types::failure::FailureCode;
use invoicer_types::hash::{PaymentHash, Preimage};
use invoicer_types::invoice::Label;
use invoicer_types::proto::HtlcResolution;
use invoicer_types::store::StoreError;

use crate::registry::InvoiceRegistry;

/// Capacity of the payment notification channel; slow subscribers lag.
const NOTIFICATION_CAPACITY: usize = 256;

/// Conditions under which continuing would risk protocol-incorrect behaviour.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error(transparent)]
    HookReply(#[from] HookReplyError),
    #[error("invoice store failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gossip(GossipError),
    #[error(transparent)]
    Signer(SignerError),
}

/// The settling side of an in-flight HTLC.
#[derive(Debug)]
pub struct HtlcHandle {
    resolver: oneshot::Sender<HtlcResolution>,
}

/// The channel-layer side of an in-flight HTLC. Dropping it invalidates the handle.
#[derive(Debug)]
pub struct HtlcOwner {
    resolution: oneshot::Receiver<HtlcResolution>,
}

pub fn htlc_channel() -> (HtlcHandle, HtlcOwner) {
    let (resolver, resolution) = oneshot::channel();
    (HtlcHandle { resolver }, HtlcOwner { resolution })
}

impl HtlcHandle {
    pub fn is_invalidated(&self) -> bool {
        self.resolver.is_closed()
    }

    fn resolve(self, resolution: HtlcResolution) {
        // The owner may have left after the check; nothing to do then.
        let _ = self.resolver.send(resolution);
    }
}

impl HtlcOwner {
    /// Waits for the attempt to resolve. `None` if it ended without a resolution.
    pub async fn resolution(self) -> Option<HtlcResolution> {
        self.resolution.await.ok()
    }
}

/// An HTLC offered to us, paying `amount` against `payment_hash`.
#[derive(Debug)]
pub struct IncomingHtlc {
    pub payment_hash: PaymentHash,
    pub amount: AmountMsat,
    pub handle: HtlcHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Fulfilled(Preimage),
    Failed(FailureCode),
    /// The HTLC went away while the hook was deciding.
    Abandoned,
}

/// Published for every payment attempt that reaches the hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaymentNotification {
    pub label: Label,
    pub preimage: Preimage,
    pub msat: AmountMsat,
}

#[derive(Clone)]
pub struct Settlement {
    registry: Arc<InvoiceRegistry>,
    hook: Arc<dyn PaymentHook>,
    notifications: broadcast::Sender<InvoicePaymentNotification>,
}

impl Settlement {
    pub fn new(registry: Arc<InvoiceRegistry>, hook: Arc<dyn PaymentHook>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            registry,
            hook,
            notifications,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvoicePaymentNotification> {
        self.notifications.subscribe()
    }

    /// Runs one payment attempt to completion and resolves its handle.
    #[instrument(skip_all, fields(payment_hash = %htlc.payment_hash, amount = %htlc.amount))]
    pub async fn try_pay(&self, htlc: IncomingHtlc) -> Result<SettlementOutcome, FatalError> {
        let IncomingHtlc {
            payment_hash,
            amount,
            handle,
        } = htlc;
        let unknown = SettlementOutcome::Failed(FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS);

        let Some(invoice) = self.registry.find_unpaid(&payment_hash)? else {
            tracing::debug!("no unpaid invoice for payment hash");
            return Ok(finish(handle, unknown));
        };

        if let Some(requested) = invoice.amount {
            if amount < requested {
                tracing::debug!(%requested, "attempt pays less than requested");
                return Ok(finish(handle, unknown));
            }
            // Doubling past u64 disables the guard rather than rejecting.
            if requested.checked_mul(2).is_some_and(|twice| amount > twice) {
                tracing::debug!(%requested, "attempt pays more than twice the request");
                return Ok(finish(handle, unknown));
            }
        }

        let payment = InvoicePayment {
            label: invoice.label.clone(),
            preimage: invoice.preimage,
            msat: amount,
        };
        let _ = self.notifications.send(InvoicePaymentNotification {
            label: payment.label.clone(),
            preimage: payment.preimage,
            msat: payment.msat,
        });

        let reply = self.hook.invoice_payment(&payment).await;

        if handle.is_invalidated() {
            tracing::debug!(label = %invoice.label, "HTLC gone while waiting for payment hook");
            return Ok(SettlementOutcome::Abandoned);
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(error = %error, label = %invoice.label, "payment hook failed");
                return Ok(finish(
                    handle,
                    SettlementOutcome::Failed(FailureCode::TEMPORARY_NODE_FAILURE),
                ));
            }
        };

        if self.registry.find_unpaid(&payment_hash)?.is_none() {
            tracing::debug!(label = %invoice.label, "invoice no longer unpaid after hook");
            return Ok(finish(handle, unknown));
        }

        if let Some(code) = reply.failure_code()? {
            tracing::debug!(
                label = %invoice.label,
                failure_code = %code,
                "payment hook rejected payment"
            );
            return Ok(finish(handle, SettlementOutcome::Failed(code)));
        }

        match self.registry.settle_unpaid(&payment_hash, amount)? {
            Some(paid) => {
                tracing::info!(
                    label = %paid.label,
                    pay_index = paid.pay_index(),
                    "invoice paid"
                );
                Ok(finish(handle, SettlementOutcome::Fulfilled(paid.preimage)))
            }
            None => Ok(finish(handle, unknown)),
        }
    }
}

fn finish(handle: HtlcHandle, outcome: SettlementOutcome) -> SettlementOutcome {
    match outcome {
        SettlementOutcome::Fulfilled(payment_preimage) => {
            handle.resolve(HtlcResolution::Fulfill { payment_preimage })
        }
        SettlementOutcome::Failed(failure_code) => {
            handle.resolve(HtlcResolution::Fail { failure_code })
        }
        SettlementOutcome::Abandoned => {}
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::NoHook;
    use crate::store::MemoryInvoiceStore;
    use async_trait::async_trait;
    use invoicer_types::collaborator::{HookError, HookReply};
    use invoicer_types::invoice::{InvoiceDetails, InvoiceState, NewInvoice};
    use invoicer_types::timestamp::UnixTimestamp;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const PREIMAGE: [u8; 32] = [7; 32];

    fn setup(hook: Arc<dyn PaymentHook>) -> (Arc<InvoiceRegistry>, Settlement, InvoiceDetails) {
        setup_for(hook, Some(AmountMsat::from_msat(1000)))
    }

    fn setup_for(
        hook: Arc<dyn PaymentHook>,
        amount: Option<AmountMsat>,
    ) -> (Arc<InvoiceRegistry>, Settlement, InvoiceDetails) {
        let registry = Arc::new(InvoiceRegistry::new(Arc::new(MemoryInvoiceStore::new())).unwrap());
        let invoice = registry
            .create(NewInvoice {
                label: Label::new("coffee").unwrap(),
                amount,
                description: Some("one coffee".to_string()),
                bolt11: String::new(),
                preimage: Preimage::from_byte_array(PREIMAGE),
                created_at: UnixTimestamp::now(),
                expiry_secs: 3600,
            })
            .unwrap();
        let settlement = Settlement::new(registry.clone(), hook);
        (registry, settlement, invoice)
    }

    async fn pay(
        settlement: &Settlement,
        hash: PaymentHash,
        msat: u64,
    ) -> (SettlementOutcome, Option<HtlcResolution>) {
        let (handle, owner) = htlc_channel();
        let outcome = settlement
            .try_pay(IncomingHtlc {
                payment_hash: hash,
                amount: AmountMsat::from_msat(msat),
                handle,
            })
            .await
            .unwrap();
        (outcome, owner.resolution().await)
    }

    struct ReplyHook(Mutex<Vec<InvoicePayment>>, serde_json::Value);

    #[async_trait]
    impl PaymentHook for ReplyHook {
        async fn invoice_payment(&self, payment: &InvoicePayment) -> Result<HookReply, HookError> {
            self.0.lock().unwrap().push(payment.clone());
            Ok(HookReply::Reply(self.1.clone()))
        }
    }

    #[tokio::test]
    async fn amount_boundaries() {
        let unknown = SettlementOutcome::Failed(FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS);
        let (_, settlement, invoice) = setup(Arc::new(NoHook));
        assert_eq!(pay(&settlement, invoice.payment_hash, 999).await.0, unknown);
        assert_eq!(pay(&settlement, invoice.payment_hash, 2001).await.0, unknown);
        let (outcome, resolution) = pay(&settlement, invoice.payment_hash, 2000).await;
        assert_eq!(outcome, SettlementOutcome::Fulfilled(invoice.preimage));
        assert_eq!(
            resolution,
            Some(HtlcResolution::Fulfill {
                payment_preimage: invoice.preimage
            })
        );
    }

    #[tokio::test]
    async fn overpayment_guard_off_when_doubling_overflows() {
        let requested = AmountMsat::from_msat(u64::MAX / 2 + 1);
        let (_, settlement, invoice) = setup_for(Arc::new(NoHook), Some(requested));
        let (outcome, _) = pay(&settlement, invoice.payment_hash, u64::MAX).await;
        assert_eq!(outcome, SettlementOutcome::Fulfilled(invoice.preimage));
    }

    #[tokio::test]
    async fn any_amount_invoice_accepts_every_amount() {
        for msat in [1, u64::MAX] {
            let (registry, settlement, invoice) = setup_for(Arc::new(NoHook), None);
            let (outcome, _) = pay(&settlement, invoice.payment_hash, msat).await;
            assert_eq!(outcome, SettlementOutcome::Fulfilled(invoice.preimage));
            let paid = registry.find_by_label("coffee").unwrap().unwrap();
            assert!(matches!(
                paid.state,
                InvoiceState::Paid { received, .. } if received == AmountMsat::from_msat(msat)
            ));
        }
    }

    #[tokio::test]
    async fn unknown_hash_fails_with_unknown_details() {
        let (_, settlement, _) = setup(Arc::new(NoHook));
        let unknown_hash = PaymentHash::from_byte_array([9; 32]);
        let (outcome, resolution) = pay(&settlement, unknown_hash, 1000).await;
        assert_eq!(
            outcome,
            SettlementOutcome::Failed(FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS)
        );
        assert_eq!(
            resolution,
            Some(HtlcResolution::Fail {
                failure_code: FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS
            })
        );
    }

    #[tokio::test]
    async fn second_attempt_on_paid_invoice_fails() {
        let (registry, settlement, invoice) = setup(Arc::new(NoHook));
        assert!(matches!(
            pay(&settlement, invoice.payment_hash, 1000).await.0,
            SettlementOutcome::Fulfilled(_)
        ));
        assert_eq!(
            pay(&settlement, invoice.payment_hash, 1000).await.0,
            SettlementOutcome::Failed(FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS)
        );
        let paid = registry.find_by_label("coffee").unwrap().unwrap();
        assert_eq!(paid.pay_index(), Some(1));
    }

    #[tokio::test]
    async fn hook_sees_payment_and_notification_is_published() {
        let hook = Arc::new(ReplyHook(Mutex::default(), json!({"result": "continue"})));
        let (_, settlement, invoice) = setup(hook.clone());
        let mut notifications = settlement.subscribe();
        let (outcome, _) = pay(&settlement, invoice.payment_hash, 1500).await;
        assert_eq!(outcome, SettlementOutcome::Fulfilled(invoice.preimage));

        let seen = hook.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].msat, AmountMsat::from_msat(1500));
        assert_eq!(seen[0].label.as_str(), "coffee");

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.preimage, invoice.preimage);
        assert_eq!(notification.msat, AmountMsat::from_msat(1500));
    }

    #[tokio::test]
    async fn hook_failure_code_fails_attempt_and_leaves_invoice_unpaid() {
        let hook = Arc::new(ReplyHook(Mutex::default(), json!({"failure_code": 0x2002})));
        let (registry, settlement, invoice) = setup(hook);
        let (outcome, resolution) = pay(&settlement, invoice.payment_hash, 1000).await;
        assert_eq!(outcome, SettlementOutcome::Failed(FailureCode::from_u16(0x2002)));
        assert_eq!(
            resolution,
            Some(HtlcResolution::Fail {
                failure_code: FailureCode::from_u16(0x2002)
            })
        );
        assert!(!registry.find_by_label("coffee").unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn update_failure_code_is_fatal() {
        let hook = Arc::new(ReplyHook(Mutex::default(), json!({"failure_code": 0x1007})));
        let (_, settlement, invoice) = setup(hook);
        let (handle, _owner) = htlc_channel();
        let result = settlement
            .try_pay(IncomingHtlc {
                payment_hash: invoice.payment_hash,
                amount: AmountMsat::from_msat(1000),
                handle,
            })
            .await;
        assert!(matches!(
            result,
            Err(FatalError::HookReply(HookReplyError::UpdateFailureCode(_)))
        ));
    }

    /// Holds the payment until released, so the test can act in between.
    struct GateHook(Notify, Notify);

    #[async_trait]
    impl PaymentHook for GateHook {
        async fn invoice_payment(&self, _: &InvoicePayment) -> Result<HookReply, HookError> {
            self.0.notify_one();
            self.1.notified().await;
            Ok(HookReply::Unregistered)
        }
    }

    #[tokio::test]
    async fn disconnect_while_waiting_abandons_attempt() {
        let hook = Arc::new(GateHook(Notify::new(), Notify::new()));
        let (registry, settlement, invoice) = setup(hook.clone());
        let (handle, owner) = htlc_channel();
        let payment_hash = invoice.payment_hash;
        let attempt = tokio::spawn(async move {
            settlement
                .try_pay(IncomingHtlc {
                    payment_hash,
                    amount: AmountMsat::from_msat(1000),
                    handle,
                })
                .await
        });
        hook.0.notified().await;
        drop(owner);
        hook.1.notify_one();
        assert_eq!(attempt.await.unwrap().unwrap(), SettlementOutcome::Abandoned);
        assert!(!registry.find_by_label("coffee").unwrap().unwrap().is_paid());
    }

    #[tokio::test]
    async fn deleted_while_waiting_fails_attempt() {
        let hook = Arc::new(GateHook(Notify::new(), Notify::new()));
        let (registry, settlement, invoice) = setup(hook.clone());
        let (handle, owner) = htlc_channel();
        let payment_hash = invoice.payment_hash;
        let attempt = tokio::spawn(async move {
            settlement
                .try_pay(IncomingHtlc {
                    payment_hash,
                    amount: AmountMsat::from_msat(1000),
                    handle,
                })
                .await
        });
        hook.0.notified().await;
        registry
            .delete_if_status("coffee", "unpaid", UnixTimestamp::now())
            .unwrap();
        hook.1.notify_one();
        assert_eq!(
            attempt.await.unwrap().unwrap(),
            SettlementOutcome::Failed(FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS)
        );
        assert_eq!(
            owner.resolution().await,
            Some(HtlcResolution::Fail {
                failure_code: FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS
            })
        );
    }
}
