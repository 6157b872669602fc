//! The invoice node: command operations over the registry, the selector,
//! the settlement pipeline and the external collaborators.
//!
//! Invoice creation runs as a sequence of stages, several of which suspend on
//! a collaborator:
//!
//! 1. validate parameters (pure, fails fast with `-32602`);
//! 2. derive the preimage, caller-supplied or random;
//! 3. ask gossip for candidate inbound channels;
//! 4. pick a routing hint;
//! 5. encode and sign the payment request;
//! 6. re-check for a hash collision that may have appeared meanwhile;
//! 7. persist, failing on a label collision;
//! 8. reply, warning when no routing hint could be found.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::instrument;

use invoicer_types::amount::AmountMsat;
use invoicer_types::bolt11::{self, Bolt11Error, UnsignedBolt11, parse_fallback};
use invoicer_types::collaborator::{
    ChannelGossip, GossipError, InvoiceSigner, PaymentHook, PeerDirectory, SignerError,
};
use invoicer_types::hash::Preimage;
use invoicer_types::invoice::{
    BOLT11_FIELD_BYTE_LIMIT, DEFAULT_EXPIRY_SECS, InvoiceSnapshot, Label, NewInvoice,
};
use invoicer_types::network::Network;
use invoicer_types::params::{ParamError, parse_amount_or_any, parse_preimage, parse_time};
use invoicer_types::route::NodeId;
use invoicer_types::proto::{
    DecodePayRequest, DecodePayResponse, DelExpiredInvoiceRequest, DelInvoiceRequest,
    InvoiceRequest, InvoiceResponse, ListInvoicesRequest, ListInvoicesResponse,
    WaitAnyInvoiceRequest, WaitInvoiceRequest, error_code,
};
use invoicer_types::store::{InvoiceStore, StoreError};
use invoicer_types::timestamp::UnixTimestamp;

use crate::registry::{Deletion, InvoiceRegistry, WaitOutcome};
use crate::selector::{Selection, select_inchan};
use crate::settlement::{
    FatalError, IncomingHtlc, InvoicePaymentNotification, Settlement, SettlementOutcome,
};

/// Amount used to score channels for an invoice without a fixed amount.
const ANY_AMOUNT_FLOOR: AmountMsat = AmountMsat::from_msat(1);

pub const WARNING_OFFLINE: &str =
    "No channel with a peer that is currently connected has sufficient incoming capacity";
pub const WARNING_CAPACITY: &str =
    "No channel with a peer that is not a dead end, has sufficient incoming capacity";

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub network: Network,
    /// `min_final_cltv_expiry` written into new invoices.
    pub cltv_final: u16,
    /// Whether requests may replace the selected routing hints.
    pub dev_routes: bool,
}

/// Everything the node talks to.
pub struct Collaborators {
    pub store: Arc<dyn InvoiceStore>,
    pub gossip: Arc<dyn ChannelGossip>,
    pub peers: Arc<dyn PeerDirectory>,
    pub signer: Arc<dyn InvoiceSigner>,
    pub hook: Arc<dyn PaymentHook>,
}

/// A failed command, carrying its numeric error code.
#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error(transparent)]
    InvalidParams(#[from] ParamError),
    #[error("Duplicate label '{0}'")]
    DuplicateLabel(Label),
    #[error("preimage already used")]
    DuplicatePreimage,
    #[error("Unknown invoice")]
    UnknownInvoice,
    #[error("Invoice status is {actual} not {expected}")]
    StatusMismatch { actual: String, expected: String },
    #[error("Label not found")]
    LabelNotFound,
    #[error("Invoice deleted during wait")]
    DeletedDuringWait,
    #[error("invoice expired during wait")]
    ExpiredDuringWait(Box<InvoiceSnapshot>),
    #[error("Invalid bolt11: {0}")]
    InvalidBolt11(Bolt11Error),
    #[error("Could not fetch incoming channels: {0}")]
    Gossip(GossipError),
    #[error("Could not sign invoice: {0}")]
    Signing(Bolt11Error),
    #[error("Database error: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl InvoiceError {
    pub fn code(&self) -> i32 {
        match self {
            InvoiceError::InvalidParams(_) => error_code::INVALID_PARAMS,
            InvoiceError::DuplicateLabel(_) => error_code::INVOICE_LABEL_ALREADY_EXISTS,
            InvoiceError::DuplicatePreimage => error_code::INVOICE_PREIMAGE_ALREADY_EXISTS,
            InvoiceError::ExpiredDuringWait(_) => error_code::INVOICE_EXPIRED_DURING_WAIT,
            InvoiceError::UnknownInvoice
            | InvoiceError::StatusMismatch { .. }
            | InvoiceError::LabelNotFound
            | InvoiceError::DeletedDuringWait
            | InvoiceError::InvalidBolt11(_)
            | InvoiceError::Gossip(_)
            | InvoiceError::Signing(_)
            | InvoiceError::Store(_)
            | InvoiceError::Fatal(_) => error_code::LIGHTNINGD,
        }
    }

    /// Structured detail attached to the error, if any.
    pub fn data(&self) -> Option<Value> {
        match self {
            InvoiceError::ExpiredDuringWait(snapshot) => serde_json::to_value(snapshot).ok(),
            _ => None,
        }
    }
}

impl From<StoreError> for InvoiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateLabel(label) => InvoiceError::DuplicateLabel(label),
            StoreError::DuplicateHash(_) => InvoiceError::DuplicatePreimage,
            other => InvoiceError::Store(other),
        }
    }
}

fn gossip_error(error: GossipError) -> InvoiceError {
    match error {
        GossipError::Malformed(_) => FatalError::Gossip(error).into(),
        GossipError::Unavailable(_) => InvoiceError::Gossip(error),
    }
}

fn signing_error(error: Bolt11Error) -> InvoiceError {
    match error {
        Bolt11Error::Signer(error @ SignerError::BadReply(_)) => FatalError::Signer(error).into(),
        other => InvoiceError::Signing(other),
    }
}

pub struct InvoiceNode {
    registry: Arc<InvoiceRegistry>,
    settlement: Settlement,
    gossip: Arc<dyn ChannelGossip>,
    peers: Arc<dyn PeerDirectory>,
    signer: Arc<dyn InvoiceSigner>,
    settings: NodeSettings,
}

impl InvoiceNode {
    pub fn new(collaborators: Collaborators, settings: NodeSettings) -> Result<Self, StoreError> {
        let Collaborators {
            store,
            gossip,
            peers,
            signer,
            hook,
        } = collaborators;
        let registry = Arc::new(InvoiceRegistry::new(store)?);
        let settlement = Settlement::new(registry.clone(), hook);
        Ok(Self {
            registry,
            settlement,
            gossip,
            peers,
            signer,
            settings,
        })
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// The payee id written into our invoices.
    pub fn node_id(&self) -> NodeId {
        self.signer.node_id()
    }

    pub fn registry(&self) -> &Arc<InvoiceRegistry> {
        &self.registry
    }

    /// Stream of payment attempts that reached the payment hook.
    pub fn subscribe_payments(&self) -> broadcast::Receiver<InvoicePaymentNotification> {
        self.settlement.subscribe()
    }

    /// Settles an incoming HTLC against our invoices.
    pub async fn try_pay(&self, htlc: IncomingHtlc) -> Result<SettlementOutcome, FatalError> {
        self.settlement.try_pay(htlc).await
    }

    /// `invoice`: creates a new invoice and its signed payment request.
    #[instrument(skip_all, fields(label = %request.label))]
    pub async fn invoice(&self, request: InvoiceRequest) -> Result<InvoiceResponse, InvoiceError> {
        let network = self.settings.network;
        let amount = parse_amount_or_any("msatoshi", &request.msatoshi)?.amount();
        let label = Label::new(request.label)?;
        let description = request.description;
        if description.len() >= BOLT11_FIELD_BYTE_LIMIT {
            return Err(ParamError::new(format!(
                "Descriptions greater than {BOLT11_FIELD_BYTE_LIMIT} bytes not yet supported (description length {})",
                description.len()
            ))
            .into());
        }
        if let Some(amount) = amount {
            let max = network.max_payment();
            if amount > max {
                return Err(ParamError::new(format!("msatoshi cannot exceed {max}")).into());
            }
        }
        let expiry = match &request.expiry {
            Some(expiry) => parse_time("expiry", expiry)?,
            None => DEFAULT_EXPIRY_SECS,
        };
        let fallbacks = request
            .fallbacks
            .unwrap_or_default()
            .iter()
            .map(|address| parse_fallback(address, network))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ParamError::new(e.to_string()))?;
        let preimage = match &request.preimage {
            Some(preimage) => parse_preimage(preimage)?,
            None => Preimage::from_byte_array(rand::random()),
        };
        let payment_hash = preimage.payment_hash();

        let (routes, any_offline) = match request.dev_routes {
            Some(routes) if self.settings.dev_routes => (routes, false),
            Some(_) => {
                return Err(ParamError::new("dev_routes is not enabled on this node").into());
            }
            None => {
                let candidates = self
                    .gossip
                    .incoming_channels(request.exposeprivatechannels)
                    .await
                    .map_err(gossip_error)?;
                let Selection { hint, any_offline } = select_inchan(
                    self.peers.as_ref(),
                    amount.unwrap_or(ANY_AMOUNT_FLOOR),
                    &candidates,
                    &mut rand::rng(),
                );
                (hint.map(|h| vec![vec![h]]).unwrap_or_default(), any_offline)
            }
        };
        let hinted = !routes.is_empty();

        let created_at = UnixTimestamp::now();
        let unsigned = UnsignedBolt11 {
            network,
            amount,
            timestamp: created_at,
            payment_hash,
            payment_secret: rand::random(),
            description: description.clone(),
            expiry,
            min_final_cltv_expiry: u64::from(self.settings.cltv_final),
            fallbacks,
            routes,
        };
        let (bolt11, _) = unsigned
            .sign(self.signer.as_ref())
            .await
            .map_err(signing_error)?;

        if self.registry.find_by_hash(&payment_hash)?.is_some() {
            return Err(InvoiceError::DuplicatePreimage);
        }
        let invoice = self.registry.create(NewInvoice {
            label,
            amount,
            description: Some(description),
            bolt11: bolt11.clone(),
            preimage,
            created_at,
            expiry_secs: expiry,
        })?;
        tracing::info!(id = invoice.id.as_u64(), "invoice created");

        let mut response = InvoiceResponse {
            payment_hash,
            expires_at: invoice.expires_at,
            bolt11,
            warning_offline: None,
            warning_capacity: None,
        };
        if !hinted {
            let shown = amount.map(|a| a.to_string()).unwrap_or_else(|| "any".to_string());
            if any_offline {
                tracing::warn!(
                    "invoice: insufficient incoming capacity for {shown} (among currently connected peers)"
                );
                response.warning_offline = Some(WARNING_OFFLINE.to_string());
            } else {
                tracing::warn!("invoice: insufficient incoming capacity for {shown}");
                response.warning_capacity = Some(WARNING_CAPACITY.to_string());
            }
        }
        Ok(response)
    }

    /// `listinvoices`: one invoice by label, or all of them.
    pub fn listinvoices(
        &self,
        request: ListInvoicesRequest,
    ) -> Result<ListInvoicesResponse, InvoiceError> {
        let now = UnixTimestamp::now();
        let invoices = match request.label {
            Some(label) => self.registry.find_by_label(&label)?.into_iter().collect(),
            None => self.registry.list()?,
        };
        Ok(ListInvoicesResponse {
            invoices: invoices.iter().map(|inv| inv.snapshot(now)).collect(),
        })
    }

    /// `delinvoice`: deletes an invoice if it is in the expected status.
    #[instrument(skip_all, fields(label = %request.label))]
    pub fn delinvoice(&self, request: DelInvoiceRequest) -> Result<InvoiceSnapshot, InvoiceError> {
        let now = UnixTimestamp::now();
        let deletion = self
            .registry
            .delete_if_status(&request.label, &request.status, now)
            .map_err(|error| {
                tracing::error!(error = %error, "error attempting to remove invoice");
                InvoiceError::Store(error)
            })?;
        match deletion {
            Deletion::Deleted(invoice) => Ok(invoice.snapshot(now)),
            Deletion::Unknown => Err(InvoiceError::UnknownInvoice),
            Deletion::StatusMismatch(actual) => Err(InvoiceError::StatusMismatch {
                actual: actual.to_string(),
                expected: request.status,
            }),
        }
    }

    /// `delexpiredinvoice`: deletes unpaid invoices expired by `maxexpirytime` (default now).
    pub fn delexpiredinvoice(
        &self,
        request: DelExpiredInvoiceRequest,
    ) -> Result<usize, InvoiceError> {
        let cutoff = request.maxexpirytime.unwrap_or_else(UnixTimestamp::now);
        let deleted = self.registry.delete_expired(cutoff)?;
        tracing::debug!(count = deleted.len(), %cutoff, "deleted expired invoices");
        Ok(deleted.len())
    }

    /// `waitinvoice`: waits until the labelled invoice is paid or expires.
    #[instrument(skip_all, fields(label = %request.label))]
    pub async fn waitinvoice(
        &self,
        request: WaitInvoiceRequest,
    ) -> Result<InvoiceSnapshot, InvoiceError> {
        let invoice = self
            .registry
            .find_by_label(&request.label)?
            .ok_or(InvoiceError::LabelNotFound)?;
        match self.registry.wait_one(invoice.id).await? {
            WaitOutcome::Paid(paid) => Ok(paid.snapshot(UnixTimestamp::now())),
            WaitOutcome::Expired(expired) => Err(InvoiceError::ExpiredDuringWait(Box::new(
                expired.snapshot(UnixTimestamp::now()),
            ))),
            WaitOutcome::Deleted => Err(InvoiceError::DeletedDuringWait),
        }
    }

    /// `waitanyinvoice`: waits for the next invoice paid after `lastpay_index`.
    #[instrument(skip_all, fields(lastpay_index = request.lastpay_index))]
    pub async fn waitanyinvoice(
        &self,
        request: WaitAnyInvoiceRequest,
    ) -> Result<InvoiceSnapshot, InvoiceError> {
        let paid = self
            .registry
            .wait_any(request.lastpay_index.unwrap_or(0))
            .await?;
        Ok(paid.snapshot(UnixTimestamp::now()))
    }

    /// `decodepay`: decodes and checks a payment request.
    pub fn decodepay(&self, request: DecodePayRequest) -> Result<DecodePayResponse, InvoiceError> {
        let invoice = bolt11::decode(&request.bolt11, request.description.as_deref())
            .map_err(InvoiceError::InvalidBolt11)?;
        Ok(DecodePayResponse::from(&invoice))
    }
}
