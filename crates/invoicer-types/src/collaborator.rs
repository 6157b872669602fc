//! Contracts for the services the invoice core depends on.
//!
//! | Trait             | Answers                                                     |
//! |-------------------|-------------------------------------------------------------|
//! | [`ChannelGossip`] | Which channels could carry a payment to us, with fee policy |
//! | [`PeerDirectory`] | What we locally know about a peer's channels                |
//! | [`InvoiceSigner`] | A recoverable signature over an encoded payment request     |
//! | [`PaymentHook`]   | Whether an incoming payment should be accepted              |
//!
//! Gossip, signing and the hook may suspend on an out-of-process service and
//! are async. The peer directory is an in-process view and is queried
//! synchronously.

use async_trait::async_trait;
use lightning_invoice::RawBolt11Invoice;
use secp256k1::ecdsa::RecoverableSignature;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::{AmountMsat, AmountSat};
use crate::failure::FailureCode;
use crate::hash::Preimage;
use crate::invoice::Label;
use crate::route::{NodeId, RouteInfo, ShortChannelId};

#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("gossip service unavailable: {0}")]
    Unavailable(String),
    #[error("gossip gave a malformed reply: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("could not reach signer: {0}")]
    Unavailable(String),
    #[error("signer gave a bad reply: {0}")]
    BadReply(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("payment hook transport error: {0}")]
    Transport(String),
    #[error("payment hook replied with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("payment hook reply is not JSON: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ChannelGossip: Send + Sync {
    /// Candidate inbound channels. `expose_private` is forwarded as given:
    /// `None` leaves the decision to the gossip service.
    async fn incoming_channels(
        &self,
        expose_private: Option<bool>,
    ) -> Result<Vec<RouteInfo>, GossipError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    AwaitingLockin,
    Normal,
    ShuttingDown,
    Closing,
    Onchain,
}

/// Local view of one channel with a peer.
///
/// ```text
///         |<----------------- capacity ----------------->|
///         |             |<----------------- their balance ----------------->|
///         |             |<---- capacity to pay us ------>|<- their_reserve ->|
/// |-------|-------------|--------------------------------|-------------------|
/// 0  our_reserve    our_msat                                              funding
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_channel_id: Option<ShortChannelId>,
    pub state: ChannelState,
    pub funding: AmountSat,
    pub our_msat: AmountMsat,
    /// Reserve the peer must keep, as required by our channel config.
    pub their_reserve: AmountSat,
    /// Reserve we must keep, as required by the peer's channel config.
    pub our_reserve: AmountSat,
    /// Whether a channel daemon currently owns this channel (the peer is online).
    pub connected: bool,
}

pub trait PeerDirectory: Send + Sync {
    /// Channels with `peer`, or `None` if the peer is unknown.
    fn peer_channels(&self, peer: &NodeId) -> Option<Vec<ChannelSnapshot>>;
}

#[async_trait]
pub trait InvoiceSigner: Send + Sync {
    /// Identity the signatures recover to.
    fn node_id(&self) -> NodeId;

    /// Signs the invoice's [`signable_hash`](RawBolt11Invoice::signable_hash).
    async fn sign_invoice(
        &self,
        invoice: &RawBolt11Invoice,
    ) -> Result<RecoverableSignature, SignerError>;
}

/// What the hook is told about an incoming payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub label: Label,
    pub preimage: Preimage,
    /// Offered amount, rendered as `"<n>msat"`.
    #[serde(with = "msat_string")]
    pub msat: AmountMsat,
}

/// `{"payment": {...}}` as posted to a payment hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePaymentRequest {
    pub payment: InvoicePayment,
}

/// A hook reply that breaks the hook protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookReplyError {
    #[error("Invalid invoice_payment_hook failure_code: {0}")]
    InvalidFailureCode(String),
    #[error("Invalid invoice_payment_hook UPDATE failure_code: {0}")]
    UpdateFailureCode(String),
}

/// Raw reply of a payment hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookReply {
    /// No hook consumer is registered; the payment is approved.
    Unregistered,
    Reply(Value),
}

impl HookReply {
    /// The failure code the hook asked for, if any.
    ///
    /// A non-numeric code, or one with the UPDATE bit set, is a protocol error.
    pub fn failure_code(&self) -> Result<Option<FailureCode>, HookReplyError> {
        let HookReply::Reply(body) = self else {
            return Ok(None);
        };
        let Some(code) = body.get("failure_code") else {
            return Ok(None);
        };
        let code = code
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .map(FailureCode::from_u16)
            .ok_or_else(|| HookReplyError::InvalidFailureCode(body.to_string()))?;
        if code.requires_channel_update() {
            return Err(HookReplyError::UpdateFailureCode(body.to_string()));
        }
        Ok(Some(code))
    }
}

#[async_trait]
pub trait PaymentHook: Send + Sync {
    /// Asks the hook about a payment. Called exactly once per payment attempt.
    async fn invoice_payment(&self, payment: &InvoicePayment) -> Result<HookReply, HookError>;
}

mod msat_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::amount::AmountMsat;
    use crate::params::parse_amount_msat;

    pub fn serialize<S: Serializer>(amount: &AmountMsat, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AmountMsat, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_amount_msat(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount '{s}'")))
    }
}
