//! Request and response bodies of the invoice command surface.
//!
//! Field names follow the long-standing Lightning JSON-RPC names (`msatoshi`,
//! `expires_at`, `lastpay_index`, ...), so existing clients work unchanged.
//! Loosely typed parameters (`msatoshi`, `expiry`, `preimage`) stay raw
//! [`serde_json::Value`]s here and are parsed by [`crate::params`], so that
//! their error messages can quote the input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bolt11::Bolt11Invoice;
use crate::failure::FailureCode;
use crate::hash::{PaymentHash, Preimage};
use crate::invoice::InvoiceSnapshot;
use crate::route::RouteInfo;
use crate::timestamp::UnixTimestamp;

/// Well-known command error codes.
pub mod error_code {
    pub const INVALID_PARAMS: i32 = -32602;
    pub const LIGHTNINGD: i32 = -1;
    pub const INVOICE_EXPIRED_DURING_WAIT: i32 = -2;
    pub const INVOICE_LABEL_ALREADY_EXISTS: i32 = 900;
    pub const INVOICE_PREIMAGE_ALREADY_EXISTS: i32 = 901;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub msatoshi: Value,
    pub label: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposeprivatechannels: Option<bool>,
    /// Explicit route hints replacing the selector. Only honoured on nodes
    /// configured with `dev_routes`.
    #[serde(default, alias = "dev-routes", skip_serializing_if = "Option::is_none")]
    pub dev_routes: Option<Vec<Vec<RouteInfo>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub payment_hash: PaymentHash,
    pub expires_at: UnixTimestamp,
    pub bolt11: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_offline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_capacity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListInvoicesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<InvoiceSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelInvoiceRequest {
    pub label: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelExpiredInvoiceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxexpirytime: Option<UnixTimestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitInvoiceRequest {
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitAnyInvoiceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastpay_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodePayRequest {
    pub bolt11: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedFallback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedExtra {
    pub tag: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodePayResponse {
    pub currency: String,
    pub created_at: UnixTimestamp,
    pub expiry: u64,
    pub payee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msatoshi: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_hash: Option<String>,
    pub min_final_cltv_expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<DecodedFallback>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Vec<RouteInfo>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<DecodedExtra>,
    pub payment_hash: PaymentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_secret: Option<String>,
    pub signature: String,
}

impl From<&Bolt11Invoice> for DecodePayResponse {
    fn from(invoice: &Bolt11Invoice) -> Self {
        DecodePayResponse {
            currency: invoice.network.bolt11_currency().to_string(),
            created_at: invoice.timestamp,
            expiry: invoice.expiry,
            payee: invoice.payee.to_string(),
            msatoshi: invoice.amount.map(|a| a.msat()),
            amount_msat: invoice.amount.map(|a| a.to_string()),
            description: invoice.description.clone(),
            description_hash: invoice.description_hash.map(hex::encode),
            min_final_cltv_expiry: invoice.min_final_cltv_expiry,
            features: (!invoice.features.is_empty()).then(|| hex::encode(&invoice.features)),
            fallbacks: invoice
                .fallbacks
                .iter()
                .map(|f| DecodedFallback {
                    kind: f.kind().to_string(),
                    addr: f.address(invoice.network),
                    hex: hex::encode(f.script().as_bytes()),
                })
                .collect(),
            routes: invoice.routes.clone(),
            extra: invoice
                .extra
                .iter()
                .map(|e| DecodedExtra {
                    tag: e.tag.to_string(),
                    data: e.data.clone(),
                })
                .collect(),
            payment_hash: invoice.payment_hash,
            payment_secret: invoice.payment_secret.map(hex::encode),
            signature: invoice.signature.to_standard().to_string(),
        }
    }
}

/// An HTLC offered to us by the channel layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcRequest {
    pub payment_hash: PaymentHash,
    pub msat: crate::amount::AmountMsat,
}

/// How an offered HTLC was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HtlcResolution {
    Fulfill { payment_preimage: Preimage },
    Fail { failure_code: FailureCode },
}

/// Error body returned by every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
