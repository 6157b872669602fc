//! Invoice records and their externally visible snapshot.
//!
//! An invoice is stored in one of two states, [`InvoiceState::Unpaid`] or
//! [`InvoiceState::Paid`]. Expiry is never stored: it is a projection of an
//! unpaid invoice whose `expires_at` has passed, computed by
//! [`InvoiceDetails::status`] against the caller's notion of "now".
//!
//! The settlement data (pay index, received amount, paid-at) only exists inside
//! the `Paid` variant, so an unpaid invoice cannot carry a stale pay index.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::amount::AmountMsat;
use crate::hash::{PaymentHash, Preimage};
use crate::params::ParamError;
use crate::timestamp::UnixTimestamp;

/// Longest label accepted, in bytes.
pub const INVOICE_MAX_LABEL_LEN: usize = 128;

/// Descriptions must be strictly shorter than this many bytes to fit a BOLT11 field.
pub const BOLT11_FIELD_BYTE_LIMIT: usize = 639;

/// Default invoice lifetime: one week.
pub const DEFAULT_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Store-assigned sequence id, strictly increasing in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(u64);

impl InvoiceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Caller-chosen unique invoice name, at most [`INVOICE_MAX_LABEL_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Result<Self, ParamError> {
        let label = label.into();
        if label.len() > INVOICE_MAX_LABEL_LEN {
            return Err(ParamError::new(format!(
                "Label '{label}' over {INVOICE_MAX_LABEL_LEN} bytes"
            )));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Label {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Label::new(value)
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.0
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored invoice state. `Paid` is entered exactly once and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceState {
    Unpaid,
    Paid {
        pay_index: u64,
        received: AmountMsat,
        paid_at: UnixTimestamp,
    },
}

/// Externally visible status, including the derived `expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Expired,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Expired => "expired",
        }
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "expired" => Ok(InvoiceStatus::Expired),
            other => Err(ParamError::new(format!(
                "'status' should be an invoice status, not '{other}'"
            ))),
        }
    }
}

/// Everything needed to persist a new invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub label: Label,
    pub amount: Option<AmountMsat>,
    pub description: Option<String>,
    pub bolt11: String,
    pub preimage: Preimage,
    pub created_at: UnixTimestamp,
    pub expiry_secs: u64,
}

impl NewInvoice {
    pub fn payment_hash(&self) -> PaymentHash {
        self.preimage.payment_hash()
    }

    pub fn expires_at(&self) -> UnixTimestamp {
        self.created_at.saturating_add(self.expiry_secs)
    }
}

/// A stored invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDetails {
    pub id: InvoiceId,
    pub label: Label,
    pub bolt11: String,
    pub payment_hash: PaymentHash,
    pub preimage: Preimage,
    pub amount: Option<AmountMsat>,
    pub description: Option<String>,
    pub created_at: UnixTimestamp,
    pub expires_at: UnixTimestamp,
    pub state: InvoiceState,
}

impl InvoiceDetails {
    pub fn status(&self, now: UnixTimestamp) -> InvoiceStatus {
        match self.state {
            InvoiceState::Paid { .. } => InvoiceStatus::Paid,
            InvoiceState::Unpaid if now >= self.expires_at => InvoiceStatus::Expired,
            InvoiceState::Unpaid => InvoiceStatus::Unpaid,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.state, InvoiceState::Paid { .. })
    }

    pub fn pay_index(&self) -> Option<u64> {
        match self.state {
            InvoiceState::Paid { pay_index, .. } => Some(pay_index),
            InvoiceState::Unpaid => None,
        }
    }

    pub fn snapshot(&self, now: UnixTimestamp) -> InvoiceSnapshot {
        let (pay_index, received, paid_at) = match self.state {
            InvoiceState::Paid {
                pay_index,
                received,
                paid_at,
            } => (Some(pay_index), Some(received), Some(paid_at)),
            InvoiceState::Unpaid => (None, None, None),
        };
        InvoiceSnapshot {
            label: self.label.clone(),
            bolt11: self.bolt11.clone(),
            payment_hash: self.payment_hash,
            msatoshi: self.amount.map(|a| a.msat()),
            amount_msat: self.amount.map(|a| a.to_string()),
            status: self.status(now),
            pay_index,
            msatoshi_received: received.map(|a| a.msat()),
            amount_received_msat: received.map(|a| a.to_string()),
            paid_at,
            description: self.description.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// The JSON shape of an invoice returned by `listinvoices`, `delinvoice` and waiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub label: Label,
    pub bolt11: String,
    pub payment_hash: PaymentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msatoshi: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_msat: Option<String>,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msatoshi_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_received_msat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<UnixTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub expires_at: UnixTimestamp,
}
