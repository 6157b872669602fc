//! BOLT11 payment requests.
//!
//! The bech32 codec, amount prefixes and signing hash come from
//! [`lightning_invoice`]. This module maps between its raw invoice and the
//! flat [`Bolt11Invoice`] view the commands report, and tags fallback
//! addresses by kind.
//!
//! Encoding is async because the signature comes from an [`InvoiceSigner`].
//! Decoding is a pure function.
//!
//! [`InvoiceSigner`]: crate::collaborator::InvoiceSigner

mod decode;
mod encode;
mod fallback;

pub use decode::decode;
pub use fallback::{Fallback, FallbackError, FallbackKind, parse_fallback};
pub use lightning_invoice::{Currency, RawBolt11Invoice};

use lightning_invoice::{Bolt11ParseError, CreationError};
use secp256k1::ecdsa::RecoverableSignature;

use crate::amount::AmountMsat;
use crate::hash::PaymentHash;
use crate::network::Network;
use crate::route::{NodeId, RouteInfo};
use crate::timestamp::UnixTimestamp;

/// Expiry assumed when an invoice carries no `x` field.
pub const DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Final CLTV delta assumed when an invoice carries no `c` field.
pub const DEFAULT_MIN_FINAL_CLTV_EXPIRY: u64 = 18;

#[derive(Debug, thiserror::Error)]
pub enum Bolt11Error {
    #[error("{0}")]
    Parse(#[from] Bolt11ParseError),
    #[error("{0}")]
    Creation(#[from] CreationError),
    #[error("Unknown currency {0}")]
    UnknownNetwork(String),
    #[error("Invalid amount: {0} pico-bitcoin is not a whole millisatoshi")]
    BadAmount(u64),
    #[error("No valid 'p' field found")]
    MissingPaymentHash,
    #[error("h: does not match description")]
    DescriptionMismatch,
    #[error("signature invalid: {0}")]
    BadSignature(#[from] secp256k1::Error),
    #[error("signature does not match payee {0}")]
    SignatureMismatch(NodeId),
    #[error(transparent)]
    Signer(#[from] crate::collaborator::SignerError),
}

/// A tagged field we do not interpret, as its tag letter and bech32 data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub tag: char,
    pub data: String,
}

/// The contents of a payment request before it is signed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedBolt11 {
    pub network: Network,
    pub amount: Option<AmountMsat>,
    pub timestamp: UnixTimestamp,
    pub payment_hash: PaymentHash,
    pub payment_secret: [u8; 32],
    pub description: String,
    pub expiry: u64,
    pub min_final_cltv_expiry: u64,
    pub fallbacks: Vec<Fallback>,
    pub routes: Vec<Vec<RouteInfo>>,
}

/// A decoded, signature-checked payment request.
#[derive(Debug, Clone, PartialEq)]
pub struct Bolt11Invoice {
    pub network: Network,
    pub amount: Option<AmountMsat>,
    pub timestamp: UnixTimestamp,
    pub payee: NodeId,
    pub payment_hash: PaymentHash,
    pub payment_secret: Option<[u8; 32]>,
    pub description: Option<String>,
    pub description_hash: Option<[u8; 32]>,
    pub expiry: u64,
    pub min_final_cltv_expiry: u64,
    pub fallbacks: Vec<Fallback>,
    pub routes: Vec<Vec<RouteInfo>>,
    /// Feature bits, big-endian.
    pub features: Vec<u8>,
    pub extra: Vec<ExtraField>,
    pub signature: RecoverableSignature,
}

impl Bolt11Invoice {
    pub fn expires_at(&self) -> UnixTimestamp {
        self.timestamp.saturating_add(self.expiry)
    }
}

impl Network {
    pub fn to_currency(self) -> Currency {
        match self {
            Network::Bitcoin => Currency::Bitcoin,
            Network::Testnet => Currency::BitcoinTestnet,
            Network::Regtest => Currency::Regtest,
            Network::Signet => Currency::Signet,
        }
    }

    pub fn from_currency(currency: &Currency) -> Result<Self, Bolt11Error> {
        match currency {
            Currency::Bitcoin => Ok(Network::Bitcoin),
            Currency::BitcoinTestnet => Ok(Network::Testnet),
            Currency::Regtest => Ok(Network::Regtest),
            Currency::Signet => Ok(Network::Signet),
            other => Err(Bolt11Error::UnknownNetwork(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currencies_match_prefixes() {
        for network in Network::ALL {
            let currency = network.to_currency();
            assert_eq!(currency.to_string(), network.bolt11_currency());
            assert_eq!(Network::from_currency(&currency).unwrap(), network);
        }
        assert!(matches!(
            Network::from_currency(&Currency::Simnet),
            Err(Bolt11Error::UnknownNetwork(_))
        ));
    }
}
