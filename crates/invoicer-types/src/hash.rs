//! Payment preimages and payment hashes.
//!
//! A [`Preimage`] is the 32-byte secret released to the payer's side once an
//! invoice is settled; its SHA-256 digest is the [`PaymentHash`] committed to in
//! the payment request. The binding is fixed at construction: a `PaymentHash`
//! for an invoice is only ever obtained via [`Preimage::payment_hash`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Errors parsing a hex-encoded 32-byte value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HexBytesError {
    #[error("expected 64 hex digits")]
    InvalidLength,
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

fn parse_hex32(s: &str) -> Result<[u8; 32], HexBytesError> {
    if s.len() != 64 {
        return Err(HexBytesError::InvalidLength);
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

macro_rules! hex32_newtype {
    ($name:ident) => {
        impl $name {
            pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = HexBytesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex32(s).map(Self)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// The secret whose hash locks an incoming payment.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Preimage([u8; 32]);

/// SHA-256 of a [`Preimage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaymentHash([u8; 32]);

hex32_newtype!(Preimage);
hex32_newtype!(PaymentHash);

impl Preimage {
    pub fn payment_hash(&self) -> PaymentHash {
        PaymentHash(sha256(&self.0))
    }
}

// Keep the secret out of debug logs.
impl Debug for Preimage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Preimage(..)")
    }
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
