//! Node identities, short channel ids and route hints.

use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A Lightning node identity: a compressed secp256k1 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(PublicKey);

impl NodeId {
    pub fn from_public_key(key: PublicKey) -> Self {
        Self(key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0.serialize()))
    }
}

impl FromStr for NodeId {
    type Err = secp256k1::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_str(s).map(Self)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Channel position in the chain: `block x transaction x output`.
///
/// Packed as `block << 40 | tx << 16 | output`, displayed as `123x4x0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortChannelId(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid short channel id '{0}', expected <block>x<tx>x<output>")]
pub struct ShortChannelIdParseError(String);

impl ShortChannelId {
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn new(block: u32, tx: u32, output: u16) -> Option<Self> {
        if block >= 1 << 24 || tx >= 1 << 24 {
            return None;
        }
        Some(Self(
            (u64::from(block) << 40) | (u64::from(tx) << 16) | u64::from(output),
        ))
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn block(&self) -> u32 {
        (self.0 >> 40) as u32
    }

    pub const fn tx_index(&self) -> u32 {
        ((self.0 >> 16) & 0xFF_FFFF) as u32
    }

    pub const fn output(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl Display for ShortChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.block(), self.tx_index(), self.output())
    }
}

impl FromStr for ShortChannelId {
    type Err = ShortChannelIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ShortChannelIdParseError(s.to_string());
        let mut parts = s.split('x');
        let (Some(block), Some(tx), Some(output), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let block = block.parse().map_err(|_| err())?;
        let tx = tx.parse().map_err(|_| err())?;
        let output = output.parse().map_err(|_| err())?;
        ShortChannelId::new(block, tx, output).ok_or_else(err)
    }
}

impl Serialize for ShortChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ShortChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ShortChannelId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One hop of a route hint: the peer that can forward to us and its fee policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub pubkey: NodeId,
    pub short_channel_id: ShortChannelId,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
    pub cltv_expiry_delta: u16,
}
