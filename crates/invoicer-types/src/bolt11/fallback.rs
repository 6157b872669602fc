//! On-chain fallback addresses embedded in `f` fields.

use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::{
    Address, PubkeyHash, ScriptBuf, ScriptHash, WPubkeyHash, WScriptHash, WitnessVersion,
};
use std::fmt::{Display, Formatter};

use crate::network::Network;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FallbackError {
    #[error("Fallback address not valid")]
    NotValid,
    #[error("Fallback address does not match our network {0}")]
    WrongNetwork(Network),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

impl Display for FallbackKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FallbackKind::P2pkh => "P2PKH",
            FallbackKind::P2sh => "P2SH",
            FallbackKind::P2wpkh => "P2WPKH",
            FallbackKind::P2wsh => "P2WSH",
        })
    }
}

/// A fallback output script of one of the four kinds BOLT11 can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    kind: FallbackKind,
    script: ScriptBuf,
}

impl Fallback {
    pub fn from_script(script: ScriptBuf) -> Option<Self> {
        let kind = if script.is_p2pkh() {
            FallbackKind::P2pkh
        } else if script.is_p2sh() {
            FallbackKind::P2sh
        } else if script.is_p2wpkh() {
            FallbackKind::P2wpkh
        } else if script.is_p2wsh() {
            FallbackKind::P2wsh
        } else {
            return None;
        };
        Some(Self { kind, script })
    }

    pub fn kind(&self) -> FallbackKind {
        self.kind
    }

    pub fn script(&self) -> &ScriptBuf {
        &self.script
    }

    /// Address text of this script on `network`.
    pub fn address(&self, network: Network) -> Option<String> {
        Address::from_script(&self.script, network.to_bitcoin())
            .ok()
            .map(|a| a.to_string())
    }

    /// The `f` field form: a version and the hash the script commits to.
    pub(crate) fn to_lightning(&self) -> lightning_invoice::Fallback {
        let bytes = self.script.as_bytes();
        let hash20 = |range: std::ops::Range<usize>| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&bytes[range]);
            hash
        };
        match self.kind {
            // OP_DUP OP_HASH160 <20> ... OP_EQUALVERIFY OP_CHECKSIG
            FallbackKind::P2pkh => {
                lightning_invoice::Fallback::PubKeyHash(PubkeyHash::from_byte_array(hash20(3..23)))
            }
            // OP_HASH160 <20> ... OP_EQUAL
            FallbackKind::P2sh => {
                lightning_invoice::Fallback::ScriptHash(ScriptHash::from_byte_array(hash20(2..22)))
            }
            FallbackKind::P2wpkh | FallbackKind::P2wsh => {
                lightning_invoice::Fallback::SegWitProgram {
                    version: WitnessVersion::V0,
                    program: bytes[2..].to_vec(),
                }
            }
        }
    }

    /// Rebuilds the script from an `f` field. `None` for witness versions or
    /// program lengths other than the v0 key and script hashes.
    pub(crate) fn from_lightning(fallback: &lightning_invoice::Fallback) -> Option<Self> {
        let script = match fallback {
            lightning_invoice::Fallback::PubKeyHash(hash) => ScriptBuf::new_p2pkh(hash),
            lightning_invoice::Fallback::ScriptHash(hash) => ScriptBuf::new_p2sh(hash),
            lightning_invoice::Fallback::SegWitProgram { version, program }
                if *version == WitnessVersion::V0 =>
            {
                match program.len() {
                    20 => ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(
                        program.as_slice().try_into().ok()?,
                    )),
                    32 => ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(
                        program.as_slice().try_into().ok()?,
                    )),
                    _ => return None,
                }
            }
            lightning_invoice::Fallback::SegWitProgram { .. } => return None,
        };
        Fallback::from_script(script)
    }
}

/// Parses a fallback address and checks it belongs to `network`.
pub fn parse_fallback(address: &str, network: Network) -> Result<Fallback, FallbackError> {
    let unchecked: Address<NetworkUnchecked> =
        address.parse().map_err(|_| FallbackError::NotValid)?;
    if !unchecked.is_valid_for_network(network.to_bitcoin()) {
        return Err(FallbackError::WrongNetwork(network));
    }
    let script = unchecked.assume_checked().script_pubkey();
    Fallback::from_script(script).ok_or(FallbackError::NotValid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const P2PKH_MAINNET: &str = "1RustyRX2oai4EYYDpQGWvEL62BBGqN9T";
    const P2SH_MAINNET: &str = "3EktnHQD7RiAE6uzMj2ZifT9YgRrkSgzQX";
    const P2WPKH_MAINNET: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const P2WSH_MAINNET: &str = "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3";

    #[test]
    fn parses_each_kind() {
        let cases = [
            (P2PKH_MAINNET, FallbackKind::P2pkh),
            (P2SH_MAINNET, FallbackKind::P2sh),
            (P2WPKH_MAINNET, FallbackKind::P2wpkh),
            (P2WSH_MAINNET, FallbackKind::P2wsh),
        ];
        for (address, kind) in cases {
            let fallback = parse_fallback(address, Network::Bitcoin).unwrap();
            assert_eq!(fallback.kind(), kind);
            assert_eq!(fallback.address(Network::Bitcoin).as_deref(), Some(address));
            assert_eq!(Fallback::from_lightning(&fallback.to_lightning()), Some(fallback));
        }
    }

    #[test]
    fn rejects_other_network() {
        assert_eq!(
            parse_fallback(P2WPKH_MAINNET, Network::Regtest),
            Err(FallbackError::WrongNetwork(Network::Regtest))
        );
        assert_eq!(
            FallbackError::WrongNetwork(Network::Regtest).to_string(),
            "Fallback address does not match our network regtest"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_fallback("not-an-address", Network::Bitcoin),
            Err(FallbackError::NotValid)
        );
    }

    #[test]
    fn other_witness_programs_are_ignored() {
        let taproot = lightning_invoice::Fallback::SegWitProgram {
            version: WitnessVersion::V1,
            program: vec![0u8; 32],
        };
        assert_eq!(Fallback::from_lightning(&taproot), None);
        let short = lightning_invoice::Fallback::SegWitProgram {
            version: WitnessVersion::V0,
            program: vec![0u8; 19],
        };
        assert_eq!(Fallback::from_lightning(&short), None);
    }
}
