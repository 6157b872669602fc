//! Bitcoin networks an invoicing node can run on.
//!
//! Each network fixes two things the invoice subsystem cares about: the BOLT11
//! human-readable prefix (`lnbc`, `lntb`, ...) and the largest single payment an
//! invoice may request.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::amount::AmountMsat;

/// Largest amount a single invoice may request, identical on every network.
pub const MAX_PAYMENT_MSAT: u64 = 4_294_967_295;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    Testnet,
    Regtest,
    Signet,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown network {0}")]
pub struct UnknownNetwork(String);

impl Network {
    /// Every supported network.
    pub const ALL: [Network; 4] = [
        Network::Regtest,
        Network::Signet,
        Network::Testnet,
        Network::Bitcoin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Signet => "signet",
        }
    }

    /// Currency part of the BOLT11 human-readable prefix.
    pub fn bolt11_currency(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bc",
            Network::Testnet => "tb",
            Network::Regtest => "bcrt",
            Network::Signet => "tbs",
        }
    }

    pub fn max_payment(&self) -> AmountMsat {
        AmountMsat::from_msat(MAX_PAYMENT_MSAT)
    }

    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Bitcoin => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
            Network::Signet => bitcoin::Network::Signet,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lowercase_names() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert!("mainnet".parse::<Network>().is_err());
        let n: Network = serde_json::from_str("\"signet\"").unwrap();
        assert_eq!(n, Network::Signet);
    }
}
