//! Overflow-checked millisatoshi and satoshi amounts.
//!
//! Channel balances and payment amounts are plain `u64` counters on the wire, but
//! every arithmetic step on them can underflow (a balance smaller than a reserve)
//! or overflow (doubling a huge requested amount). The types here only expose
//! checked operations returning [`Option`] so callers decide whether a failed
//! operation disqualifies a candidate, skips a guard, or is a hard error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Number of millisatoshis in one satoshi.
pub const MSAT_PER_SAT: u64 = 1000;

/// An amount in millisatoshis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountMsat(u64);

/// An amount in satoshis, used for channel funding and reserves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountSat(u64);

impl AmountMsat {
    pub const ZERO: AmountMsat = AmountMsat(0);

    pub const fn from_msat(msat: u64) -> Self {
        Self(msat)
    }

    pub const fn msat(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: AmountMsat) -> Option<AmountMsat> {
        self.0.checked_add(rhs.0).map(AmountMsat)
    }

    pub fn checked_sub(self, rhs: AmountMsat) -> Option<AmountMsat> {
        self.0.checked_sub(rhs.0).map(AmountMsat)
    }

    /// Subtracts a satoshi amount, failing if the conversion or the subtraction does.
    pub fn checked_sub_sat(self, rhs: AmountSat) -> Option<AmountMsat> {
        self.checked_sub(rhs.to_msat()?)
    }

    pub fn checked_mul(self, factor: u64) -> Option<AmountMsat> {
        self.0.checked_mul(factor).map(AmountMsat)
    }

    /// Ratio of `self` to `total` as a float, `None` when `total` is zero.
    pub fn fraction_of(self, total: AmountMsat) -> Option<f64> {
        if total.0 == 0 {
            return None;
        }
        Some(self.0 as f64 / total.0 as f64)
    }
}

impl AmountSat {
    pub const fn from_sat(sat: u64) -> Self {
        Self(sat)
    }

    pub const fn sat(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: AmountSat) -> Option<AmountSat> {
        self.0.checked_add(rhs.0).map(AmountSat)
    }

    pub fn to_msat(self) -> Option<AmountMsat> {
        self.0.checked_mul(MSAT_PER_SAT).map(AmountMsat)
    }

    /// `self - msat`, computed in millisatoshis.
    pub fn checked_sub_msat(self, msat: AmountMsat) -> Option<AmountMsat> {
        self.to_msat()?.checked_sub(msat)
    }
}

impl Display for AmountMsat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}msat", self.0)
    }
}

impl Display for AmountSat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}sat", self.0)
    }
}

impl From<u64> for AmountMsat {
    fn from(value: u64) -> Self {
        AmountMsat(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sat_to_msat_overflow_is_none() {
        assert_eq!(AmountSat::from_sat(u64::MAX).to_msat(), None);
        assert_eq!(
            AmountSat::from_sat(5).to_msat(),
            Some(AmountMsat::from_msat(5000))
        );
    }

    #[test]
    fn funding_minus_our_balance() {
        let funding = AmountSat::from_sat(100_000);
        let ours = AmountMsat::from_msat(30_000_000);
        assert_eq!(
            funding.checked_sub_msat(ours),
            Some(AmountMsat::from_msat(70_000_000))
        );
        let too_much = AmountMsat::from_msat(100_000_001);
        assert_eq!(funding.checked_sub_msat(too_much), None);
    }

    #[test]
    fn doubling_near_max_overflows() {
        let big = AmountMsat::from_msat(u64::MAX / 2 + 1);
        assert_eq!(big.checked_add(big), None);
        assert_eq!(big.checked_mul(2), None);
    }

    #[test]
    fn fraction_of_zero_total() {
        let a = AmountMsat::from_msat(10);
        assert_eq!(a.fraction_of(AmountMsat::ZERO), None);
        assert_eq!(a.fraction_of(AmountMsat::from_msat(40)), Some(0.25));
    }

    #[test]
    fn display_has_unit_suffix() {
        assert_eq!(AmountMsat::from_msat(42).to_string(), "42msat");
        assert_eq!(AmountSat::from_sat(7).to_string(), "7sat");
    }
}
