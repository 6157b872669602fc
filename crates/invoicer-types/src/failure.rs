//! BOLT4 failure codes returned for rejected payment attempts.
//!
//! A failure code is a 16-bit value whose top four bits classify the failure:
//!
//! | Bit      | Name      | Meaning                                           |
//! |----------|-----------|---------------------------------------------------|
//! | `0x8000` | BADONION  | The onion itself was unparsable                   |
//! | `0x4000` | PERM      | Permanent failure, retrying will not help         |
//! | `0x2000` | NODE      | Failure applies to the node, not a single channel |
//! | `0x1000` | UPDATE    | A channel update is attached, relay upstream      |
//!
//! A final recipient never has a channel update to attach, so a failure code
//! carrying [`FailureCode::UPDATE`] from a payment hook is a configuration error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCode(u16);

impl FailureCode {
    pub const BADONION: u16 = 0x8000;
    pub const PERM: u16 = 0x4000;
    pub const NODE: u16 = 0x2000;
    pub const UPDATE: u16 = 0x1000;

    /// Returned whenever a payment does not match an unpaid invoice.
    ///
    /// Unknown hash, too little, and too much all map to this one code so a
    /// prober cannot tell which invoices exist.
    pub const INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS: FailureCode = FailureCode(Self::PERM | 15);
    pub const TEMPORARY_NODE_FAILURE: FailureCode = FailureCode(Self::NODE | 2);

    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    pub const fn requires_channel_update(&self) -> bool {
        self.0 & Self::UPDATE != 0
    }

    pub const fn is_permanent(&self) -> bool {
        self.0 & Self::PERM != 0
    }
}

impl Display for FailureCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_payment_details_is_permanent() {
        let code = FailureCode::INCORRECT_OR_UNKNOWN_PAYMENT_DETAILS;
        assert_eq!(code.as_u16(), 0x400f);
        assert!(code.is_permanent());
        assert!(!code.requires_channel_update());
        assert_eq!(code.to_string(), "0x400f");
    }

    #[test]
    fn update_bit_detected() {
        // temporary_channel_failure
        assert!(FailureCode::from_u16(FailureCode::UPDATE | 7).requires_channel_update());
    }
}
