//! Parsing of loosely-typed command parameters.
//!
//! Command requests accept a few human-friendly spellings:
//!
//! - amounts: a bare integer (`1000`), `"1000msat"`, `"5sat"`, or `"any"` for
//!   open-amount invoices;
//! - durations: an integer number of seconds with an optional unit suffix
//!   (`"90s"`, `"15m"`, `"2h"`, `"7d"`, `"1w"`);
//! - preimages: exactly 64 hex digits.
//!
//! Parameters arrive as raw [`serde_json::Value`]s so that both JSON numbers and
//! strings are accepted, and so that error messages can quote the offending
//! input verbatim.

use serde_json::Value;

use crate::amount::{AmountMsat, AmountSat};
use crate::hash::Preimage;

/// A parameter that failed to parse. The message is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParamError(String);

impl ParamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// An invoice amount: a fixed number of millisatoshis, or "any".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountOrAny {
    Amount(AmountMsat),
    Any,
}

impl AmountOrAny {
    pub fn amount(&self) -> Option<AmountMsat> {
        match self {
            AmountOrAny::Amount(amount) => Some(*amount),
            AmountOrAny::Any => None,
        }
    }
}

/// Text of a JSON value as the caller wrote it, without quotes for strings.
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses `"<n>"`, `"<n>msat"` or `"<n>sat"` into millisatoshis.
pub fn parse_amount_msat(s: &str) -> Option<AmountMsat> {
    fn digits(s: &str) -> Option<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    }

    if let Some(msat) = s.strip_suffix("msat") {
        return digits(msat).map(AmountMsat::from_msat);
    }
    if let Some(sat) = s.strip_suffix("sat") {
        return digits(sat).and_then(|sat| AmountSat::from_sat(sat).to_msat());
    }
    digits(s).map(AmountMsat::from_msat)
}

/// Parses the `msatoshi` invoice parameter.
pub fn parse_amount_or_any(name: &str, value: &Value) -> Result<AmountOrAny, ParamError> {
    let text = raw_text(value);
    if matches!(value, Value::String(_)) && text == "any" {
        return Ok(AmountOrAny::Any);
    }
    let parsed = match value {
        Value::Number(_) | Value::String(_) => parse_amount_msat(&text),
        _ => None,
    };
    parsed.map(AmountOrAny::Amount).ok_or_else(|| {
        ParamError::new(format!(
            "'{name}' should be millisatoshis or 'any', not '{text}'"
        ))
    })
}

/// Parses a duration with an optional `{s,m,h,d,w}` suffix into seconds.
pub fn parse_time(name: &str, value: &Value) -> Result<u64, ParamError> {
    const SUFFIXES: [(char, u64); 5] = [
        ('s', 1),
        ('m', 60),
        ('h', 60 * 60),
        ('d', 24 * 60 * 60),
        ('w', 7 * 24 * 60 * 60),
    ];

    let text = raw_text(value);
    let invalid = || {
        ParamError::new(format!(
            "'{name}' should be a number with optional {{s,m,h,d,w}} suffix, not '{text}'"
        ))
    };
    if !matches!(value, Value::Number(_) | Value::String(_)) {
        return Err(invalid());
    }

    let (number, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mul)| text.strip_suffix(*suffix).map(|n| (n, *mul)))
        .unwrap_or((text.as_str(), 1));
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let secs: u64 = number.parse().map_err(|_| invalid())?;
    secs.checked_mul(multiplier)
        .ok_or_else(|| ParamError::new(format!("'{name}' string '{text}' is too large")))
}

/// Parses a caller-supplied payment preimage.
pub fn parse_preimage(value: &Value) -> Result<Preimage, ParamError> {
    let err = || ParamError::new("preimage must be 64 hex digits");
    let Value::String(s) = value else {
        return Err(err());
    };
    s.parse().map_err(|_| err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_spellings() {
        assert_eq!(
            parse_amount_or_any("msatoshi", &json!(1000)).unwrap(),
            AmountOrAny::Amount(AmountMsat::from_msat(1000))
        );
        assert_eq!(
            parse_amount_or_any("msatoshi", &json!("1000msat")).unwrap(),
            AmountOrAny::Amount(AmountMsat::from_msat(1000))
        );
        assert_eq!(
            parse_amount_or_any("msatoshi", &json!("5sat")).unwrap(),
            AmountOrAny::Amount(AmountMsat::from_msat(5000))
        );
        assert_eq!(
            parse_amount_or_any("msatoshi", &json!("any")).unwrap(),
            AmountOrAny::Any
        );
    }

    #[test]
    fn amount_error_quotes_input() {
        let err = parse_amount_or_any("msatoshi", &json!("lots")).unwrap_err();
        assert_eq!(
            err.message(),
            "'msatoshi' should be millisatoshis or 'any', not 'lots'"
        );
        assert!(parse_amount_or_any("msatoshi", &json!(-5)).is_err());
        assert!(parse_amount_or_any("msatoshi", &json!("18446744073709551615sat")).is_err());
    }

    #[test]
    fn time_suffixes() {
        assert_eq!(parse_time("expiry", &json!(30)).unwrap(), 30);
        assert_eq!(parse_time("expiry", &json!("30")).unwrap(), 30);
        assert_eq!(parse_time("expiry", &json!("90s")).unwrap(), 90);
        assert_eq!(parse_time("expiry", &json!("15m")).unwrap(), 900);
        assert_eq!(parse_time("expiry", &json!("2h")).unwrap(), 7200);
        assert_eq!(parse_time("expiry", &json!("7d")).unwrap(), 604800);
        assert_eq!(parse_time("expiry", &json!("1w")).unwrap(), 604800);
    }

    #[test]
    fn time_errors() {
        let err = parse_time("expiry", &json!("10y")).unwrap_err();
        assert_eq!(
            err.message(),
            "'expiry' should be a number with optional {s,m,h,d,w} suffix, not '10y'"
        );
        assert!(parse_time("expiry", &json!("h")).is_err());
        let err = parse_time("expiry", &json!("18446744073709551615w")).unwrap_err();
        assert_eq!(err.message(), "'expiry' string '18446744073709551615w' is too large");
    }

    #[test]
    fn preimage_must_be_hex() {
        assert!(parse_preimage(&json!("00".repeat(32))).is_ok());
        assert_eq!(
            parse_preimage(&json!("abc")).unwrap_err().message(),
            "preimage must be 64 hex digits"
        );
        assert!(parse_preimage(&json!(12)).is_err());
    }
}
