//! 256-bit unsigned integer arithmetic.
//!
//! Wraps `ruint::aliases::U256` behind a stable interface so the rest of the
//! crate never touches the underlying library directly. Targets and hit
//! values are big-endian 256-bit integers on the wire and decimal strings in
//! configuration, so conversions for both are provided here.

use ruint::aliases::U256 as Ruint256;
use serde_json::Value;
use std::fmt;
use std::ops::{AddAssign, Div, Mul};
use std::str::FromStr;

/// A 256-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256(Ruint256);

/// Error returned when a decimal string does not parse as a [`U256`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid 256-bit decimal integer")]
pub struct ParseU256Error;

impl U256 {
    /// Zero constant.
    pub const ZERO: Self = Self(Ruint256::ZERO);

    /// Largest representable value, `2^256 - 1`.
    pub const MAX: Self = Self(Ruint256::MAX);

    /// Create from big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(Ruint256::from_be_bytes(bytes))
    }

    /// Create from up to 32 big-endian bytes.
    ///
    /// Shorter slices are treated as zero-extended, which matches how
    /// unsigned big-endian byte strings of any length are read.
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        Self(Ruint256::from_be_slice(bytes))
    }

    /// Convert to big-endian bytes.
    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Convert to u64, saturating at `u64::MAX`.
    pub fn saturating_to_u64(self) -> u64 {
        self.0.saturating_to()
    }

    /// Read a JSON number or numeric string.
    ///
    /// Upstream reports targets and difficulty as JSON integers that can
    /// exceed 64 bits; with serde_json's `arbitrary_precision` enabled the
    /// number's exact decimal text is preserved and parsed here.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.to_string().parse().ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self(Ruint256::from(value))
    }
}

impl FromStr for U256 {
    type Err = ParseU256Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ruint256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|_| ParseU256Error)
    }
}

impl fmt::Display for U256 {
    /// Formats as a decimal string, the representation used in job wire
    /// parameters and configuration.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Div for U256 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Self(self.0 / rhs.0)
    }
}

impl Div<u64> for U256 {
    type Output = Self;

    fn div(self, rhs: u64) -> Self::Output {
        Self(self.0 / Ruint256::from(rhs))
    }
}

impl Mul<u64> for U256 {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self::Output {
        Self(self.0 * Ruint256::from(rhs))
    }
}

impl AddAssign for U256 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_round_trip() {
        let text = "115792089237316195423570985008687907852837564279074";
        let value: U256 = text.parse().unwrap();
        assert_eq!(value.to_string(), text);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<U256>().is_err());
        assert!("12x34".parse::<U256>().is_err());
        assert!("-5".parse::<U256>().is_err());
    }

    #[test]
    fn test_be_bytes_round_trip() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x80;
        bytes[31] = 0x01;
        let value = U256::from_be_bytes(bytes);
        assert_eq!(value.to_be_bytes(), bytes);
    }

    #[test]
    fn test_from_be_slice_zero_extends() {
        let value = U256::from_be_slice(&[0x01, 0x00]);
        assert_eq!(value, U256::from(256u64));
    }

    #[test]
    fn test_from_json_number_and_string() {
        // Wider than u64; parsed from the raw JSON text.
        let raw = r#"{"b": 74828412409843066196069914}"#;
        let parsed: Value = serde_json::from_str(raw).unwrap();
        let expected: U256 = "74828412409843066196069914".parse().unwrap();
        assert_eq!(U256::from_json(&parsed["b"]), Some(expected));

        let as_string = json!({"b": "12345"});
        assert_eq!(U256::from_json(&as_string["b"]), Some(U256::from(12345u64)));

        assert_eq!(U256::from_json(&json!({"b": true})["b"]), None);
    }

    #[test]
    fn test_division() {
        let a = U256::from(100u64);
        assert_eq!(a / U256::from(10u64), U256::from(10u64));
        assert_eq!(a / 3u64, U256::from(33u64));
    }

    #[test]
    fn test_mul_and_add_assign() {
        let mut a = U256::from(7u64);
        a += U256::from(3u64);
        assert_eq!(a, U256::from(10u64));
        assert_eq!(a * 5u64, U256::from(50u64));
    }

    #[test]
    fn test_ordering() {
        assert!(U256::ZERO < U256::from(1u64));
        assert!(U256::from(1u64) < U256::MAX);
    }
}
