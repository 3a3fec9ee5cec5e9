//! Signed fixed-point decimal amounts.
//!
//! Transfers carry amounts as decimal strings (`"1.5"`, `"0.000001"`). Parsers
//! need to compare, add and subtract them without floating point error, so
//! every amount is held as a sign plus a `U256` magnitude scaled by 10^18.
//! Token values with more than 18 decimals lose their extra precision.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use crate::error::AmountError;

/// Number of fractional digits kept.
pub const SCALE: u8 = 18;

fn ten_pow(n: u8) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}

/// A signed decimal amount with 18 fractional digits.
///
/// Serialized as its decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    negative: bool,
    units: U256,
}

impl Amount {
    pub const ZERO: Amount = Amount {
        negative: false,
        units: U256::ZERO,
    };

    fn new(negative: bool, units: U256) -> Self {
        // no negative zero
        Self {
            negative: negative && !units.is_zero(),
            units,
        }
    }

    /// Scale a raw on-chain integer with `decimals` fractional digits.
    pub fn from_units(raw: U256, decimals: u8) -> Self {
        let units = if decimals <= SCALE {
            raw.saturating_mul(ten_pow(SCALE - decimals))
        } else {
            raw / ten_pow(decimals - SCALE)
        };
        Self::new(false, units)
    }

    /// Like `from_units` for a signed raw value given as sign + magnitude.
    pub fn from_signed_units(negative: bool, raw: U256, decimals: u8) -> Self {
        let abs = Self::from_units(raw, decimals);
        Self::new(negative, abs.units)
    }

    /// Native-asset amount from wei.
    pub fn from_wei(wei: U256) -> Self {
        Self::from_units(wei, 18)
    }

    /// Integer amount.
    pub fn from_int(n: u64) -> Self {
        Self::from_units(U256::from(n), 0)
    }

    /// Parse a decimal string such as `"12"`, `"-0.25"` or `".5"`.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        let invalid = |reason: &str| AmountError::Invalid {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if body.is_empty() {
            return Err(invalid("empty"));
        }
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
            || (int_part.is_empty() && frac_part.is_empty())
        {
            return Err(invalid("not a decimal number"));
        }
        let int_units = if int_part.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(int_part, 10).map_err(|e| invalid(&e.to_string()))?
        };
        let mut frac = frac_part.to_string();
        frac.truncate(SCALE as usize);
        while frac.len() < SCALE as usize {
            frac.push('0');
        }
        let frac_units = U256::from_str_radix(&frac, 10).map_err(|e| invalid(&e.to_string()))?;
        let units = int_units
            .checked_mul(ten_pow(SCALE))
            .and_then(|v| v.checked_add(frac_units))
            .ok_or_else(|| AmountError::Overflow {
                value: s.to_string(),
            })?;
        Ok(Self::new(negative, units))
    }

    /// Parse, treating malformed input as zero.
    pub fn parse_or_zero(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.units.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.negative && !self.units.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn abs(&self) -> Self {
        Self::new(false, self.units)
    }

    /// `|self - other|`
    pub fn abs_diff(&self, other: &Self) -> Self {
        (*self - *other).abs()
    }

    /// Integer division, truncating toward zero.
    pub fn div_int(&self, divisor: u64) -> Self {
        if divisor == 0 {
            return Self::ZERO;
        }
        Self::new(self.negative, self.units / U256::from(divisor))
    }

    /// True when the two amounts differ by no more than `tolerance`.
    pub fn is_close(&self, other: &Self, tolerance: &Self) -> bool {
        self.abs_diff(other) <= tolerance.abs()
    }

    /// The power of ten just above this amount: `0.088 -> 0.1`, `8.9 -> 10`.
    pub fn closest_ten_pow(&self) -> Self {
        let one = ten_pow(SCALE);
        if self.units < one {
            // count leading zero digits after the decimal point
            let digits = self.units.to_string().len() as u8;
            let leading_zeros = SCALE.saturating_sub(digits);
            Self::new(false, ten_pow(SCALE - leading_zeros))
        } else {
            let int_digits = (self.units / one).to_string().len() as u8;
            Self::new(false, one.saturating_mul(ten_pow(int_digits)))
        }
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.units.cmp(&other.units),
            (true, true) => other.units.cmp(&self.units),
        }
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount::new(!self.negative, self.units)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        if self.negative == rhs.negative {
            return Amount::new(self.negative, self.units.saturating_add(rhs.units));
        }
        if self.units >= rhs.units {
            Amount::new(self.negative, self.units - rhs.units)
        } else {
            Amount::new(rhs.negative, rhs.units - self.units)
        }
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        self + (-rhs)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let one = ten_pow(SCALE);
        let int_part = self.units / one;
        let frac_part = self.units % one;
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{int_part}")?;
        if !frac_part.is_zero() {
            let frac = format!("{:0>width$}", frac_part.to_string(), width = SCALE as usize);
            write!(f, ".{}", frac.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Amount> for String {
    fn from(a: Amount) -> Self {
        a.to_string()
    }
}

/// Format a raw on-chain integer with `decimals` fractional digits.
pub fn format_units(raw: U256, decimals: u8) -> String {
    Amount::from_units(raw, decimals).to_string()
}

/// Parse a `0x`-prefixed hex quantity (or a decimal string) into a `U256`.
pub fn parse_quantity(s: &str) -> Option<U256> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Some(U256::ZERO);
        }
        U256::from_str_radix(hex, 16).ok()
    } else {
        U256::from_str_radix(s, 10).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(amt("1.50").to_string(), "1.5");
        assert_eq!(amt("-0.000001").to_string(), "-0.000001");
        assert_eq!(amt("42").to_string(), "42");
        assert_eq!(amt(".5").to_string(), "0.5");
        assert_eq!(amt("-0").to_string(), "0");
        assert!(Amount::parse("1e18").is_err());
        assert!(Amount::parse("").is_err());
        assert!(Amount::parse("1.2.3").is_err());
    }

    #[test]
    fn units_scaling() {
        let usdc = Amount::from_units(U256::from(1_234_500u64), 6);
        assert_eq!(usdc.to_string(), "1.2345");
        let wei = Amount::from_wei(U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(wei.to_string(), "1");
        assert_eq!(format_units(U256::from(5u64), 0), "5");
    }

    #[test]
    fn signed_arithmetic() {
        assert_eq!((amt("1") - amt("2.5")).to_string(), "-1.5");
        assert_eq!((amt("-1") + amt("-2")).to_string(), "-3");
        assert_eq!((amt("-1") + amt("3")).to_string(), "2");
        assert_eq!(amt("1").abs_diff(&amt("3.25")).to_string(), "2.25");
        assert!(amt("-5") < amt("-1"));
        assert!(amt("0.1") > amt("-100"));
    }

    #[test]
    fn closeness_with_ten_percent_tolerance() {
        let target = amt("100");
        let tolerance = target.div_int(10);
        assert!(amt("95").is_close(&target, &tolerance));
        assert!(amt("110").is_close(&target, &tolerance));
        assert!(!amt("111").is_close(&target, &tolerance));
    }

    #[test]
    fn closest_ten_pow() {
        assert_eq!(amt("0.088").closest_ten_pow().to_string(), "0.1");
        assert_eq!(amt("0.88").closest_ten_pow().to_string(), "1");
        assert_eq!(amt("8.9").closest_ten_pow().to_string(), "10");
        assert_eq!(amt("99.5").closest_ten_pow().to_string(), "100");
    }

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_quantity("0x10"), Some(U256::from(16u64)));
        assert_eq!(parse_quantity("0x"), Some(U256::ZERO));
        assert_eq!(parse_quantity("1000"), Some(U256::from(1000u64)));
        assert_eq!(parse_quantity("zz"), None);
    }
}
