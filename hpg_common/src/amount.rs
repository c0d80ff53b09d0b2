use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------       Amount         ---------------------------------------------------------
/// A money amount in the major unit of its currency (e.g. `1500.00` NAD).
///
/// Amounts never pass through floating point. The canonical string form, used when amounts are signed into tokens and
/// compared during reconciliation, drops redundant trailing zeros but always carries at least two decimal places:
/// `1500` and `1500.000` both render as `1500.00`, while `12.345` stays `12.345`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct AmountError(String);

impl Amount {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// The canonical decimal string for this amount.
    pub fn to_canonical_string(&self) -> String {
        let mut value = self.0.normalize();
        if value.scale() < 2 {
            value.rescale(2);
        }
        value.to_string()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Decimal::from_str(s).map(Self).map_err(|e| AmountError(format!("'{s}' is not a decimal amount. {e}")))
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_canonical_string()
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_form() {
        let cases = [("1500", "1500.00"), ("1500.000", "1500.00"), ("1500.5", "1500.50"), ("12.345", "12.345")];
        for (input, expected) in cases {
            let amount = input.parse::<Amount>().expect("valid amount");
            assert_eq!(amount.to_string(), expected, "canonical form of {input}");
        }
    }

    #[test]
    fn equal_amounts_have_equal_strings() {
        let a = "1500.0".parse::<Amount>().unwrap();
        let b = Amount::from(1500);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn rejects_garbage() {
        assert!("fifteen".parse::<Amount>().is_err());
        assert!("".parse::<Amount>().is_err());
        assert!("1,500.00".parse::<Amount>().is_err());
    }

    #[test]
    fn positivity() {
        assert!("0.01".parse::<Amount>().unwrap().is_positive());
        assert!(!Amount::default().is_positive());
        assert!(!"-5".parse::<Amount>().unwrap().is_positive());
    }

    #[test]
    fn serializes_as_string() {
        let amount = "99.9".parse::<Amount>().unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, r#""99.90""#);
        let back: Amount = serde_json::from_str(r#""99.90""#).unwrap();
        assert_eq!(back, amount);
    }
}
