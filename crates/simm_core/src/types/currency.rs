//! ISO 4217 currency codes.
//!
//! For the SIMM interest-rate risk class the bucket of a sensitivity is given
//! by its currency, so `Currency` doubles as the interest-rate bucket key.

use super::error::MarginError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Three-letter upper-case currency code.
///
/// # Examples
/// ```
/// use simm_core::types::Currency;
///
/// let eur: Currency = "eur".parse().unwrap();
/// assert_eq!(eur.code(), "EUR");
/// assert!("EURO".parse::<Currency>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Currency(String);

impl Currency {
    /// Validates and normalises a currency code.
    pub fn new(code: &str) -> Result<Self, MarginError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MarginError::InvalidInput(format!(
                "invalid currency code: {}",
                code
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Euro.
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    /// US dollar.
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// The upper-case code.
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MarginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalises_case() {
        assert_eq!(Currency::new(" usd ").unwrap(), Currency::usd());
    }

    #[test]
    fn test_rejects_invalid_codes() {
        assert!(Currency::new("").is_err());
        assert!(Currency::new("E1R").is_err());
        assert!(Currency::new("EURO").is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_round_trip_validates() {
        let json = serde_json::to_string(&Currency::eur()).unwrap();
        assert_eq!(json, "\"EUR\"");
        assert!(serde_json::from_str::<Currency>("\"XX\"").is_err());
    }
}
