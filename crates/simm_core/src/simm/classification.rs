//! SIMM classification enums.
//!
//! String forms follow the ISDA SIMM methodology naming so that sensitivities
//! can be exchanged with external aggregation schemes (`"RatesFX"`,
//! `"INTEREST_RATE"`, `"delta"`, `"10y"`, `"OIS"`).

use crate::types::MarginError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// SIMM product class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProductClass {
    /// Interest rates and foreign exchange
    RatesFx,
    /// Credit
    Credit,
    /// Equity
    Equity,
    /// Commodity
    Commodity,
}

impl ProductClass {
    /// SIMM name of the product class.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductClass::RatesFx => "RatesFX",
            ProductClass::Credit => "Credit",
            ProductClass::Equity => "Equity",
            ProductClass::Commodity => "Commodity",
        }
    }
}

impl FromStr for ProductClass {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RATESFX" | "RATES_FX" => Ok(ProductClass::RatesFx),
            "CREDIT" => Ok(ProductClass::Credit),
            "EQUITY" => Ok(ProductClass::Equity),
            "COMMODITY" => Ok(ProductClass::Commodity),
            _ => Err(MarginError::InvalidInput(format!(
                "unknown product class: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for ProductClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SIMM risk class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskClass {
    /// Interest rate
    InterestRate,
    /// Qualifying credit
    CreditQ,
    /// Non-qualifying credit
    CreditNonQ,
    /// Equity
    Equity,
    /// Commodity
    Commodity,
    /// Foreign exchange
    Fx,
}

impl RiskClass {
    /// SIMM name of the risk class.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskClass::InterestRate => "INTEREST_RATE",
            RiskClass::CreditQ => "CREDIT_Q",
            RiskClass::CreditNonQ => "CREDIT_NON_Q",
            RiskClass::Equity => "EQUITY",
            RiskClass::Commodity => "COMMODITY",
            RiskClass::Fx => "FX",
        }
    }
}

impl FromStr for RiskClass {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INTEREST_RATE" => Ok(RiskClass::InterestRate),
            "CREDIT_Q" => Ok(RiskClass::CreditQ),
            "CREDIT_NON_Q" => Ok(RiskClass::CreditNonQ),
            "EQUITY" => Ok(RiskClass::Equity),
            "COMMODITY" => Ok(RiskClass::Commodity),
            "FX" => Ok(RiskClass::Fx),
            _ => Err(MarginError::InvalidInput(format!(
                "unknown risk class: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SIMM risk type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RiskType {
    /// First-order sensitivity to market rates
    Delta,
    /// Sensitivity to implied volatility
    Vega,
    /// Second-order (gamma-like) charge
    Curvature,
}

impl RiskType {
    /// SIMM name of the risk type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskType::Delta => "delta",
            RiskType::Vega => "vega",
            RiskType::Curvature => "curvature",
        }
    }
}

impl FromStr for RiskType {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delta" => Ok(RiskType::Delta),
            "vega" => Ok(RiskType::Vega),
            "curvature" => Ok(RiskType::Curvature),
            _ => Err(MarginError::InvalidInput(format!(
                "unknown risk type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interest-rate maturity buckets of the SIMM tenor ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaturityBucket {
    /// 2 weeks
    W2,
    /// 1 month
    M1,
    /// 3 months
    M3,
    /// 6 months
    M6,
    /// 1 year
    Y1,
    /// 2 years
    Y2,
    /// 3 years
    Y3,
    /// 5 years
    Y5,
    /// 10 years
    Y10,
    /// 15 years
    Y15,
    /// 20 years
    Y20,
    /// 30 years
    Y30,
}

impl MaturityBucket {
    /// Number of buckets on the ladder.
    pub const COUNT: usize = 12;

    /// The ladder in increasing maturity.
    pub const ALL: [MaturityBucket; 12] = [
        MaturityBucket::W2,
        MaturityBucket::M1,
        MaturityBucket::M3,
        MaturityBucket::M6,
        MaturityBucket::Y1,
        MaturityBucket::Y2,
        MaturityBucket::Y3,
        MaturityBucket::Y5,
        MaturityBucket::Y10,
        MaturityBucket::Y15,
        MaturityBucket::Y20,
        MaturityBucket::Y30,
    ];

    /// Position on the ladder.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Bucket at ladder position `index`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// SIMM label (`"2w"`, `"1m"`, ..., `"30y"`).
    pub fn label(&self) -> &'static str {
        match self {
            MaturityBucket::W2 => "2w",
            MaturityBucket::M1 => "1m",
            MaturityBucket::M3 => "3m",
            MaturityBucket::M6 => "6m",
            MaturityBucket::Y1 => "1y",
            MaturityBucket::Y2 => "2y",
            MaturityBucket::Y3 => "3y",
            MaturityBucket::Y5 => "5y",
            MaturityBucket::Y10 => "10y",
            MaturityBucket::Y15 => "15y",
            MaturityBucket::Y20 => "20y",
            MaturityBucket::Y30 => "30y",
        }
    }

    /// Bucket maturity in years.
    pub fn years(&self) -> f64 {
        match self {
            MaturityBucket::W2 => 1.0 / 26.0,
            MaturityBucket::M1 => 1.0 / 12.0,
            MaturityBucket::M3 => 0.25,
            MaturityBucket::M6 => 0.5,
            MaturityBucket::Y1 => 1.0,
            MaturityBucket::Y2 => 2.0,
            MaturityBucket::Y3 => 3.0,
            MaturityBucket::Y5 => 5.0,
            MaturityBucket::Y10 => 10.0,
            MaturityBucket::Y15 => 15.0,
            MaturityBucket::Y20 => 20.0,
            MaturityBucket::Y30 => 30.0,
        }
    }
}

impl FromStr for MaturityBucket {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|b| b.label() == lower)
            .copied()
            .ok_or_else(|| MarginError::InvalidInput(format!("unknown maturity bucket: {}", s)))
    }
}

impl fmt::Display for MaturityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Curve index a sensitivity refers to.
///
/// `Ois` is the discount curve; every other name is a forward (LIBOR) curve
/// such as `"Libor6m"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum CurveIndex {
    /// OIS discount curve
    Ois,
    /// Forward curve identified by its index name
    Forward(String),
}

impl CurveIndex {
    /// The six-month LIBOR forward curve.
    pub fn libor_6m() -> Self {
        CurveIndex::Forward("Libor6m".to_string())
    }

    /// Curve name as used in sensitivity queries.
    pub fn name(&self) -> &str {
        match self {
            CurveIndex::Ois => "OIS",
            CurveIndex::Forward(name) => name,
        }
    }

    /// Returns true for the discount curve.
    pub fn is_discount(&self) -> bool {
        matches!(self, CurveIndex::Ois)
    }
}

impl FromStr for CurveIndex {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(MarginError::InvalidInput(
                "curve index name must not be empty".to_string(),
            ));
        }
        if name.eq_ignore_ascii_case("OIS") {
            Ok(CurveIndex::Ois)
        } else {
            Ok(CurveIndex::Forward(name.to_string()))
        }
    }
}

impl TryFrom<String> for CurveIndex {
    type Error = MarginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurveIndex> for String {
    fn from(value: CurveIndex) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for CurveIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
