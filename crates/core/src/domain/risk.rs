use crate::error::InvalidInput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [Self::Conservative, Self::Moderate, Self::Aggressive];

    /// Absolute sentiment score that must be exceeded before the tier acts.
    pub fn trigger(self) -> f64 {
        match self {
            Self::Conservative => 0.5,
            Self::Moderate => 0.3,
            Self::Aggressive => 0.15,
        }
    }

    /// Share count band for a drafted order.
    pub fn quantity_band(self) -> RangeInclusive<i32> {
        match self {
            Self::Conservative => 1..=5,
            Self::Moderate => 5..=15,
            Self::Aggressive => 15..=30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(InvalidInput::UnknownVariant {
                kind: "risk tier",
                value: other.to_string(),
            }),
        }
    }
}
