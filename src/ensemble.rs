//! Ensemble selection.
//!
//! CFSv2 runs four members at each of four daily initialisation hours, and
//! the 90-day collection publishes the last three days of runs. An
//! [`EnsembleType`] picks which of those files make up a returned dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Cfsv2Error, Result};

/// Which forecast members/days to combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleType {
    /// All members initialised on the most recent day
    #[default]
    Day0,
    /// All members initialised one day earlier
    Day1,
    /// All members initialised two days earlier
    Day2,
    /// Every member from all three days
    #[serde(rename = "all")]
    AllDays,
    /// The pre-aggregated ensemble median
    Median,
}

impl EnsembleType {
    /// Every ensemble type, ordered by numeric code.
    pub const ALL: [EnsembleType; 5] = [
        EnsembleType::Day0,
        EnsembleType::Day1,
        EnsembleType::Day2,
        EnsembleType::AllDays,
        EnsembleType::Median,
    ];

    /// Numeric selector 0..=4.
    pub fn code(self) -> u8 {
        match self {
            EnsembleType::Day0 => 0,
            EnsembleType::Day1 => 1,
            EnsembleType::Day2 => 2,
            EnsembleType::AllDays => 3,
            EnsembleType::Median => 4,
        }
    }

    /// Name used in configuration files and cache attributes.
    pub fn as_str(self) -> &'static str {
        match self {
            EnsembleType::Day0 => "day0",
            EnsembleType::Day1 => "day1",
            EnsembleType::Day2 => "day2",
            EnsembleType::AllDays => "all",
            EnsembleType::Median => "median",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EnsembleType::Day0 => "Ensemble Day 0",
            EnsembleType::Day1 => "Ensemble Day 1",
            EnsembleType::Day2 => "Ensemble Day 2",
            EnsembleType::AllDays => "Ensemble All",
            EnsembleType::Median => "Ensemble Median",
        }
    }

    /// The single forecast day this type restricts to, if any.
    pub fn day(self) -> Option<u8> {
        match self {
            EnsembleType::Day0 => Some(0),
            EnsembleType::Day1 => Some(1),
            EnsembleType::Day2 => Some(2),
            EnsembleType::AllDays | EnsembleType::Median => None,
        }
    }

    fn unsupported(value: impl Into<String>) -> Cfsv2Error {
        Cfsv2Error::UnsupportedEnsemble {
            value: value.into(),
            expected: "0-4, day0, day1, day2, all, median".to_string(),
        }
    }
}

impl TryFrom<u8> for EnsembleType {
    type Error = Cfsv2Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.code() == code)
            .ok_or_else(|| Self::unsupported(code.to_string()))
    }
}

impl FromStr for EnsembleType {
    type Err = Cfsv2Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_lowercase();
        if let Ok(code) = value.parse::<u8>() {
            return Self::try_from(code);
        }
        match value.as_str() {
            "day0" => Ok(EnsembleType::Day0),
            "day1" => Ok(EnsembleType::Day1),
            "day2" => Ok(EnsembleType::Day2),
            "all" | "alldays" => Ok(EnsembleType::AllDays),
            "median" => Ok(EnsembleType::Median),
            _ => Err(Self::unsupported(s)),
        }
    }
}

impl fmt::Display for EnsembleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
