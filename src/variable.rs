//! The climate variables published in the CFSv2 90-day forecast collection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Cfsv2Error, Result};

const CFSV2_90DAY_PATH: &str = "NWCSC_INTEGRATED_SCENARIOS_ALL_CLIMATE/cfsv2_metdata_90day/";

/// A forecast variable the catalog knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableName {
    /// Daily maximum near-surface air temperature
    Tmax,
    /// Daily minimum near-surface air temperature
    Tmin,
    /// Daily precipitation amount
    Precip,
    /// Daily mean wind speed
    Wind,
    /// Daily mean specific humidity
    Sph,
    /// Daily mean downwelling shortwave radiation
    Srad,
}

impl VariableName {
    /// Every variable, in catalog order.
    pub const ALL: [VariableName; 6] = [
        VariableName::Tmax,
        VariableName::Tmin,
        VariableName::Precip,
        VariableName::Wind,
        VariableName::Sph,
        VariableName::Srad,
    ];

    /// Short key used on the command line and in cache file names.
    pub fn key(self) -> &'static str {
        match self {
            VariableName::Tmax => "tmax",
            VariableName::Tmin => "tmin",
            VariableName::Precip => "precip",
            VariableName::Wind => "wind",
            VariableName::Sph => "sph",
            VariableName::Srad => "srad",
        }
    }

    /// Long descriptive name of the variable.
    pub fn standard_name(self) -> &'static str {
        match self {
            VariableName::Tmax => "daily_maximum_temperature",
            VariableName::Tmin => "daily_minimum_temperature",
            VariableName::Precip => "precipitation_amount",
            VariableName::Wind => "wind_speed",
            VariableName::Sph => "specific_humidity",
            VariableName::Srad => "surface_downwelling_shortwave_flux_in_air",
        }
    }

    /// Remote file name stem, before any member suffix and the `.nc` extension.
    pub fn file_stem(self) -> &'static str {
        match self {
            VariableName::Tmax => "cfsv2_metdata_forecast_tmmx_daily",
            VariableName::Tmin => "cfsv2_metdata_forecast_tmmn_daily",
            VariableName::Precip => "cfsv2_metdata_forecast_pr_daily",
            VariableName::Wind => "cfsv2_metdata_forecast_vs_daily",
            VariableName::Sph => "cfsv2_metdata_forecast_sph_daily",
            VariableName::Srad => "cfsv2_metdata_forecast_srad_daily",
        }
    }

    /// Dataset path below the THREDDS service segment.
    pub fn dataset_path(self) -> &'static str {
        // The whole collection currently lives in one directory.
        CFSV2_90DAY_PATH
    }

    /// Name of the gridded data variable inside the remote files.
    pub fn data_variable(self) -> &'static str {
        match self {
            VariableName::Tmax | VariableName::Tmin => "air_temperature",
            VariableName::Precip => "precipitation_amount",
            VariableName::Wind => "wind_speed",
            VariableName::Sph => "specific_humidity",
            VariableName::Srad => "surface_downwelling_shortwave_flux_in_air",
        }
    }

    fn expected() -> String {
        Self::ALL
            .iter()
            .map(|v| v.key())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VariableName {
    type Err = Cfsv2Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let found = Self::ALL
            .into_iter()
            .find(|v| v.key() == name || v.standard_name() == name);

        match (found, name) {
            (Some(v), _) => Ok(v),
            (None, "prcp") => Ok(VariableName::Precip),
            (None, "ws") => Ok(VariableName::Wind),
            (None, _) => Err(Cfsv2Error::UnknownVariable {
                name: s.to_string(),
                expected: Self::expected(),
            }),
        }
    }
}
