//! Remote catalog and URL resolution.
//!
//! Maps a [`VariableName`] and [`EnsembleType`] to the remote files that make
//! up a forecast. Resolution is a pure function of the static tables and the
//! inputs, and the order of the returned URLs is the concatenation order of
//! the combined dataset.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ensemble::EnsembleType;
use crate::error::Result;
use crate::variable::VariableName;

/// Forecast initialisation hours (UTC).
pub const INIT_HOURS: [u8; 4] = [0, 6, 12, 18];

/// Ensemble member ids.
pub const MEMBERS: [u8; 4] = [1, 2, 3, 4];

/// Forecast days kept by the 90-day collection.
pub const DAYS: [u8; 3] = [0, 1, 2];

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "thredds.northwestknowledge.net";
pub const DEFAULT_PORT: u16 = 8080;

/// THREDDS service used to reach a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteService {
    /// OPeNDAP access (`dodsC`)
    #[default]
    Opendap,
    /// Whole-file HTTP download (`fileServer`)
    Http,
}

impl RemoteService {
    /// Path segment of the service below `/thredds/`.
    pub fn path_segment(self) -> &'static str {
        match self {
            RemoteService::Opendap => "dodsC",
            RemoteService::Http => "fileServer",
        }
    }
}

/// One ensemble member file: init hour, member id and forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberKey {
    pub init_hour: u8,
    pub member: u8,
    pub day: u8,
}

impl MemberKey {
    pub fn new(init_hour: u8, member: u8, day: u8) -> Self {
        Self {
            init_hour,
            member,
            day,
        }
    }

    /// File name suffix, e.g. `_06_3_1`.
    pub fn suffix(&self) -> String {
        format!("_{:02}_{}_{}", self.init_hour, self.member, self.day)
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "init {:02}Z member {} day {}",
            self.init_hour, self.member, self.day
        )
    }
}

/// A resolved remote dataset location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForecastUrl {
    pub variable: VariableName,
    /// `None` for the median dataset.
    pub member: Option<MemberKey>,
    pub url: String,
}

impl ForecastUrl {
    /// Last path segment of the URL.
    pub fn file_name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

/// Remote server location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Catalog {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    fn source(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Directory URL holding a variable's files.
    pub fn data_url(&self, variable: VariableName, service: RemoteService) -> String {
        format!(
            "{}/thredds/{}/{}",
            self.source(),
            service.path_segment(),
            variable.dataset_path()
        )
    }

    fn file_url(
        &self,
        variable: VariableName,
        service: RemoteService,
        member: Option<MemberKey>,
    ) -> ForecastUrl {
        let suffix = member.map(|m| m.suffix()).unwrap_or_default();
        ForecastUrl {
            variable,
            member,
            url: format!(
                "{}{}{}.nc",
                self.data_url(variable, service),
                variable.file_stem(),
                suffix
            ),
        }
    }

    /// Resolve the ordered URL list for a variable and ensemble selection.
    ///
    /// `AllDays` iterates day, then member, then init hour; a single day
    /// iterates init hour, then member.
    pub fn resolve(
        &self,
        variable: VariableName,
        ensemble: EnsembleType,
        service: RemoteService,
    ) -> Vec<ForecastUrl> {
        let members: Vec<MemberKey> = match ensemble {
            EnsembleType::Median => return vec![self.file_url(variable, service, None)],
            EnsembleType::AllDays => DAYS
                .iter()
                .flat_map(|&day| {
                    MEMBERS.into_iter().flat_map(move |member| {
                        INIT_HOURS
                            .into_iter()
                            .map(move |hour| MemberKey::new(hour, member, day))
                    })
                })
                .collect(),
            EnsembleType::Day0 | EnsembleType::Day1 | EnsembleType::Day2 => {
                let day = ensemble.day().unwrap_or_default();
                INIT_HOURS
                    .into_iter()
                    .flat_map(|hour| {
                        MEMBERS
                            .into_iter()
                            .map(move |member| MemberKey::new(hour, member, day))
                    })
                    .collect()
            }
        };

        members
            .into_iter()
            .map(|m| self.file_url(variable, service, Some(m)))
            .collect()
    }

    /// Resolve from unvalidated names, reporting configuration errors.
    pub fn resolve_named(
        &self,
        variable: &str,
        ensemble: &str,
        service: RemoteService,
    ) -> Result<Vec<ForecastUrl>> {
        let variable = variable.parse::<VariableName>()?;
        let ensemble = ensemble.parse::<EnsembleType>()?;
        Ok(self.resolve(variable, ensemble, service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_counts() {
        let catalog = Catalog::default();
        for var in VariableName::ALL {
            let count = |e| catalog.resolve(var, e, RemoteService::Opendap).len();
            assert_eq!(count(EnsembleType::AllDays), 48);
            assert_eq!(count(EnsembleType::Day0), 16);
            assert_eq!(count(EnsembleType::Day1), 16);
            assert_eq!(count(EnsembleType::Day2), 16);
            assert_eq!(count(EnsembleType::Median), 1);
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let catalog = Catalog::default();
        for var in VariableName::ALL {
            for ens in EnsembleType::ALL {
                let a = catalog.resolve(var, ens, RemoteService::Opendap);
                let b = catalog.resolve(var, ens, RemoteService::Opendap);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_median_url() {
        let urls = Catalog::default().resolve(
            VariableName::Tmax,
            EnsembleType::Median,
            RemoteService::Opendap,
        );
        assert_eq!(
            urls[0].url,
            "http://thredds.northwestknowledge.net:8080/thredds/dodsC/\
             NWCSC_INTEGRATED_SCENARIOS_ALL_CLIMATE/cfsv2_metdata_90day/\
             cfsv2_metdata_forecast_tmmx_daily.nc"
        );
        assert_eq!(urls[0].member, None);
    }

    #[test]
    fn test_single_day_order() {
        let urls = Catalog::default().resolve(
            VariableName::Precip,
            EnsembleType::Day1,
            RemoteService::Http,
        );
        let names: Vec<&str> = urls.iter().map(|u| u.file_name()).collect();
        assert_eq!(names[0], "cfsv2_metdata_forecast_pr_daily_00_1_1.nc");
        assert_eq!(names[1], "cfsv2_metdata_forecast_pr_daily_00_2_1.nc");
        assert_eq!(names[4], "cfsv2_metdata_forecast_pr_daily_06_1_1.nc");
        assert_eq!(names[15], "cfsv2_metdata_forecast_pr_daily_18_4_1.nc");
        assert!(urls[0].url.contains("/thredds/fileServer/"));
        assert!(urls.iter().all(|u| u.member.map(|m| m.day) == Some(1)));
    }

    #[test]
    fn test_every_table_entry_is_resolved() {
        let keys: Vec<MemberKey> = Catalog::default()
            .resolve(VariableName::Tmax, EnsembleType::Day2, RemoteService::Opendap)
            .into_iter()
            .filter_map(|u| u.member)
            .collect();
        assert_eq!(keys.len(), INIT_HOURS.len() * MEMBERS.len());
        for hour in INIT_HOURS {
            for member in MEMBERS {
                assert!(keys.contains(&MemberKey::new(hour, member, 2)));
            }
        }
        assert_eq!(MemberKey::new(6, 3, 1).suffix(), "_06_3_1");
    }

    #[test]
    fn test_all_days_order() {
        let urls = Catalog::default().resolve(
            VariableName::Srad,
            EnsembleType::AllDays,
            RemoteService::Opendap,
        );
        let keys: Vec<MemberKey> = urls.iter().filter_map(|u| u.member).collect();
        assert_eq!(keys[0], MemberKey { init_hour: 0, member: 1, day: 0 });
        assert_eq!(keys[1], MemberKey { init_hour: 6, member: 1, day: 0 });
        assert_eq!(keys[4], MemberKey { init_hour: 0, member: 2, day: 0 });
        assert_eq!(keys[16], MemberKey { init_hour: 0, member: 1, day: 1 });
        assert_eq!(keys[47], MemberKey { init_hour: 18, member: 4, day: 2 });
    }

    #[test]
    fn test_resolve_named_errors() {
        let catalog = Catalog::default();
        let err = catalog
            .resolve_named("bogus_var", "day0", RemoteService::Opendap)
            .unwrap_err();
        assert!(err.is_config_error());
        let err = catalog
            .resolve_named("tmax", "9", RemoteService::Opendap)
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_data_url() {
        let catalog = Catalog::new("http", "localhost", 9000);
        assert_eq!(
            catalog.data_url(VariableName::Wind, RemoteService::Http),
            "http://localhost:9000/thredds/fileServer/\
             NWCSC_INTEGRATED_SCENARIOS_ALL_CLIMATE/cfsv2_metdata_90day/"
        );
    }
}
