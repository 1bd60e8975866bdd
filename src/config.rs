//! Configuration management for gridmet-cfsv2.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::default_cache_dir;
use crate::catalog::{Catalog, RemoteService, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SCHEME};
use crate::dates::{parse_iso_date, DateRange};
use crate::ensemble::EnsembleType;
use crate::error::{Cfsv2Error, Result};
use crate::fetcher::{FetchLimits, FetchOptions};
use crate::source::HttpSourceConfig;
use crate::variable::VariableName;

/// Command-line arguments for gridmet-cfsv2
#[derive(Parser, Debug)]
#[command(name = "gridmet-cfsv2")]
#[command(author, version, about = "Fetch CFSv2 90-day forecast ensembles from gridMET THREDDS", long_about = None)]
pub struct Args {
    /// Variable to fetch (tmax, tmin, precip, wind, sph, srad)
    #[arg(value_parser = parse_variable_arg)]
    pub var: VariableName,

    /// Don't emit non-error messages to stderr. Errors are still emitted,
    /// silence those with 2>/dev/null.
    #[arg(short, long)]
    pub quiet: bool,

    /// Also emit status messages to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Start date [default: yesterday]
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date_arg)]
    pub start: Option<NaiveDate>,

    /// End date [default: yesterday]
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date_arg)]
    pub end: Option<NaiveDate>,

    /// Ensemble selection (day0, day1, day2, all, median or 0-4)
    #[arg(short, long, env = "GRIDMET_ENSEMBLE", value_parser = parse_ensemble_arg)]
    pub ensemble: Option<EnsembleType>,

    /// Cache directory [default: ~/.gridmet]
    #[arg(long, env = "GRIDMET_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Neither read nor write the on-disk cache
    #[arg(long)]
    pub no_cache: bool,

    /// Map gridded values to HRUs
    #[arg(long)]
    pub hrumap: bool,

    /// HRU ids to report, comma separated [default: all in the weights file]
    #[arg(long = "hru-ids", alias = "hru_ids", value_delimiter = ',')]
    pub hru_ids: Vec<i64>,

    /// Weights file mapping grid cells to HRUs
    #[arg(long = "wght-file", alias = "wght_file", value_name = "path_to_file.csv")]
    pub wght_file: Option<PathBuf>,

    /// Path to JSON configuration file
    #[arg(long = "config-file", alias = "config_file", env = "GRIDMET_CONFIG", value_name = "path_to_file.json")]
    pub config_file: Option<PathBuf>,

    /// Write the selected forecast to this NetCDF file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// THREDDS host
    #[arg(long, env = "GRIDMET_HOST")]
    pub host: Option<String>,

    /// THREDDS port
    #[arg(long, env = "GRIDMET_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GRIDMET_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    /// The requested date range.
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::from_options(self.start, self.end)
    }
}

fn parse_variable_arg(value: &str) -> std::result::Result<VariableName, String> {
    value.parse().map_err(|e: Cfsv2Error| e.to_string())
}

fn parse_date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_iso_date(value).map_err(|e| e.to_string())
}

fn parse_ensemble_arg(value: &str) -> std::result::Result<EnsembleType, String> {
    value.parse().map_err(|e: Cfsv2Error| e.to_string())
}

/// Remote server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// THREDDS access service
    #[serde(default)]
    pub service: RemoteService,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (None = ~/.gridmet)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Fetch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub ensemble: EnsembleType,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_fetch_deadline")]
    pub fetch_deadline_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub initial_retry_delay_ms: u64,
}

/// HRU mapping configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HruConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub weights_file: Option<PathBuf>,

    #[serde(default)]
    pub hru_ids: Vec<i64>,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub hru: HruConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<(Self, Args)> {
        let args = Args::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args))
    }

    /// Build the configuration for already-parsed arguments.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Config::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Cfsv2Error::Config {
            message: format!("cannot read config file {}: {}", path.display(), e),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override file/default values with explicit arguments.
    fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.remote.host = host.clone();
        }
        if let Some(port) = args.port {
            self.remote.port = port;
        }
        if let Some(ensemble) = args.ensemble {
            self.fetch.ensemble = ensemble;
        }
        if let Some(dir) = &args.cache_dir {
            self.cache.dir = Some(dir.clone());
        }
        if args.no_cache {
            self.cache.enabled = false;
        }
        if args.hrumap {
            self.hru.enabled = true;
        }
        if let Some(path) = &args.wght_file {
            self.hru.weights_file = Some(path.clone());
        }
        if !args.hru_ids.is_empty() {
            self.hru.hru_ids = args.hru_ids.clone();
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote.host.is_empty() {
            return Err(Cfsv2Error::Config {
                message: "Remote host cannot be empty".to_string(),
            });
        }

        if self.remote.port == 0 {
            return Err(Cfsv2Error::Config {
                message: "Remote port cannot be 0".to_string(),
            });
        }

        match self.remote.scheme.as_str() {
            "http" | "https" => {}
            other => {
                return Err(Cfsv2Error::Config {
                    message: format!("Invalid scheme: {}. Must be http or https", other),
                });
            }
        }

        if self.fetch.max_concurrent == 0 {
            return Err(Cfsv2Error::Config {
                message: "max_concurrent must be at least 1".to_string(),
            });
        }

        if self.fetch.request_timeout_secs == 0 || self.fetch.fetch_deadline_secs == 0 {
            return Err(Cfsv2Error::Config {
                message: "Timeouts must be greater than zero".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(Cfsv2Error::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        if self.hru.enabled {
            match &self.hru.weights_file {
                None => {
                    return Err(Cfsv2Error::Config {
                        message: "HRU mapping requires a weights file".to_string(),
                    });
                }
                Some(path) if !path.is_file() => {
                    return Err(Cfsv2Error::Config {
                        message: format!("Weights file not found: {}", path.display()),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.remote.scheme, &self.remote.host, self.remote.port)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn fetch_options(&self, range: DateRange) -> FetchOptions {
        FetchOptions {
            cache_dir: self.cache_dir(),
            ensemble: self.fetch.ensemble,
            range,
            use_cache: self.cache.enabled,
            limits: FetchLimits {
                max_concurrent: self.fetch.max_concurrent,
                request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
                fetch_deadline: Duration::from_secs(self.fetch.fetch_deadline_secs),
            },
        }
    }

    pub fn http_source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            max_retries: self.fetch.max_retries,
            initial_retry_delay: Duration::from_millis(self.fetch.initial_retry_delay_ms),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            hru: HruConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            service: RemoteService::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            enabled: true,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleType::default(),
            max_concurrent: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
            fetch_deadline_secs: default_fetch_deadline(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_retry_delay(),
        }
    }
}

// Default value functions for serde
fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    600
}

fn default_fetch_deadline() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["gridmet-cfsv2"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.remote.host, "thredds.northwestknowledge.net");
        assert_eq!(config.remote.port, 8080);
        assert_eq!(config.remote.service, RemoteService::Opendap);
        assert_eq!(config.fetch.ensemble, EnsembleType::Day0);
        assert!(config.cache.enabled);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_parsing() {
        let a = args(&[
            "tmax",
            "--start",
            "2023-01-01",
            "--end",
            "2023-01-05",
            "--hru-ids",
            "3,5,8",
            "-e",
            "median",
        ]);
        assert_eq!(a.var, VariableName::Tmax);
        assert_eq!(a.hru_ids, vec![3, 5, 8]);
        assert_eq!(a.ensemble, Some(EnsembleType::Median));
        let range = a.date_range().unwrap();
        assert_eq!(range.to_string(), "2023-01-01_2023-01-05");
    }

    #[test]
    fn test_args_reject_bad_input() {
        let parse = |argv: &[&str]| Args::try_parse_from(argv.iter().copied());
        assert!(parse(&["gridmet-cfsv2", "bogus_var"]).is_err());
        assert!(parse(&["gridmet-cfsv2", "tmin", "--start", "01/02/2023"]).is_err());
        assert!(parse(&["gridmet-cfsv2", "tmin", "--ensemble", "9"]).is_err());
    }

    #[test]
    fn test_dates_default_to_yesterday() {
        let range = args(&["precip"]).date_range().unwrap();
        assert_eq!(range, DateRange::yesterday());

        let reversed = args(&["precip", "--start", "2023-01-05", "--end", "2023-01-01"]);
        assert!(reversed.date_range().is_err());
    }

    #[test]
    fn test_file_then_args_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"remote": {{"host": "file-host", "service": "http"}},
                "fetch": {{"ensemble": "all", "max_concurrent": 8}},
                "log_level": "warn"}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::from_args(&args(&["tmax", "--config-file", &path])).unwrap();
        assert_eq!(config.remote.host, "file-host");
        assert_eq!(config.remote.port, 8080);
        assert_eq!(config.remote.service, RemoteService::Http);
        assert_eq!(config.fetch.ensemble, EnsembleType::AllDays);
        assert_eq!(config.fetch.max_concurrent, 8);
        assert_eq!(config.log_level, "warn");

        let config = Config::from_args(&args(&[
            "tmax",
            "--config-file",
            &path,
            "--host",
            "cli-host",
            "--ensemble",
            "day1",
            "--no-cache",
        ]))
        .unwrap();
        assert_eq!(config.remote.host, "cli-host");
        assert_eq!(config.fetch.ensemble, EnsembleType::Day1);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_args(&args(&["tmax", "--config-file", "/nonexistent.json"]))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.remote.host = "".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.remote.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetch.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.hru.enabled = true;
        assert!(config.validate().is_err());

        config.hru.weights_file = Some(PathBuf::from("/nonexistent/weights.csv"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fetch_options() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/tmp/gridmet-test"));
        config.fetch.request_timeout_secs = 5;
        let options = config.fetch_options(DateRange::yesterday());
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/gridmet-test"));
        assert_eq!(options.limits.request_timeout, Duration::from_secs(5));
        assert_eq!(config.http_source_config().max_retries, 3);
    }
}
