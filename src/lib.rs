//! # gridmet-cfsv2
//!
//! Fetch CFSv2 90-day meteorological forecast ensembles from the gridMET
//! THREDDS server and expose them as in-memory multi-dimensional arrays.
//!
//! ## Key Features
//!
//! - **Catalog resolution**: deterministic URL lists per variable and ensemble selection
//! - **Lazy fetching**: one remote fetch per variable for the lifetime of a [`Fetcher`]
//! - **Disk cache**: atomically written `{var}_{start}_{end}.nc` entries
//! - **HRU remapping**: area-weighted aggregation of grid cells onto hydrologic response units
//!
//! ## Architecture
//!
//! - **Catalog**: static variable tables and URL construction
//! - **Sources**: HTTP download or OPeNDAP access to member files
//! - **Fetcher**: concurrent member retrieval merged in catalog order, plus cache management

pub mod cache;
pub mod catalog;
pub mod config;
pub mod data_loader;
pub mod dataset;
pub mod dates;
pub mod ensemble;
pub mod error;
pub mod fetcher;
pub mod hru;
pub mod logging;
pub mod source;
pub mod variable;

pub use cache::{clear_cache, list_cache, CacheEntry};
pub use catalog::{Catalog, ForecastUrl, MemberKey, RemoteService};
pub use config::Config;
pub use dataset::{ForecastDataset, ForecastHandle};
pub use dates::DateRange;
pub use ensemble::EnsembleType;
pub use error::{Cfsv2Error, ErrorCategory, Result};
pub use fetcher::{FetchLimits, FetchOptions, Fetcher};
pub use hru::{map_to_hrus, HruSeries, HruWeights};
pub use logging::{
    init_tracing, level_for, log_error, log_fetch_stats, log_operation_end, log_operation_start,
    log_timed_operation,
};
pub use source::{HttpSource, HttpSourceConfig, OpendapSource, RemoteSource};
pub use variable::VariableName;
