//! Lazy, cache-aware forecast fetcher.
//!
//! A [`Fetcher`] owns one slot per [`VariableName`]. The first `get` for a
//! variable fills its slot, from the on-disk cache when a matching entry
//! exists and from the remote server otherwise; later calls return the same
//! handle without touching the network. Concurrent callers of `get` for the
//! same variable share a single fetch.

use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{self, default_cache_dir};
use crate::catalog::{Catalog, ForecastUrl};
use crate::data_loader;
use crate::dataset::{AttributeValue, ForecastDataset, ForecastHandle};
use crate::dates::DateRange;
use crate::ensemble::EnsembleType;
use crate::error::{Cfsv2Error, Result};
use crate::logging::{log_error, log_fetch_stats, log_operation_end, log_operation_start};
use crate::source::RemoteSource;
use crate::variable::VariableName;

/// Global attribute recording the ensemble selection of a cached dataset.
pub const ENSEMBLE_ATTR: &str = "ensemble_type";

/// Concurrency and time limits for one combined fetch.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Member downloads in flight at once
    pub max_concurrent: usize,
    /// Bound on retrieving a single member, retries included
    pub request_timeout: Duration,
    /// Bound on the whole combined fetch
    pub fetch_deadline: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            request_timeout: Duration::from_secs(600),
            fetch_deadline: Duration::from_secs(3600),
        }
    }
}

/// Per-fetcher settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub cache_dir: PathBuf,
    pub ensemble: EnsembleType,
    /// Names the cache entry; the remote window is always the full forecast.
    pub range: DateRange,
    pub use_cache: bool,
    pub limits: FetchLimits,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            ensemble: EnsembleType::default(),
            range: DateRange::yesterday(),
            use_cache: true,
            limits: FetchLimits::default(),
        }
    }
}

/// Lazily loads and memoizes forecast datasets per variable.
pub struct Fetcher {
    catalog: Catalog,
    source: Arc<dyn RemoteSource>,
    options: FetchOptions,
    slots: HashMap<VariableName, OnceCell<ForecastHandle>>,
}

impl Fetcher {
    pub fn new(catalog: Catalog, source: Arc<dyn RemoteSource>, options: FetchOptions) -> Self {
        let slots = VariableName::ALL
            .into_iter()
            .map(|v| (v, OnceCell::new()))
            .collect();
        Self {
            catalog,
            source,
            options,
            slots,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.options.cache_dir
    }

    pub fn ensemble(&self) -> EnsembleType {
        self.options.ensemble
    }

    pub fn range(&self) -> &DateRange {
        &self.options.range
    }

    /// Return the dataset for `variable`, loading it on first use.
    pub async fn get(&self, variable: VariableName) -> Result<ForecastHandle> {
        let slot = self.slots.get(&variable).ok_or_else(|| Cfsv2Error::Config {
            message: format!("no slot for variable {}", variable),
        })?;
        let handle = slot
            .get_or_try_init(|| async { self.load(variable).await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// [`Fetcher::get`] for an unparsed variable name.
    pub async fn get_named(&self, name: &str) -> Result<ForecastHandle> {
        self.get(name.parse()?).await
    }

    /// The handle for `variable` if it has already been loaded.
    pub fn loaded(&self, variable: VariableName) -> Option<ForecastHandle> {
        self.slots.get(&variable)?.get().cloned()
    }

    /// Load every variable now instead of on first access.
    pub async fn preload(&self) -> Result<()> {
        for variable in VariableName::ALL {
            self.get(variable).await?;
        }
        Ok(())
    }

    pub async fn tmax(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Tmax).await
    }

    pub async fn tmin(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Tmin).await
    }

    pub async fn prcp(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Precip).await
    }

    pub async fn wind_speed(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Wind).await
    }

    pub async fn specific_humidity(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Sph).await
    }

    pub async fn srad(&self) -> Result<ForecastHandle> {
        self.get(VariableName::Srad).await
    }

    async fn load(&self, variable: VariableName) -> Result<ForecastDataset> {
        let options = &self.options;
        if options.use_cache {
            if let Some(dataset) = self.read_cached(variable).await {
                return Ok(dataset);
            }
        }

        let started = Instant::now();
        let details = format!("{} ({})", variable, options.ensemble.description());
        log_operation_start("fetch_forecast", Some(&details));

        let result = Self::fetch_var(
            self.source.as_ref(),
            &self.catalog,
            variable.key(),
            &options.cache_dir,
            options.ensemble,
            &options.limits,
        )
        .await;
        log_operation_end("fetch_forecast", started, result.is_ok());

        let mut dataset = result.map_err(|e| {
            log_error(&e, "fetch_forecast");
            e
        })?;
        dataset.set_global_attribute(
            ENSEMBLE_ATTR,
            AttributeValue::Text(options.ensemble.as_str().to_string()),
        );
        log_fetch_stats(
            variable.key(),
            options.ensemble.as_str(),
            dataset.members().len(),
            dataset.time_len(),
            started,
        );

        if options.use_cache {
            self.write_cached(variable, &dataset).await;
        }
        Ok(dataset)
    }

    async fn read_cached(&self, variable: VariableName) -> Option<ForecastDataset> {
        let path = cache::cache_path(&self.options.cache_dir, variable, &self.options.range);
        if !path.is_file() {
            return None;
        }

        let loaded = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || data_loader::load_netcdf(&path)).await
        };
        let dataset = match loaded {
            Ok(Ok(dataset)) => dataset,
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache read task failed");
                return None;
            }
        };

        let wanted = self.options.ensemble.as_str();
        match dataset.global_attribute(ENSEMBLE_ATTR) {
            Some(AttributeValue::Text(found)) if found == wanted => {
                debug!(path = %path.display(), "Using cached forecast");
                Some(dataset)
            }
            other => {
                debug!(
                    path = %path.display(),
                    cached = ?other,
                    wanted = wanted,
                    "Cache entry holds a different ensemble selection"
                );
                None
            }
        }
    }

    async fn write_cached(&self, variable: VariableName, dataset: &ForecastDataset) {
        let dir = self.options.cache_dir.clone();
        let range = self.options.range;
        let dataset = dataset.clone();
        let written = tokio::task::spawn_blocking(move || {
            cache::write_entry(&dir, variable, &range, &dataset)
        })
        .await;

        match written {
            Ok(Ok(path)) => debug!(path = %path.display(), "Cached forecast"),
            Ok(Err(e)) => warn!(variable = %variable, error = %e, "Failed to write cache entry"),
            Err(e) => warn!(variable = %variable, error = %e, "Cache write task failed"),
        }
    }

    /// Resolve and retrieve every member of `name` for `ensemble`, and
    /// combine them in resolution order.
    ///
    /// `cache_dir` is created if needed and hosts a staging directory that
    /// is removed before returning. Any failed member fails the whole call.
    pub async fn fetch_var(
        source: &dyn RemoteSource,
        catalog: &Catalog,
        name: &str,
        cache_dir: &Path,
        ensemble: EnsembleType,
        limits: &FetchLimits,
    ) -> Result<ForecastDataset> {
        let variable: VariableName = name.parse()?;
        let urls = catalog.resolve(variable, ensemble, source.service());
        debug!(
            variable = %variable,
            ensemble = %ensemble,
            members = urls.len(),
            "Resolved forecast members"
        );

        tokio::fs::create_dir_all(cache_dir).await?;
        let staging = cache_dir.join(format!(".staging-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        let fetched = tokio::time::timeout(
            limits.fetch_deadline,
            fetch_members(source, &urls, &staging, limits),
        )
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
        }

        let parts = match fetched {
            Ok(parts) => parts?,
            Err(_) => {
                return Err(Cfsv2Error::Timeout {
                    message: format!(
                        "fetching {} members of {} exceeded {:?}",
                        urls.len(),
                        variable,
                        limits.fetch_deadline
                    ),
                })
            }
        };

        ForecastDataset::concat_time(parts)
    }
}

/// Retrieve members concurrently; results come back in `urls` order.
async fn fetch_members(
    source: &dyn RemoteSource,
    urls: &[ForecastUrl],
    staging: &Path,
    limits: &FetchLimits,
) -> Result<Vec<ForecastDataset>> {
    futures::stream::iter(urls)
        .map(|url| async move {
            match tokio::time::timeout(limits.request_timeout, source.fetch(url, staging)).await {
                Ok(result) => result,
                Err(_) => Err(Cfsv2Error::Timeout {
                    message: format!("{} after {:?}", url.url, limits.request_timeout),
                }),
            }
        })
        .buffered(limits.max_concurrent.max(1))
        .try_collect()
        .await
}
