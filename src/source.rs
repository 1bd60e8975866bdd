//! Remote access to forecast member files.
//!
//! A [`RemoteSource`] turns one resolved [`ForecastUrl`] into a loaded
//! [`ForecastDataset`]. Two implementations exist:
//! - [`HttpSource`] downloads whole files from the THREDDS `fileServer`
//!   service, with retry and exponential backoff
//! - [`OpendapSource`] opens the `dodsC` endpoint through the netCDF library

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{ForecastUrl, RemoteService};
use crate::data_loader;
use crate::dataset::ForecastDataset;
use crate::error::{Cfsv2Error, Result};

/// Client-side flag asking the netCDF DAP client to tolerate fill value
/// type mismatches in the served files.
const FILL_MISMATCH: &str = "#fillmismatch";

/// Something that can retrieve a single member dataset.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// THREDDS service this source reads from.
    fn service(&self) -> RemoteService;

    /// Retrieve and load one member. `staging_dir` is a scratch directory
    /// owned by the current fetch.
    async fn fetch(&self, url: &ForecastUrl, staging_dir: &Path) -> Result<ForecastDataset>;
}

/// Retry and timeout settings for HTTP downloads.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Downloads member files over plain HTTP.
pub struct HttpSource {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client, config })
    }

    /// Download `url` to `dest`, retrying transient failures.
    #[instrument(skip(self, dest), fields(url = %url))]
    pub async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match self.download_once(url, dest).await {
                Ok(bytes) => {
                    debug!(bytes = bytes, path = %dest.display(), "Download completed");
                    return Ok(());
                }
                Err(e) if !is_transient(&e) => return Err(e),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        return Err(Cfsv2Error::Remote {
                            url: url.to_string(),
                            message: format!("failed after {} retries: {}", retry_count - 1, e),
                        });
                    }

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// Stream one response into `dest` via a `.part` file.
    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Cfsv2Error::Remote {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let partial = partial_path(dest);
        let mut file = fs::File::create(&partial).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&partial, dest).await?;
        Ok(written)
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn service(&self) -> RemoteService {
        RemoteService::Http
    }

    async fn fetch(&self, url: &ForecastUrl, staging_dir: &Path) -> Result<ForecastDataset> {
        let dest = staging_dir.join(url.file_name());
        self.download(&url.url, &dest).await?;

        let member = url.member;
        let dataset = tokio::task::spawn_blocking(move || data_loader::load_netcdf(&dest))
            .await
            .map_err(|e| Cfsv2Error::Data {
                message: format!("loader task failed: {}", e),
            })??;
        Ok(dataset.with_member(member))
    }
}

/// Reads members through OPeNDAP.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpendapSource;

#[async_trait]
impl RemoteSource for OpendapSource {
    fn service(&self) -> RemoteService {
        RemoteService::Opendap
    }

    async fn fetch(&self, url: &ForecastUrl, _staging_dir: &Path) -> Result<ForecastDataset> {
        let target = format!("{}{}", url.url, FILL_MISMATCH);
        let member = url.member;
        info!(url = %url.url, "Opening OPeNDAP dataset");

        let dataset = tokio::task::spawn_blocking(move || data_loader::open_remote(&target))
            .await
            .map_err(|e| Cfsv2Error::Data {
                message: format!("loader task failed: {}", e),
            })?
            .map_err(|e| Cfsv2Error::Remote {
                url: url.url.clone(),
                message: e.to_string(),
            })?;
        Ok(dataset.with_member(member))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Missing files are final; connection problems and server errors are not.
fn is_transient(error: &Cfsv2Error) -> bool {
    match error {
        Cfsv2Error::Http(e) => !e.is_builder(),
        Cfsv2Error::Remote { message, .. } => {
            message.starts_with("HTTP 5")
                || message.starts_with(&format!("HTTP {}", StatusCode::TOO_MANY_REQUESTS))
        }
        Cfsv2Error::Io(_) => true,
        _ => false,
    }
}
