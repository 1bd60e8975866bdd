//! gridmet-cfsv2 - fetch CFSv2 90-day forecasts from gridMET THREDDS
//!
//! This is the main entry point for the command-line tool.

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use gridmet_cfsv2::{
    init_tracing, level_for, log_timed_operation, map_to_hrus, Cfsv2Error, Config, Fetcher,
    HruWeights, HttpSource, OpendapSource, RemoteService, RemoteSource, Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, args) = Config::load()?;

    init_tracing(&level_for(args.quiet, args.verbose, &config.log_level));
    info!("Starting gridmet-cfsv2 v{}", env!("CARGO_PKG_VERSION"));

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    let range = args.date_range().map_err(|e| {
        error!("Invalid date range: {}", e);
        e
    })?;

    let source: Arc<dyn RemoteSource> = match config.remote.service {
        RemoteService::Http => Arc::new(HttpSource::new(config.http_source_config())?),
        RemoteService::Opendap => Arc::new(OpendapSource),
    };

    let fetcher = Fetcher::new(config.catalog(), source, config.fetch_options(range));
    info!(
        variable = %args.var,
        ensemble = fetcher.ensemble().description(),
        cache_dir = %fetcher.cache_dir().display(),
        "Fetching forecast"
    );

    let handle = fetcher.get(args.var).await.map_err(|e| {
        error!("Failed to fetch {}: {}", args.var, e);
        e
    })?;

    // Without explicit dates the whole forecast window is reported.
    let selected = if args.start.is_some() || args.end.is_some() {
        handle.select_dates(&range)?
    } else {
        handle.as_ref().clone()
    };
    if selected.time_len() == 0 {
        warn!("No forecast steps fall within {}", range);
    }

    if let Some(path) = &args.output {
        log_timed_operation("write_output", || selected.write_netcdf(path))?;
        info!("Wrote {}", path.display());
    }

    if config.hru.enabled {
        let weights_file =
            config
                .hru
                .weights_file
                .as_deref()
                .ok_or_else(|| Cfsv2Error::Config {
                    message: "HRU mapping requires a weights file".to_string(),
                })?;
        let weights = HruWeights::from_csv(weights_file)?;
        let series = log_timed_operation("hru_map", || {
            map_to_hrus(&selected, args.var, &weights, &config.hru.hru_ids)
        })?;
        series.write_csv(std::io::stdout().lock())?;
        return Ok(());
    }

    let data_variable = selected.primary_variable(args.var)?;
    let dates = selected.time_dates().unwrap_or_default();
    let summary = json!({
        "variable": args.var.key(),
        "data_variable": data_variable,
        "ensemble": fetcher.ensemble().as_str(),
        "range": { "start": range.start(), "end": range.end() },
        "time_steps": selected.time_len(),
        "members": selected.members().len(),
        "first_date": dates.first(),
        "last_date": dates.last(),
        "shape": selected.get_variable(data_variable).map(|a| a.shape().to_vec()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
