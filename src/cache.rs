//! On-disk forecast cache.
//!
//! Cache entries are NetCDF files named `{variable}_{start}_{end}.nc` with
//! ISO dates. Listing is best effort: files whose names do not parse, name
//! an unknown variable or carry an invalid date are skipped silently.
//! Writes go to a hidden temp file that is renamed into place, so a listing
//! never sees a partially written entry.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dataset::ForecastDataset;
use crate::dates::{parse_iso_date, DateRange};
use crate::error::Result;
use crate::variable::VariableName;

const CACHE_EXTENSION: &str = "nc";
const DEFAULT_CACHE_DIR: &str = ".gridmet";

/// A valid cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub variable: VariableName,
    pub range: DateRange,
}

/// `$HOME/.gridmet`, or `./.gridmet` when no home directory is known.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CACHE_DIR)
}

/// File name of the cache entry for a variable and date range.
pub fn cache_file_name(variable: VariableName, range: &DateRange) -> String {
    format!("{}_{}.{}", variable.key(), range, CACHE_EXTENSION)
}

/// Full path of the cache entry for a variable and date range.
pub fn cache_path(cache_dir: &Path, variable: VariableName, range: &DateRange) -> PathBuf {
    cache_dir.join(cache_file_name(variable, range))
}

/// Parse a cache file name back into its variable and date range.
pub fn parse_cache_file_name(name: &str) -> Option<(VariableName, DateRange)> {
    let stem = name.strip_suffix(".nc")?;
    let mut parts = stem.rsplitn(3, '_');
    let end = parts.next()?;
    let start = parts.next()?;
    let var = parts.next()?;

    if !var.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return None;
    }
    let variable = var.parse::<VariableName>().ok()?;
    let range = DateRange::unchecked(parse_iso_date(start).ok()?, parse_iso_date(end).ok()?);
    Some((variable, range))
}

/// List valid cache entries, optionally for one variable, sorted by name.
///
/// A missing cache directory holds no entries.
pub fn list_cache(cache_dir: &Path, variable: Option<VariableName>) -> Result<Vec<CacheEntry>> {
    if !cache_dir.is_dir() {
        debug!(dir = %cache_dir.display(), "Cache directory does not exist");
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for item in std::fs::read_dir(cache_dir)? {
        let item = item?;
        if !item.file_type()?.is_file() {
            continue;
        }
        let file_name = item.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((var, range)) = parse_cache_file_name(name) else {
            continue;
        };
        if variable.is_some_and(|wanted| wanted != var) {
            continue;
        }
        entries.push(CacheEntry {
            path: item.path(),
            variable: var,
            range,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Delete every valid cache entry, returning how many were removed.
pub fn clear_cache(cache_dir: &Path) -> Result<usize> {
    let entries = list_cache(cache_dir, None)?;
    for entry in &entries {
        std::fs::remove_file(&entry.path)?;
    }
    if !entries.is_empty() {
        info!(
            dir = %cache_dir.display(),
            removed = entries.len(),
            "Cleared forecast cache"
        );
    }
    Ok(entries.len())
}

/// Persist a dataset as a cache entry: write a temp file, then rename.
pub fn write_entry(
    cache_dir: &Path,
    variable: VariableName,
    range: &DateRange,
    dataset: &ForecastDataset,
) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;
    let final_name = cache_file_name(variable, range);
    let final_path = cache_dir.join(&final_name);
    let temp_path = cache_dir.join(format!(".{}.{}.tmp", final_name, Uuid::new_v4()));

    if let Err(e) = dataset.write_netcdf(&temp_path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&temp_path, &final_path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    debug!(path = %final_path.display(), "Wrote cache entry");
    Ok(final_path)
}
