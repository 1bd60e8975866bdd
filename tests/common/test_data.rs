//! Test data generation utilities.
//!
//! Writes small CFSv2-shaped member files: a `day` record dimension in
//! days since 1900, a 2x3 lat/lon grid and one packed-style data variable.

use gridmet_cfsv2::{Catalog, EnsembleType, RemoteService, VariableName};
use std::path::Path;

use netcdf::Error;
type Result<T> = std::result::Result<T, Error>;

/// Days since 1900-01-01 of 2023-01-01.
pub const FIRST_DAY: f64 = 44925.0;

/// Time steps in every generated member.
pub const STEPS: usize = 3;

pub const LAT: [f64; 2] = [40.0, 41.0];
pub const LON: [f64; 3] = [-120.0, -119.0, -118.0];

/// Cells per time step.
pub const GRID_CELLS: usize = LAT.len() * LON.len();

/// Spacing between member offsets, so values identify their member.
pub const MEMBER_STRIDE: f32 = 1000.0;

/// Creates one member file. Values are `offset + flat index`.
pub fn create_member_nc(path: &Path, data_variable: &str, offset: f32) -> Result<()> {
    let mut file = netcdf::create(path)?;

    file.add_dimension("lat", LAT.len())?;
    file.add_dimension("lon", LON.len())?;
    file.add_unlimited_dimension("day")?;

    file.add_attribute("title", "CFSv2 90-day forecast test member")?;
    file.add_attribute("institution", "gridmet-cfsv2 test suite")?;

    {
        let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
        lat_var.put_attribute("units", "degrees_north")?;
        lat_var.put_values(&LAT, ..)?;
    }
    {
        let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
        lon_var.put_attribute("units", "degrees_east")?;
        lon_var.put_values(&LON, ..)?;
    }
    {
        let days: Vec<f64> = (0..STEPS).map(|k| FIRST_DAY + k as f64).collect();
        let mut day_var = file.add_variable::<f64>("day", &["day"])?;
        day_var.put_attribute("units", "days since 1900-01-01 00:00:00")?;
        day_var.put_values(&days, ..)?;
    }
    {
        let values: Vec<f32> = (0..STEPS * GRID_CELLS)
            .map(|i| offset + i as f32)
            .collect();
        let mut data_var = file.add_variable::<f32>(data_variable, &["day", "lat", "lon"])?;
        data_var.put_attribute("_FillValue", 32767.0f32)?;
        data_var.put_attribute("units", "K")?;
        data_var.put_values(&values, ..)?;
    }

    Ok(())
}

/// Lays out every member of `variable`/`ensemble` under `root` the way the
/// fileServer path maps onto disk. Member `k` in resolution order gets
/// offset `k * MEMBER_STRIDE`. Files named in `skip` are left out.
pub fn write_forecast_tree(
    root: &Path,
    variable: VariableName,
    ensemble: EnsembleType,
    skip: &[&str],
) -> std::result::Result<usize, Box<dyn std::error::Error>> {
    let dir = root.join(variable.dataset_path());
    std::fs::create_dir_all(&dir)?;

    let urls = Catalog::default().resolve(variable, ensemble, RemoteService::Http);
    let mut written = 0;
    for (k, url) in urls.iter().enumerate() {
        if skip.contains(&url.file_name()) {
            continue;
        }
        let offset = k as f32 * MEMBER_STRIDE;
        create_member_nc(&dir.join(url.file_name()), variable.data_variable(), offset)?;
        written += 1;
    }
    Ok(written)
}
