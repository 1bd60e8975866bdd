//! Grid-to-HRU remapping.
//!
//! A weights file assigns fractions of grid cells to hydrologic response
//! units. Each HRU value is the weighted mean of its cells' valid values:
//! `Σ w·v / Σ w`, skipping non-finite and fill values.

use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::dataset::ForecastDataset;
use crate::error::{Cfsv2Error, Result};
use crate::variable::VariableName;

/// One row of the weights file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeightRecord {
    pub hru_id: i64,
    /// Row index along the latitude axis
    pub i: usize,
    /// Column index along the longitude axis
    pub j: usize,
    pub wght: f64,
}

/// Cell weights grouped by HRU, in first-appearance order.
#[derive(Debug, Clone, Default)]
pub struct HruWeights {
    order: Vec<i64>,
    cells: HashMap<i64, Vec<(usize, usize, f64)>>,
}

impl HruWeights {
    /// Read a `hru_id,i,j,wght` CSV file.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut weights = Self::default();
        for record in rdr.deserialize() {
            let record: WeightRecord = record?;
            weights.push(record);
        }
        debug!(hrus = weights.order.len(), "Loaded HRU weights");
        Ok(weights)
    }

    pub fn push(&mut self, record: WeightRecord) {
        let cells = self.cells.entry(record.hru_id).or_insert_with(|| {
            self.order.push(record.hru_id);
            Vec::new()
        });
        cells.push((record.i, record.j, record.wght));
    }

    /// HRU ids in file order.
    pub fn hru_ids(&self) -> &[i64] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// HRU-aggregated values of one variable.
#[derive(Debug, Clone)]
pub struct HruSeries {
    pub variable: String,
    pub hru_ids: Vec<i64>,
    /// Decoded step dates, when the time coordinate has CF units
    pub dates: Option<Vec<NaiveDate>>,
    /// Shape `(time, hru)`
    pub values: Array2<f32>,
}

impl HruSeries {
    /// Write as CSV: one row per time step, one column per HRU.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["time".to_string()];
        header.extend(self.hru_ids.iter().map(|id| id.to_string()));
        wtr.write_record(&header)?;

        for (step, row) in self.values.axis_iter(Axis(0)).enumerate() {
            let label = match self.dates.as_ref().and_then(|dates| dates.get(step)) {
                Some(date) => date.to_string(),
                None => step.to_string(),
            };
            let mut record = vec![label];
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Aggregate `variable` onto HRUs. An empty `hru_ids` means every HRU in
/// the weights file.
pub fn map_to_hrus(
    dataset: &ForecastDataset,
    variable: VariableName,
    weights: &HruWeights,
    hru_ids: &[i64],
) -> Result<HruSeries> {
    let ids: Vec<i64> = if hru_ids.is_empty() {
        weights.hru_ids().to_vec()
    } else {
        hru_ids.to_vec()
    };
    if let Some(missing) = ids.iter().find(|id| !weights.cells.contains_key(id)) {
        return Err(Cfsv2Error::InvalidParameter {
            param: "hru_ids".to_string(),
            message: format!("HRU {} is not in the weights file", missing),
        });
    }

    let name = dataset.primary_variable(variable)?;
    let meta = dataset.get_variable_metadata(name).ok_or_else(|| Cfsv2Error::Data {
        message: format!("no metadata for {}", name),
    })?;
    let time_axis = meta
        .dimensions
        .iter()
        .position(|d| d == dataset.time_dimension())
        .ok_or_else(|| Cfsv2Error::Data {
            message: format!("{} does not span {}", name, dataset.time_dimension()),
        })?;
    if meta.dimensions.len() != 3 {
        return Err(Cfsv2Error::Data {
            message: format!(
                "{} has dimensions {:?}; expected time and two grid axes",
                name, meta.dimensions
            ),
        });
    }

    let fills: Vec<f32> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|attr| meta.number_attribute(attr))
        .map(|v| v as f32)
        .collect();
    let is_valid = |v: f32| v.is_finite() && !fills.contains(&v);

    let array = dataset.get_variable_checked(name)?;
    let steps = array.shape()[time_axis];
    let mut values = Array2::<f32>::from_elem((steps, ids.len()), f32::NAN);

    for (step, grid) in array.axis_iter(Axis(time_axis)).enumerate() {
        for (col, id) in ids.iter().enumerate() {
            let mut weighted = 0.0f64;
            let mut total = 0.0f64;
            for &(i, j, w) in &weights.cells[id] {
                let v = *grid.get(&[i, j][..]).ok_or_else(|| Cfsv2Error::Data {
                    message: format!(
                        "HRU {} references cell ({}, {}) outside grid {:?}",
                        id,
                        i,
                        j,
                        grid.shape()
                    ),
                })?;
                if is_valid(v) {
                    weighted += w * f64::from(v);
                    total += w;
                }
            }
            if total > 0.0 {
                values[[step, col]] = (weighted / total) as f32;
            }
        }
    }

    Ok(HruSeries {
        variable: name.to_string(),
        hru_ids: ids,
        dates: dataset.time_dates().ok(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::grid_dataset;

    const WEIGHTS: &str = "hru_id,i,j,wght\n\
                           10,0,0,0.5\n\
                           10,0,1,0.5\n\
                           20,1,1,1.0\n\
                           30, 1, 0, 0.25\n";

    #[test]
    fn test_weights_parsing() {
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        assert_eq!(weights.hru_ids(), &[10, 20, 30]);
        assert_eq!(weights.cells[&30], vec![(1, 0, 0.25)]);
    }

    #[test]
    fn test_map_to_hrus() {
        // 2 steps on a 2x2 grid: step 0 holds 0..4, step 1 holds 4..8.
        let ds = grid_dataset("air_temperature", 0.0, 2, 2, 2, 0.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();

        let series = map_to_hrus(&ds, VariableName::Tmax, &weights, &[]).unwrap();
        assert_eq!(series.values.shape(), &[2, 3]);
        assert_eq!(series.values[[0, 0]], 0.5);
        assert_eq!(series.values[[0, 1]], 3.0);
        assert_eq!(series.values[[0, 2]], 2.0);
        assert_eq!(series.values[[1, 0]], 4.5);
        assert_eq!(series.dates.as_ref().unwrap()[1].to_string(), "2023-01-02");

        let subset = map_to_hrus(&ds, VariableName::Tmax, &weights, &[20]).unwrap();
        assert_eq!(subset.hru_ids, vec![20]);
        assert_eq!(subset.values[[1, 0]], 7.0);
    }

    #[test]
    fn test_unknown_hru_id() {
        let ds = grid_dataset("air_temperature", 0.0, 1, 2, 2, 0.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        let err = map_to_hrus(&ds, VariableName::Tmax, &weights, &[99]).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_cell_outside_grid() {
        let ds = grid_dataset("air_temperature", 0.0, 1, 2, 2, 0.0);
        let weights = HruWeights::from_reader("hru_id,i,j,wght\n1,5,5,1.0\n".as_bytes()).unwrap();
        let err = map_to_hrus(&ds, VariableName::Tmax, &weights, &[]).unwrap_err();
        assert!(matches!(err, Cfsv2Error::Data { .. }));
    }

    #[test]
    fn test_fill_values_skipped() {
        // Offset 32767 makes cell (0, 0) of step 0 equal the fill value.
        let ds = grid_dataset("air_temperature", 0.0, 1, 2, 2, 32767.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        let series = map_to_hrus(&ds, VariableName::Tmax, &weights, &[10]).unwrap();
        assert_eq!(series.values[[0, 0]], 32768.0);

        let only_fill = HruWeights::from_reader("hru_id,i,j,wght\n1,0,0,1.0\n".as_bytes()).unwrap();
        let series = map_to_hrus(&ds, VariableName::Tmax, &only_fill, &[]).unwrap();
        assert!(series.values[[0, 0]].is_nan());
    }

    #[test]
    fn test_undecodable_time_falls_back_to_step_labels() {
        let ds = grid_dataset("air_temperature", f64::MAX, 2, 2, 2, 0.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        let series = map_to_hrus(&ds, VariableName::Tmax, &weights, &[20]).unwrap();
        assert!(series.dates.is_none());

        let mut out = Vec::new();
        series.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "time,20\n0,3\n1,7\n");
    }

    #[test]
    fn test_write_csv() {
        let ds = grid_dataset("air_temperature", 0.0, 1, 2, 2, 0.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        let series = map_to_hrus(&ds, VariableName::Tmax, &weights, &[20, 10]).unwrap();

        let mut out = Vec::new();
        series.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "time,20,10\n2023-01-01,3,0.5\n");
    }

    #[test]
    fn test_write_csv_with_short_date_list() {
        let ds = grid_dataset("air_temperature", 0.0, 2, 2, 2, 0.0);
        let weights = HruWeights::from_reader(WEIGHTS.as_bytes()).unwrap();
        let mut series = map_to_hrus(&ds, VariableName::Tmax, &weights, &[20]).unwrap();
        series.dates.as_mut().unwrap().truncate(1);

        let mut out = Vec::new();
        series.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time,20\n2023-01-01,3\n1,7\n"
        );
    }
}
