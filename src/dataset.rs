//! In-memory forecast datasets.
//!
//! A [`ForecastDataset`] is the loaded form of one or more remote NetCDF
//! files: dimensions, variable metadata, coordinate values and `f32` data
//! arrays, plus a record of which ensemble member produced each time step.

use chrono::NaiveDate;
use ndarray::{concatenate, Array, ArrayView, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::MemberKey;
use crate::dates::{DateRange, TimeUnits};
use crate::error::{Cfsv2Error, Result};
use crate::variable::VariableName;

/// Shared, immutable handle to a loaded forecast.
pub type ForecastHandle = Arc<ForecastDataset>;

/// Names of the time dimension, in order of preference.
pub const TIME_DIMENSIONS: [&str; 2] = ["time", "day"];

/// Provenance variables written alongside cached data.
pub const INIT_HOUR_VAR: &str = "forecast_init_hour";
pub const MEMBER_VAR: &str = "ensemble_member";
pub const DAY_VAR: &str = "forecast_day";

/// CF packing attributes consumed when a file is loaded.
pub const PACKING_ATTRIBUTES: [&str; 2] = ["scale_factor", "add_offset"];

/// Metadata about a NetCDF dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Name of the dimension
    pub name: String,
    /// Size of the dimension
    pub size: usize,
    /// Whether this dimension is unlimited
    pub is_unlimited: bool,
}

/// Metadata about a NetCDF variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Name of the variable
    pub name: String,
    /// Dimensions of the variable
    pub dimensions: Vec<String>,
    /// Shape of the variable (dimension sizes)
    pub shape: Vec<usize>,
    /// Variable attributes
    pub attributes: HashMap<String, AttributeValue>,
}

impl Variable {
    /// Numeric attribute lookup.
    pub fn number_attribute(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Number(v)) => Some(*v),
            Some(AttributeValue::NumberArray(v)) => v.first().copied(),
            _ => None,
        }
    }

    /// Text attribute lookup.
    pub fn text_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// Possible attribute values in NetCDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// String attribute
    Text(String),
    /// Numeric attribute (stored as f64 for simplicity)
    Number(f64),
    /// Array of numbers
    NumberArray(Vec<f64>),
}

/// Complete metadata for a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// File-level attributes
    pub global_attributes: HashMap<String, AttributeValue>,
    /// Dimensions in the file
    pub dimensions: HashMap<String, Dimension>,
    /// Variables in the file
    pub variables: HashMap<String, Variable>,
    /// Coordinate variables (subset of variables that match dimension names)
    pub coordinates: HashMap<String, Vec<f64>>,
}

/// A loaded gridded forecast.
#[derive(Debug, Clone)]
pub struct ForecastDataset {
    metadata: Metadata,
    data: HashMap<String, Array<f32, IxDyn>>,
    time_dim: String,
    step_members: Vec<Option<MemberKey>>,
}

impl ForecastDataset {
    /// Assemble a dataset, checking it for internal consistency.
    ///
    /// `step_members` may be empty, in which case every step is attributed
    /// to no particular member.
    pub fn new(
        metadata: Metadata,
        data: HashMap<String, Array<f32, IxDyn>>,
        step_members: Vec<Option<MemberKey>>,
    ) -> Result<Self> {
        let time_dim = find_time_dimension(&metadata)?;
        let steps = metadata.dimensions[&time_dim].size;
        let step_members = if step_members.is_empty() {
            vec![None; steps]
        } else {
            step_members
        };

        let dataset = Self {
            metadata,
            data,
            time_dim,
            step_members,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Attribute every time step to one member.
    pub fn with_member(mut self, member: Option<MemberKey>) -> Self {
        self.step_members = vec![member; self.time_len()];
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn time_dimension(&self) -> &str {
        &self.time_dim
    }

    pub fn time_len(&self) -> usize {
        self.metadata.dimensions[&self.time_dim].size
    }

    /// Member that produced each time step.
    pub fn step_members(&self) -> &[Option<MemberKey>] {
        &self.step_members
    }

    /// Distinct members in step order.
    pub fn members(&self) -> Vec<Option<MemberKey>> {
        let mut members: Vec<Option<MemberKey>> = Vec::new();
        for m in &self.step_members {
            if !members.contains(m) {
                members.push(*m);
            }
        }
        members
    }

    pub fn global_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.metadata.global_attributes.get(name)
    }

    pub fn set_global_attribute(&mut self, name: &str, value: AttributeValue) {
        self.metadata
            .global_attributes
            .insert(name.to_string(), value);
    }

    /// Get a variable's data array
    pub fn get_variable(&self, name: &str) -> Option<&Array<f32, IxDyn>> {
        self.data.get(name)
    }

    /// Get a variable's data array with error handling
    pub fn get_variable_checked(&self, name: &str) -> Result<&Array<f32, IxDyn>> {
        self.data.get(name).ok_or_else(|| Cfsv2Error::Data {
            message: format!("Variable not found: {}", name),
        })
    }

    /// Get variable metadata
    pub fn get_variable_metadata(&self, name: &str) -> Option<&Variable> {
        self.metadata.variables.get(name)
    }

    /// Get coordinate values for a dimension
    pub fn get_coordinate(&self, name: &str) -> Option<&Vec<f64>> {
        self.metadata.coordinates.get(name)
    }

    /// Names of gridded data variables: not coordinates, spanning time.
    pub fn data_variable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .metadata
            .variables
            .values()
            .filter(|v| !self.metadata.dimensions.contains_key(&v.name))
            .filter(|v| v.dimensions.len() >= 2 && v.dimensions.contains(&self.time_dim))
            .map(|v| v.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Pick the data variable holding `variable`.
    pub fn primary_variable(&self, variable: VariableName) -> Result<&str> {
        let expected = variable.data_variable();
        let names = self.data_variable_names();
        if let Some(name) = names.iter().find(|n| **n == expected) {
            return Ok(*name);
        }
        match names.as_slice() {
            [only] => Ok(*only),
            [] => Err(Cfsv2Error::Data {
                message: format!("no gridded variable found for {}", variable),
            }),
            many => Err(Cfsv2Error::Data {
                message: format!(
                    "cannot choose a variable for {} among {}",
                    variable,
                    many.join(", ")
                ),
            }),
        }
    }

    /// Decode the time coordinate into calendar dates.
    pub fn time_dates(&self) -> Result<Vec<NaiveDate>> {
        let values = self
            .metadata
            .coordinates
            .get(&self.time_dim)
            .ok_or_else(|| Cfsv2Error::Data {
                message: format!("no coordinate values for {}", self.time_dim),
            })?;
        let units = self
            .metadata
            .variables
            .get(&self.time_dim)
            .and_then(|v| v.text_attribute("units"))
            .ok_or_else(|| Cfsv2Error::Data {
                message: format!("time coordinate {} has no units", self.time_dim),
            })?;
        let units = TimeUnits::parse(units)?;
        values.iter().map(|v| units.date_of(*v)).collect()
    }

    /// Keep only time steps whose date lies in `range`.
    pub fn select_dates(&self, range: &DateRange) -> Result<ForecastDataset> {
        let indices: Vec<usize> = self
            .time_dates()?
            .into_iter()
            .enumerate()
            .filter(|(_, d)| range.contains(*d))
            .map(|(i, _)| i)
            .collect();
        debug!(
            range = %range,
            kept = indices.len(),
            total = self.time_len(),
            "Selecting time steps"
        );
        self.select_steps(&indices)
    }

    fn select_steps(&self, indices: &[usize]) -> Result<ForecastDataset> {
        let mut metadata = self.metadata.clone();
        set_dimension_size(&mut metadata, &self.time_dim, indices.len());

        let mut data = HashMap::with_capacity(self.data.len());
        for (name, array) in &self.data {
            let array = match self.time_axis(name) {
                Some(axis) => array.select(Axis(axis), indices),
                None => array.clone(),
            };
            data.insert(name.clone(), array);
        }

        if let Some(coords) = metadata.coordinates.get_mut(&self.time_dim) {
            *coords = indices.iter().map(|&i| coords[i]).collect();
        }

        Ok(ForecastDataset {
            metadata,
            data,
            time_dim: self.time_dim.clone(),
            step_members: indices.iter().map(|&i| self.step_members[i]).collect(),
        })
    }

    fn time_axis(&self, var_name: &str) -> Option<usize> {
        self.metadata
            .variables
            .get(var_name)?
            .dimensions
            .iter()
            .position(|d| *d == self.time_dim)
    }

    /// Concatenate datasets along their time dimension, in order.
    ///
    /// Variables without a time dimension are taken from the first part and
    /// must have the same shape in every part.
    pub fn concat_time(parts: Vec<ForecastDataset>) -> Result<ForecastDataset> {
        let mut iter = parts.into_iter();
        let first = iter.next().ok_or_else(|| Cfsv2Error::Data {
            message: "nothing to combine".to_string(),
        })?;
        let rest: Vec<ForecastDataset> = iter.collect();
        if rest.is_empty() {
            return Ok(first);
        }

        for (index, part) in rest.iter().enumerate() {
            if part.time_dim != first.time_dim {
                return Err(Cfsv2Error::Data {
                    message: format!(
                        "member {} uses time dimension {} instead of {}",
                        index + 1,
                        part.time_dim,
                        first.time_dim
                    ),
                });
            }
        }

        let mut metadata = first.metadata.clone();
        let mut data = HashMap::with_capacity(first.data.len());

        for (name, array) in &first.data {
            match first.time_axis(name) {
                Some(axis) => {
                    let mut views: Vec<ArrayView<f32, IxDyn>> = vec![array.view()];
                    for part in &rest {
                        views.push(part.get_variable_checked(name)?.view());
                    }
                    let joined = concatenate(Axis(axis), &views).map_err(|e| Cfsv2Error::Data {
                        message: format!("cannot concatenate {}: {}", name, e),
                    })?;
                    data.insert(name.clone(), joined);
                }
                None => {
                    for part in &rest {
                        let other = part.get_variable_checked(name)?;
                        if other.shape() != array.shape() {
                            return Err(Cfsv2Error::Data {
                                message: format!(
                                    "{} has shape {:?} in one member and {:?} in another",
                                    name,
                                    array.shape(),
                                    other.shape()
                                ),
                            });
                        }
                    }
                    data.insert(name.clone(), array.clone());
                }
            }
        }

        let total: usize = first.time_len() + rest.iter().map(|p| p.time_len()).sum::<usize>();
        set_dimension_size(&mut metadata, &first.time_dim, total);

        let mut time_coords = first
            .metadata
            .coordinates
            .get(&first.time_dim)
            .cloned()
            .unwrap_or_default();
        let mut step_members = first.step_members.clone();
        for part in &rest {
            if let Some(coords) = part.metadata.coordinates.get(&part.time_dim) {
                time_coords.extend_from_slice(coords);
            }
            step_members.extend_from_slice(&part.step_members);
        }
        metadata
            .coordinates
            .insert(first.time_dim.clone(), time_coords);

        let combined = ForecastDataset {
            metadata,
            data,
            time_dim: first.time_dim.clone(),
            step_members,
        };
        combined.validate()?;
        Ok(combined)
    }

    /// Validate that metadata and data arrays agree.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.variables.is_empty() {
            return Err(Cfsv2Error::Data {
                message: "No variables found in dataset".to_string(),
            });
        }

        for (var_name, var) in &self.metadata.variables {
            for dim_name in &var.dimensions {
                if !self.metadata.dimensions.contains_key(dim_name) {
                    return Err(Cfsv2Error::Data {
                        message: format!(
                            "Variable {} references non-existent dimension {}",
                            var_name, dim_name
                        ),
                    });
                }
            }

            if let Some(data) = self.data.get(var_name) {
                if data.shape() != var.shape.as_slice() {
                    return Err(Cfsv2Error::Data {
                        message: format!(
                            "Variable {} has inconsistent shape between metadata ({:?}) and data ({:?})",
                            var_name,
                            var.shape,
                            data.shape()
                        ),
                    });
                }
            }
        }

        if self.step_members.len() != self.time_len() {
            return Err(Cfsv2Error::Data {
                message: format!(
                    "{} member labels for {} time steps",
                    self.step_members.len(),
                    self.time_len()
                ),
            });
        }

        Ok(())
    }

    /// Write the dataset to a NetCDF file readable by
    /// [`crate::data_loader::load_netcdf`].
    pub fn write_netcdf(&self, path: &Path) -> Result<()> {
        let mut file = netcdf::create(path)?;

        let mut dims: Vec<&Dimension> = self.metadata.dimensions.values().collect();
        dims.sort_by(|a, b| a.name.cmp(&b.name));
        for dim in dims {
            if dim.name == self.time_dim {
                file.add_unlimited_dimension(&dim.name)?;
            } else {
                file.add_dimension(&dim.name, dim.size)?;
            }
        }

        for (name, value) in sorted(&self.metadata.global_attributes) {
            match value {
                AttributeValue::Text(s) => file.add_attribute(name, s.as_str())?,
                AttributeValue::Number(v) => file.add_attribute(name, *v)?,
                AttributeValue::NumberArray(v) => file.add_attribute(name, v.clone())?,
            };
        }

        let mut vars: Vec<&Variable> = self.metadata.variables.values().collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        for var in vars {
            let dims: Vec<&str> = var.dimensions.iter().map(String::as_str).collect();
            let coords = self
                .metadata
                .coordinates
                .get(&var.name)
                .filter(|_| var.dimensions.len() == 1);

            // Attributes go in before any values: netCDF-4 rejects a late _FillValue.
            match coords {
                Some(coords) => {
                    let mut v = file.add_variable::<f64>(&var.name, &dims)?;
                    write_attributes(&mut v, &var.attributes, false)?;
                    v.put_values(coords, ..)?;
                }
                None => {
                    let array = self.get_variable_checked(&var.name)?;
                    let values: Vec<f32> = array.iter().copied().collect();
                    let mut v = file.add_variable::<f32>(&var.name, &dims)?;
                    write_attributes(&mut v, &var.attributes, true)?;
                    if !values.is_empty() {
                        v.put_values(&values, ..)?;
                    }
                }
            }
        }

        let (hours, members, days) = encode_members(&self.step_members);
        for (name, values) in [(INIT_HOUR_VAR, hours), (MEMBER_VAR, members), (DAY_VAR, days)] {
            let mut v = file.add_variable::<i32>(name, &[self.time_dim.as_str()])?;
            v.put_attribute("missing_value", -1i32)?;
            if !values.is_empty() {
                v.put_values(&values, ..)?;
            }
        }

        Ok(())
    }
}

/// Find the time dimension of a dataset.
pub fn find_time_dimension(metadata: &Metadata) -> Result<String> {
    if let Some(name) = TIME_DIMENSIONS
        .iter()
        .find(|name| metadata.dimensions.contains_key(**name))
    {
        return Ok(name.to_string());
    }

    let mut unlimited: Vec<&Dimension> = metadata
        .dimensions
        .values()
        .filter(|d| d.is_unlimited)
        .collect();
    unlimited.sort_by(|a, b| a.name.cmp(&b.name));
    unlimited
        .first()
        .map(|d| d.name.clone())
        .ok_or_else(|| Cfsv2Error::Data {
            message: "dataset has no time dimension".to_string(),
        })
}

/// Split member labels into the three provenance columns (-1 when absent).
fn encode_members(members: &[Option<MemberKey>]) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let column = |f: fn(&MemberKey) -> u8| -> Vec<i32> {
        members
            .iter()
            .map(|m| m.as_ref().map(|k| i32::from(f(k))).unwrap_or(-1))
            .collect()
    };
    (
        column(|k| k.init_hour),
        column(|k| k.member),
        column(|k| k.day),
    )
}

/// Rebuild member labels from the three provenance columns.
pub fn decode_members(hours: &[f32], members: &[f32], days: &[f32]) -> Vec<Option<MemberKey>> {
    hours
        .iter()
        .zip(members)
        .zip(days)
        .map(|((&h, &m), &d)| {
            if [h, m, d].iter().any(|v| !v.is_finite() || *v < 0.0) {
                None
            } else {
                Some(MemberKey {
                    init_hour: h as u8,
                    member: m as u8,
                    day: d as u8,
                })
            }
        })
        .collect()
}

/// Fill and missing values must match the variable's storage type.
/// Values in memory are already unpacked, so packing attributes are not
/// written.
fn write_attributes(
    var: &mut netcdf::VariableMut<'_>,
    attributes: &HashMap<String, AttributeValue>,
    single_precision: bool,
) -> Result<()> {
    for (name, value) in sorted(attributes) {
        if PACKING_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        let fill = name == "_FillValue" || name == "missing_value";
        match value {
            AttributeValue::Text(s) => var.put_attribute(name, s.as_str())?,
            AttributeValue::Number(v) if fill && single_precision => {
                var.put_attribute(name, *v as f32)?
            }
            AttributeValue::Number(v) => var.put_attribute(name, *v)?,
            AttributeValue::NumberArray(v) => var.put_attribute(name, v.clone())?,
        };
    }
    Ok(())
}

fn set_dimension_size(metadata: &mut Metadata, dim: &str, size: usize) {
    if let Some(d) = metadata.dimensions.get_mut(dim) {
        d.size = size;
    }
    for var in metadata.variables.values_mut() {
        for (i, name) in var.dimensions.iter().enumerate() {
            if name == dim {
                var.shape[i] = size;
            }
        }
    }
}

fn sorted(attrs: &HashMap<String, AttributeValue>) -> Vec<(&String, &AttributeValue)> {
    let mut entries: Vec<_> = attrs.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small (time, lat, lon) dataset whose values encode their position.
    pub fn grid_dataset(
        data_var: &str,
        first_day: f64,
        steps: usize,
        lat: usize,
        lon: usize,
        offset: f32,
    ) -> ForecastDataset {
        let mut dimensions = HashMap::new();
        for (name, size, unlimited) in [("time", steps, true), ("lat", lat, false), ("lon", lon, false)] {
            dimensions.insert(
                name.to_string(),
                Dimension {
                    name: name.to_string(),
                    size,
                    is_unlimited: unlimited,
                },
            );
        }

        let mut variables = HashMap::new();
        let coord = |name: &str, size: usize, units: &str| Variable {
            name: name.to_string(),
            dimensions: vec![name.to_string()],
            shape: vec![size],
            attributes: HashMap::from([(
                "units".to_string(),
                AttributeValue::Text(units.to_string()),
            )]),
        };
        variables.insert("time".to_string(), coord("time", steps, "days since 2023-01-01"));
        variables.insert("lat".to_string(), coord("lat", lat, "degrees_north"));
        variables.insert("lon".to_string(), coord("lon", lon, "degrees_east"));
        variables.insert(
            data_var.to_string(),
            Variable {
                name: data_var.to_string(),
                dimensions: vec!["time".to_string(), "lat".to_string(), "lon".to_string()],
                shape: vec![steps, lat, lon],
                attributes: HashMap::from([
                    ("units".to_string(), AttributeValue::Text("K".to_string())),
                    ("_FillValue".to_string(), AttributeValue::Number(32767.0)),
                ]),
            },
        );

        let times: Vec<f64> = (0..steps).map(|i| first_day + i as f64).collect();
        let lats: Vec<f64> = (0..lat).map(|i| 40.0 + i as f64).collect();
        let lons: Vec<f64> = (0..lon).map(|i| -120.0 + i as f64).collect();

        let mut data = HashMap::new();
        let values: Vec<f32> = (0..steps * lat * lon).map(|i| offset + i as f32).collect();
        data.insert(
            data_var.to_string(),
            Array::from_shape_vec(IxDyn(&[steps, lat, lon]), values).unwrap(),
        );
        for (name, coords) in [("time", &times), ("lat", &lats), ("lon", &lons)] {
            let values: Vec<f32> = coords.iter().map(|v| *v as f32).collect();
            data.insert(
                name.to_string(),
                Array::from_shape_vec(IxDyn(&[coords.len()]), values).unwrap(),
            );
        }

        let coordinates = HashMap::from([
            ("time".to_string(), times),
            ("lat".to_string(), lats),
            ("lon".to_string(), lons),
        ]);

        let metadata = Metadata {
            global_attributes: HashMap::from([(
                "title".to_string(),
                AttributeValue::Text("synthetic forecast".to_string()),
            )]),
            dimensions,
            variables,
            coordinates,
        };
        ForecastDataset::new(metadata, data, Vec::new()).unwrap()
    }
}
